//! Pin multiplexer settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StructuralError;

/// The discrete multiplexer setting that selects which signal(s) a pin carries.
///
/// Ordinary settings are `Mux0`..`Mux7`. The remaining variants are sentinels:
/// `Fixed` wiring can never change, `Unassigned` and `Disabled` carry no
/// signal, and `Reset` stands for whatever setting the pin has out of reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxSelection {
    Unassigned,
    Reset,
    Disabled,
    Mux0,
    Mux1,
    Mux2,
    Mux3,
    Mux4,
    Mux5,
    Mux6,
    Mux7,
    Fixed,
}

impl MuxSelection {
    /// All ordinary (numeric) settings in order.
    pub const MAPPED: [MuxSelection; 8] = [
        MuxSelection::Mux0,
        MuxSelection::Mux1,
        MuxSelection::Mux2,
        MuxSelection::Mux3,
        MuxSelection::Mux4,
        MuxSelection::Mux5,
        MuxSelection::Mux6,
        MuxSelection::Mux7,
    ];

    /// Build a numeric setting from its register value.
    pub fn from_value(value: u8) -> Option<MuxSelection> {
        Self::MAPPED.get(value as usize).copied()
    }

    /// Register value for numeric settings.
    pub fn value(&self) -> Option<u8> {
        Self::MAPPED.iter().position(|m| m == self).map(|i| i as u8)
    }

    /// True for `Mux0`..`Mux7`.
    pub fn is_mapped_value(&self) -> bool {
        self.value().is_some()
    }

    /// True for settings that leave the pin without a signal.
    pub fn is_unmapped(&self) -> bool {
        matches!(self, MuxSelection::Unassigned | MuxSelection::Disabled)
    }

    /// Short name used in persistent keys, e.g. `mux3` or `fixed`.
    pub fn short_name(&self) -> &'static str {
        match self {
            MuxSelection::Unassigned => "unassigned",
            MuxSelection::Reset => "reset",
            MuxSelection::Disabled => "disabled",
            MuxSelection::Mux0 => "mux0",
            MuxSelection::Mux1 => "mux1",
            MuxSelection::Mux2 => "mux2",
            MuxSelection::Mux3 => "mux3",
            MuxSelection::Mux4 => "mux4",
            MuxSelection::Mux5 => "mux5",
            MuxSelection::Mux6 => "mux6",
            MuxSelection::Mux7 => "mux7",
            MuxSelection::Fixed => "fixed",
        }
    }
}

impl fmt::Display for MuxSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for MuxSelection {
    type Err = StructuralError;

    /// Accepts short names (`mux3`, `fixed`), bare register values (`3`) and
    /// the upper-case forms found in older settings files (`MUX3`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Ok(value) = lower.parse::<u8>() {
            return Self::from_value(value)
                .ok_or_else(|| StructuralError::InvalidMuxSelection(s.to_string()));
        }
        let found = [
            MuxSelection::Unassigned,
            MuxSelection::Reset,
            MuxSelection::Disabled,
            MuxSelection::Fixed,
        ]
        .into_iter()
        .chain(Self::MAPPED)
        .find(|m| m.short_name() == lower);
        found.ok_or_else(|| StructuralError::InvalidMuxSelection(s.to_string()))
    }
}
