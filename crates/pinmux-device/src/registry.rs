//! Entity registry: pins, peripherals, signals and mapping edges.
//!
//! The registry owns every entity of one device for the lifetime of a
//! session. Entities are addressed by small copyable ids. Index 0 of each
//! table holds a sentinel: the unassigned pin, the disabled signal and the
//! unassigned mapping that a released signal points at. Sentinels are never
//! indexed by name and never take part in conflict scanning.

use std::collections::BTreeMap;
use std::fmt;

use pinmux_core::{MuxSelection, Status, StructuralError};
use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Handle to a [`Pin`].
    PinId,
    "pin"
);
entity_id!(
    /// Handle to a [`Signal`].
    SignalId,
    "signal"
);
entity_id!(
    /// Handle to a [`Peripheral`].
    PeripheralId,
    "peripheral"
);
entity_id!(
    /// Handle to a [`MappingInfo`].
    MappingId,
    "mapping"
);

impl PinId {
    /// The pin a released signal is "mapped" to.
    pub const UNASSIGNED: PinId = PinId(0);

    pub fn is_sentinel(self) -> bool {
        self == Self::UNASSIGNED
    }
}

impl SignalId {
    /// The signal carried by the unassigned mapping.
    pub const DISABLED: SignalId = SignalId(0);

    pub fn is_sentinel(self) -> bool {
        self == Self::DISABLED
    }
}

impl MappingId {
    /// Placement of a signal that is not routed to any pin.
    pub const UNASSIGNED: MappingId = MappingId(0);

    pub fn is_sentinel(self) -> bool {
        self == Self::UNASSIGNED
    }
}

/// A physical package terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    name: String,
    pub(crate) mappings: BTreeMap<MuxSelection, MappingId>,
    pub(crate) reset: MuxSelection,
    pub(crate) description: Option<String>,
    pub(crate) status: Option<Status>,
    pub(crate) properties: u32,
}

impl Pin {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mappings: BTreeMap::new(),
            reset: MuxSelection::Unassigned,
            description: None,
            status: None,
            properties: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// PCR bits other than the mux field. See [`crate::pcr`].
    pub fn properties(&self) -> u32 {
        self.properties
    }

    /// Candidate placements, ordered by mux setting.
    pub fn mappings(&self) -> impl Iterator<Item = (MuxSelection, MappingId)> + '_ {
        self.mappings.iter().map(|(m, id)| (*m, *id))
    }

    pub fn mapping(&self, mux: MuxSelection) -> Option<MappingId> {
        self.mappings.get(&mux).copied()
    }

    /// Setting out of reset. `Unassigned` until one is declared.
    pub fn reset_mux(&self) -> MuxSelection {
        self.reset
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }
}

/// A named peripheral function that can be routed to a pin.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    name: String,
    peripheral: Option<PeripheralId>,
    suffix: String,
    pub(crate) mappings: Vec<MappingId>,
    pub(crate) reset_mapping: Option<MappingId>,
    pub(crate) description: Option<String>,
    pub(crate) code_identifier: Option<String>,
    pub(crate) status: Option<Status>,
}

impl Signal {
    fn new(name: impl Into<String>, peripheral: Option<PeripheralId>, suffix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peripheral,
            suffix: suffix.into(),
            mappings: Vec::new(),
            reset_mapping: None,
            description: None,
            code_identifier: None,
            status: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peripheral(&self) -> Option<PeripheralId> {
        self.peripheral
    }

    /// Part of the name after the peripheral, e.g. `CH3` for `FTM0_CH3`.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Candidate placements in the order they were declared.
    pub fn mappings(&self) -> &[MappingId] {
        &self.mappings
    }

    pub fn reset_mapping(&self) -> Option<MappingId> {
        self.reset_mapping
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn code_identifier(&self) -> Option<&str> {
        self.code_identifier.as_deref()
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Supply nets may sit on several fixed pins at once.
    pub fn is_power(&self) -> bool {
        is_power_signal(&self.name)
    }
}

pub fn is_power_signal(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    ["VDD", "VSS", "VREF", "VBAT"].iter().any(|p| upper.starts_with(p))
}

/// Clock gating metadata carried through to code generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockInfo {
    pub register: Option<String>,
    pub mask: Option<String>,
}

/// A peripheral instance, e.g. `FTM` + `0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Peripheral {
    base: String,
    instance: String,
    name: String,
    pub(crate) signals: Vec<SignalId>,
    pub(crate) clock: ClockInfo,
}

impl Peripheral {
    fn new(base: &str, instance: &str) -> Self {
        Self {
            base: base.to_string(),
            instance: instance.to_string(),
            name: format!("{base}{instance}"),
            signals: Vec::new(),
            clock: ClockInfo::default(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signals(&self) -> &[SignalId] {
        &self.signals
    }

    pub fn clock(&self) -> &ClockInfo {
        &self.clock
    }
}

/// One candidate placement: a pin, a mux setting and the signals it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingInfo {
    pin: PinId,
    mux: MuxSelection,
    pub(crate) signals: Vec<SignalId>,
    pub(crate) selected: bool,
    pub(crate) status: Option<Status>,
}

impl MappingInfo {
    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn mux(&self) -> MuxSelection {
        self.mux
    }

    pub fn signals(&self) -> &[SignalId] {
        &self.signals
    }

    /// Fixed mappings are always selected.
    pub fn is_selected(&self) -> bool {
        self.selected || self.mux == MuxSelection::Fixed
    }

    pub fn is_fixed(&self) -> bool {
        self.mux == MuxSelection::Fixed
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }
}

/// Owner of every entity of one device.
#[derive(Debug, Clone)]
pub struct Registry {
    pins: Vec<Pin>,
    pin_index: BTreeMap<String, PinId>,
    signals: Vec<Signal>,
    signal_index: BTreeMap<String, SignalId>,
    peripherals: Vec<Peripheral>,
    peripheral_index: BTreeMap<String, PeripheralId>,
    mappings: Vec<MappingInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            pins: vec![Pin::new("Unassigned")],
            pin_index: BTreeMap::new(),
            signals: vec![Signal::new("Disabled", None, "")],
            signal_index: BTreeMap::new(),
            peripherals: Vec::new(),
            peripheral_index: BTreeMap::new(),
            mappings: vec![MappingInfo {
                pin: PinId::UNASSIGNED,
                mux: MuxSelection::Unassigned,
                signals: vec![SignalId::DISABLED],
                selected: false,
                status: None,
            }],
        }
    }

    // --- Pins ---

    pub fn create_pin(&mut self, name: &str) -> Result<PinId, StructuralError> {
        if self.pin_index.contains_key(name) {
            return Err(StructuralError::DuplicatePin(name.to_string()));
        }
        let id = PinId(self.pins.len() as u32);
        self.pins.push(Pin::new(name));
        self.pin_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn find_pin(&self, name: &str) -> Result<PinId, StructuralError> {
        self.pin_index
            .get(name)
            .copied()
            .ok_or_else(|| StructuralError::PinNotFound(name.to_string()))
    }

    pub fn find_or_create_pin(&mut self, name: &str) -> PinId {
        match self.pin_index.get(name) {
            Some(id) => *id,
            None => {
                let id = PinId(self.pins.len() as u32);
                self.pins.push(Pin::new(name));
                self.pin_index.insert(name.to_string(), id);
                id
            }
        }
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.index()]
    }

    pub(crate) fn pin_mut(&mut self, id: PinId) -> &mut Pin {
        &mut self.pins[id.index()]
    }

    /// Real pins in name order.
    pub fn pins(&self) -> impl Iterator<Item = (PinId, &Pin)> {
        self.pin_index.values().map(|id| (*id, &self.pins[id.index()]))
    }

    pub fn pin_count(&self) -> usize {
        self.pin_index.len()
    }

    // --- Peripherals ---

    pub fn create_peripheral(&mut self, base: &str, instance: &str) -> Result<PeripheralId, StructuralError> {
        let peripheral = Peripheral::new(base, instance);
        if self.peripheral_index.contains_key(peripheral.name()) {
            return Err(StructuralError::DuplicatePeripheral(peripheral.name().to_string()));
        }
        let id = PeripheralId(self.peripherals.len() as u32);
        self.peripheral_index.insert(peripheral.name().to_string(), id);
        self.peripherals.push(peripheral);
        Ok(id)
    }

    /// Find by full name (`base` + `instance`).
    pub fn find_peripheral(&self, name: &str) -> Result<PeripheralId, StructuralError> {
        self.peripheral_index
            .get(name)
            .copied()
            .ok_or_else(|| StructuralError::PeripheralNotFound(name.to_string()))
    }

    pub fn find_or_create_peripheral(&mut self, base: &str, instance: &str) -> PeripheralId {
        match self.peripheral_index.get(&format!("{base}{instance}")) {
            Some(id) => *id,
            None => {
                let id = PeripheralId(self.peripherals.len() as u32);
                let peripheral = Peripheral::new(base, instance);
                self.peripheral_index.insert(peripheral.name().to_string(), id);
                self.peripherals.push(peripheral);
                id
            }
        }
    }

    pub fn peripheral(&self, id: PeripheralId) -> &Peripheral {
        &self.peripherals[id.index()]
    }

    pub fn set_clock_info(&mut self, id: PeripheralId, clock: ClockInfo) {
        self.peripherals[id.index()].clock = clock;
    }

    /// Peripherals in name order.
    pub fn peripherals(&self) -> impl Iterator<Item = (PeripheralId, &Peripheral)> {
        self.peripheral_index
            .values()
            .map(|id| (*id, &self.peripherals[id.index()]))
    }

    // --- Signals ---

    /// Create a signal and register it on its peripheral.
    pub fn create_signal(
        &mut self,
        name: &str,
        peripheral: PeripheralId,
        suffix: &str,
    ) -> Result<SignalId, StructuralError> {
        if self.signal_index.contains_key(name) {
            return Err(StructuralError::DuplicateSignal(name.to_string()));
        }
        Ok(self.insert_signal(name, peripheral, suffix))
    }

    fn insert_signal(&mut self, name: &str, peripheral: PeripheralId, suffix: &str) -> SignalId {
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(Signal::new(name, Some(peripheral), suffix));
        self.signal_index.insert(name.to_string(), id);
        self.peripherals[peripheral.index()].signals.push(id);
        id
    }

    pub fn find_signal(&self, name: &str) -> Result<SignalId, StructuralError> {
        self.signal_index
            .get(name)
            .copied()
            .ok_or_else(|| StructuralError::SignalNotFound(name.to_string()))
    }

    pub fn find_or_create_signal(&mut self, name: &str, peripheral: PeripheralId, suffix: &str) -> SignalId {
        match self.signal_index.get(name) {
            Some(id) => *id,
            None => self.insert_signal(name, peripheral, suffix),
        }
    }

    pub fn signal(&self, id: SignalId) -> &Signal {
        &self.signals[id.index()]
    }

    pub(crate) fn signal_mut(&mut self, id: SignalId) -> &mut Signal {
        &mut self.signals[id.index()]
    }

    /// Real signals in name order.
    pub fn signals(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signal_index
            .values()
            .map(|id| (*id, &self.signals[id.index()]))
    }

    // --- Mappings ---

    pub fn mapping(&self, id: MappingId) -> &MappingInfo {
        &self.mappings[id.index()]
    }

    pub(crate) fn mapping_mut(&mut self, id: MappingId) -> &mut MappingInfo {
        &mut self.mappings[id.index()]
    }

    /// Real mappings in creation order.
    pub fn mappings(&self) -> impl Iterator<Item = (MappingId, &MappingInfo)> {
        self.mappings
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, m)| (MappingId(i as u32), m))
    }

    pub(crate) fn push_mapping(&mut self, pin: PinId, mux: MuxSelection) -> MappingId {
        let id = MappingId(self.mappings.len() as u32);
        self.mappings.push(MappingInfo {
            pin,
            mux,
            signals: Vec::new(),
            selected: mux == MuxSelection::Fixed,
            status: None,
        });
        self.pins[pin.index()].mappings.insert(mux, id);
        id
    }

    /// Signal names joined with `/`, e.g. `GPIOA_3/LLWU_P7`.
    pub fn signal_list(&self, id: MappingId) -> String {
        let names: Vec<&str> = self.mapping(id).signals.iter().map(|s| self.signal(*s).name()).collect();
        names.join("/")
    }

    /// `PTA1 => A/B @ mux3`.
    pub fn describe_mapping(&self, id: MappingId) -> String {
        let m = self.mapping(id);
        format!("{} => {} @ {}", self.pin(m.pin).name(), self.signal_list(id), m.mux)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_exist_and_are_not_indexed() {
        let reg = Registry::new();
        assert_eq!(reg.pin(PinId::UNASSIGNED).name(), "Unassigned");
        assert_eq!(reg.signal(SignalId::DISABLED).name(), "Disabled");
        assert_eq!(reg.mapping(MappingId::UNASSIGNED).signals(), &[SignalId::DISABLED]);
        assert_eq!(reg.pin_count(), 0);
        assert!(reg.find_pin("Unassigned").is_err());
        assert_eq!(reg.mappings().count(), 0);
    }

    #[test]
    fn duplicate_pin_rejected() {
        let mut reg = Registry::new();
        let id = reg.create_pin("PTA3").unwrap();
        assert_eq!(reg.create_pin("PTA3"), Err(StructuralError::DuplicatePin("PTA3".into())));
        assert_eq!(reg.find_or_create_pin("PTA3"), id);
        assert_eq!(reg.find_pin("PTA3"), Ok(id));
        assert!(matches!(reg.find_pin("PTA4"), Err(StructuralError::PinNotFound(_))));
    }

    #[test]
    fn signals_register_on_peripheral() {
        let mut reg = Registry::new();
        let ftm = reg.create_peripheral("FTM", "0").unwrap();
        assert!(reg.create_peripheral("FTM", "0").is_err());
        assert_eq!(reg.find_or_create_peripheral("FTM", "0"), ftm);
        assert_eq!(reg.find_peripheral("FTM0"), Ok(ftm));

        let ch3 = reg.create_signal("FTM0_CH3", ftm, "CH3").unwrap();
        assert!(reg.create_signal("FTM0_CH3", ftm, "CH3").is_err());
        assert_eq!(reg.find_or_create_signal("FTM0_CH3", ftm, "CH3"), ch3);
        assert_eq!(reg.peripheral(ftm).signals(), &[ch3]);
        assert_eq!(reg.signal(ch3).peripheral(), Some(ftm));
        assert_eq!(reg.signal(ch3).suffix(), "CH3");
    }

    #[test]
    fn power_signal_names() {
        assert!(is_power_signal("VDD1"));
        assert!(is_power_signal("vss_a"));
        assert!(is_power_signal("VREFH"));
        assert!(!is_power_signal("UART0_TX"));
    }
}
