//! The pin/signal mapping graph and its selection algorithm.
//!
//! Selection can start from either side. Selecting a mapping from its pin
//! or from one of its signals runs the same activation step: every other
//! selected mapping on the pin is deselected, and every other selected
//! placement of each signal the mapping carries is deselected, wherever it
//! lives. Both entry points therefore converge on the same state.
//!
//! Fixed mappings are immutable wiring: they are always selected and any
//! attempt to change them is ignored.

use std::collections::BTreeSet;

use pinmux_core::{Bus, MuxSelection, Properties, StructuralError};

use crate::conflict::ConflictScheduler;
use crate::error::DeviceError;
use crate::pcr::{self, PcrField, PROPERTIES_MASK};
use crate::registry::{MappingId, PeripheralId, PinId, Registry, SignalId};

/// Source of a notification on the mapping graph's bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelNode {
    Pin(PinId),
    Signal(SignalId),
    Mapping(MappingId),
    Peripheral(PeripheralId),
}

/// Registry plus selection state and change notification.
#[derive(Debug)]
pub struct MappingGraph {
    registry: Registry,
    bus: Bus<ModelNode>,
    scheduler: Option<ConflictScheduler>,
}

impl MappingGraph {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            bus: Bus::new(),
            scheduler: None,
        }
    }

    /// Request a debounced conflict check after every selection change.
    pub fn with_scheduler(mut self, scheduler: ConflictScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn bus(&self) -> &Bus<ModelNode> {
        &self.bus
    }

    pub fn scheduler(&self) -> Option<&ConflictScheduler> {
        self.scheduler.as_ref()
    }

    pub(crate) fn scheduler_mut(&mut self) -> Option<&mut ConflictScheduler> {
        self.scheduler.as_mut()
    }

    pub(crate) fn request_check(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.request();
        }
    }

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Add `signal` to the mapping at `(pin, mux)`, creating it if needed.
    ///
    /// A fixed mapping makes `fixed` the pin's reset setting and the signal's
    /// reset placement. A signal wired to a fixed pin cannot gain any other
    /// placement, unless it is a supply net.
    pub fn create_mapping(
        &mut self,
        pin: PinId,
        mux: MuxSelection,
        signal: SignalId,
    ) -> Result<MappingId, StructuralError> {
        if !(mux.is_mapped_value() || mux == MuxSelection::Fixed) {
            return Err(StructuralError::InvalidMuxSelection(mux.to_string()));
        }
        if pin.is_sentinel() || signal.is_sentinel() {
            return Err(StructuralError::NoSuchMapping {
                signal: self.registry.signal(signal).name().to_string(),
                pin: self.registry.pin(pin).name().to_string(),
            });
        }

        let reg = &self.registry;
        let sig = reg.signal(signal);
        if !sig.is_power() {
            let has_fixed = sig.mappings.iter().any(|m| reg.mapping(*m).is_fixed());
            let has_other = sig.mappings.iter().any(|m| reg.mapping(*m).pin() != pin);
            if has_other && (has_fixed || mux == MuxSelection::Fixed) {
                return Err(StructuralError::FixedMappingConflict {
                    signal: sig.name().to_string(),
                    mapping: format!("{} @ {mux}", reg.pin(pin).name()),
                });
            }
        }

        let id = match self.registry.pin(pin).mapping(mux) {
            Some(id) => id,
            None => self.registry.push_mapping(pin, mux),
        };
        let mapping = self.registry.mapping_mut(id);
        if !mapping.signals.contains(&signal) {
            mapping.signals.push(signal);
        }
        let sig = self.registry.signal_mut(signal);
        if !sig.mappings.contains(&id) {
            sig.mappings.push(id);
        }
        if mux == MuxSelection::Fixed {
            if sig.reset_mapping.is_none() {
                sig.reset_mapping = Some(id);
            }
            self.registry.pin_mut(pin).reset = MuxSelection::Fixed;
        }
        tracing::trace!(mapping = %self.registry.describe_mapping(id), "mapping created");
        self.bus.notify(ModelNode::Pin(pin), Properties::STRUCTURE);
        self.bus.notify(ModelNode::Signal(signal), Properties::STRUCTURE);
        Ok(id)
    }

    /// Declare the pin's reset setting. A pin has at most one.
    pub fn set_pin_reset(&mut self, pin: PinId, mux: MuxSelection) -> Result<(), StructuralError> {
        let p = self.registry.pin(pin);
        if p.reset == mux || mux == MuxSelection::Unassigned {
            return Ok(());
        }
        if p.reset != MuxSelection::Unassigned {
            return Err(StructuralError::DuplicateResetMapping {
                owner: p.name().to_string(),
                existing: p.reset.to_string(),
                requested: mux.to_string(),
            });
        }
        if mux.is_mapped_value() && p.mapping(mux).is_none() {
            return Err(StructuralError::InvalidMuxSelection(format!("{} @ {mux}", p.name())));
        }
        self.registry.pin_mut(pin).reset = mux;
        Ok(())
    }

    /// Declare the pin's reset setting by the signal list it carries
    /// (`A/B`, case-insensitive). `Disabled` leaves the pin unassigned.
    pub fn set_pin_reset_signals(&mut self, pin: PinId, signals: &str) -> Result<(), StructuralError> {
        if signals.eq_ignore_ascii_case("disabled") {
            return self.set_pin_reset(pin, MuxSelection::Disabled);
        }
        let found = self
            .registry
            .pin(pin)
            .mappings()
            .find(|(_, id)| self.registry.signal_list(*id).eq_ignore_ascii_case(signals));
        let Some((mux, id)) = found else {
            return Err(StructuralError::ResetSignalsNotFound {
                pin: self.registry.pin(pin).name().to_string(),
                signals: signals.to_string(),
            });
        };
        self.set_pin_reset(pin, mux)?;
        for signal in self.registry.mapping(id).signals.clone() {
            self.set_signal_reset(signal, id)?;
        }
        Ok(())
    }

    /// Declare the signal's reset placement. A signal has at most one.
    pub fn set_signal_reset(&mut self, signal: SignalId, mapping: MappingId) -> Result<(), StructuralError> {
        let sig = self.registry.signal(signal);
        if !mapping.is_sentinel() && !sig.mappings.contains(&mapping) {
            return Err(StructuralError::NoSuchMapping {
                signal: sig.name().to_string(),
                pin: self.registry.pin(self.registry.mapping(mapping).pin()).name().to_string(),
            });
        }
        match sig.reset_mapping {
            Some(existing) if existing == mapping => Ok(()),
            Some(existing) => Err(StructuralError::DuplicateResetMapping {
                owner: sig.name().to_string(),
                existing: self.registry.describe_mapping(existing),
                requested: self.registry.describe_mapping(mapping),
            }),
            None => {
                self.registry.signal_mut(signal).reset_mapping = Some(mapping);
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------

    /// Select the mapping at `mux` on `pin`.
    ///
    /// `reset` resolves to the pin's reset setting; `disabled` and
    /// `unassigned` deselect every non-fixed mapping on the pin. Returns
    /// whether anything changed.
    pub fn select_from_pin(&mut self, pin: PinId, mux: MuxSelection) -> Result<bool, DeviceError> {
        let mux = match mux {
            MuxSelection::Reset => self.registry.pin(pin).reset,
            other => other,
        };
        if mux.is_unmapped() {
            let selected: Vec<MappingId> = self
                .registry
                .pin(pin)
                .mappings()
                .map(|(_, id)| id)
                .filter(|id| self.registry.mapping(*id).selected && !self.registry.mapping(*id).is_fixed())
                .collect();
            return Ok(self.apply(None, selected));
        }
        let mapping = self.registry.pin(pin).mapping(mux).ok_or_else(|| DeviceError::NoMapping {
            pin: self.registry.pin(pin).name().to_string(),
            mux,
        })?;
        Ok(self.activate(mapping))
    }

    /// Make `mapping` the active placement of `signal`.
    /// [`MappingId::UNASSIGNED`] releases the signal.
    pub fn select_from_signal(&mut self, signal: SignalId, mapping: MappingId) -> Result<bool, DeviceError> {
        let sig = self.registry.signal(signal);
        if mapping.is_sentinel() {
            let selected: Vec<MappingId> = sig
                .mappings
                .iter()
                .copied()
                .filter(|id| self.registry.mapping(*id).selected && !self.registry.mapping(*id).is_fixed())
                .collect();
            return Ok(self.apply(None, selected));
        }
        if !sig.mappings.contains(&mapping) {
            return Err(DeviceError::ForeignMapping {
                mapping: self.registry.describe_mapping(mapping),
                signal: sig.name().to_string(),
            });
        }
        Ok(self.activate(mapping))
    }

    /// Route `signal` to `pin` using whichever mux setting carries it.
    pub fn map_signal_to_pin(&mut self, signal: SignalId, pin: PinId) -> Result<bool, DeviceError> {
        let mapping = self
            .registry
            .signal(signal)
            .mappings
            .iter()
            .copied()
            .find(|id| self.registry.mapping(*id).pin() == pin)
            .ok_or_else(|| StructuralError::NoSuchMapping {
                signal: self.registry.signal(signal).name().to_string(),
                pin: self.registry.pin(pin).name().to_string(),
            })?;
        self.select_from_signal(signal, mapping)
    }

    /// Unroute `signal`.
    pub fn release_signal(&mut self, signal: SignalId) -> Result<bool, DeviceError> {
        self.select_from_signal(signal, MappingId::UNASSIGNED)
    }

    /// Mark `mapping` selected without deselecting anything else. Used when
    /// restoring saved state, which may itself be conflicted.
    pub fn restore_selection(&mut self, mapping: MappingId) -> bool {
        if mapping.is_sentinel() || self.registry.mapping(mapping).is_selected() {
            return false;
        }
        self.registry.mapping_mut(mapping).selected = true;
        self.publish(&[mapping]);
        true
    }

    /// Select every pin's reset setting. Returns the number of pins changed.
    pub fn apply_reset(&mut self) -> usize {
        let pins: Vec<PinId> = self.registry.pins().map(|(id, _)| id).collect();
        let mut changed = 0;
        for pin in pins {
            match self.select_from_pin(pin, MuxSelection::Reset) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "reset setting not applied"),
            }
        }
        changed
    }

    fn activate(&mut self, target: MappingId) -> bool {
        let reg = &self.registry;
        let m = reg.mapping(target);
        if m.is_fixed() {
            return false;
        }
        let mut displaced = BTreeSet::new();
        let pin_mappings = reg.pin(m.pin()).mappings().map(|(_, id)| id);
        let signal_mappings = m.signals.iter().flat_map(move |s| reg.signal(*s).mappings.iter().copied());
        for id in pin_mappings.chain(signal_mappings) {
            let other = reg.mapping(id);
            if id != target && other.selected && !other.is_fixed() {
                displaced.insert(id);
            }
        }
        self.apply(Some(target), displaced.into_iter().collect())
    }

    /// Deselect `displaced`, select `target`, then notify mappings, pins and
    /// signals that changed, in that order.
    fn apply(&mut self, target: Option<MappingId>, displaced: Vec<MappingId>) -> bool {
        let mut changed = Vec::new();
        for id in displaced {
            let m = self.registry.mapping_mut(id);
            if m.selected {
                m.selected = false;
                changed.push(id);
            }
        }
        if let Some(id) = target {
            let m = self.registry.mapping_mut(id);
            if !m.selected {
                m.selected = true;
                changed.push(id);
            }
        }
        if changed.is_empty() {
            return false;
        }
        if let Some(id) = target {
            tracing::debug!(mapping = %self.registry.describe_mapping(id), changed = changed.len(), "mapping selected");
        } else {
            tracing::debug!(deselected = changed.len(), "mappings released");
        }
        self.publish(&changed);
        true
    }

    fn publish(&self, changed: &[MappingId]) {
        let mut pins = BTreeSet::new();
        let mut signals = BTreeSet::new();
        for id in changed {
            let m = self.registry.mapping(*id);
            pins.insert(m.pin());
            signals.extend(m.signals.iter().copied());
            self.bus.notify(ModelNode::Mapping(*id), Properties::MAPPING);
        }
        for pin in pins {
            self.bus.notify(ModelNode::Pin(pin), Properties::MAPPING);
        }
        for signal in signals {
            self.bus.notify(ModelNode::Signal(signal), Properties::MAPPING);
        }
        self.request_check();
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Selected mappings on a pin (fixed ones included).
    pub fn selected_on_pin(&self, pin: PinId) -> Vec<MappingId> {
        self.registry
            .pin(pin)
            .mappings()
            .map(|(_, id)| id)
            .filter(|id| self.registry.mapping(*id).is_selected())
            .collect()
    }

    /// The pin's current setting: the mux of its selected mapping, or
    /// `unassigned`.
    pub fn pin_selection(&self, pin: PinId) -> MuxSelection {
        self.selected_on_pin(pin)
            .first()
            .map(|id| self.registry.mapping(*id).mux())
            .unwrap_or(MuxSelection::Unassigned)
    }

    /// The signal's active placement, or [`MappingId::UNASSIGNED`].
    pub fn signal_placement(&self, signal: SignalId) -> MappingId {
        self.registry
            .signal(signal)
            .mappings
            .iter()
            .copied()
            .find(|id| self.registry.mapping(*id).is_selected())
            .unwrap_or(MappingId::UNASSIGNED)
    }

    /// Pin the signal is routed to, or [`PinId::UNASSIGNED`].
    pub fn signal_pin(&self, signal: SignalId) -> PinId {
        self.registry.mapping(self.signal_placement(signal)).pin()
    }

    // ---------------------------------------------------------------
    // Annotations
    // ---------------------------------------------------------------

    pub fn set_pin_description(&mut self, pin: PinId, description: Option<String>) -> bool {
        let p = self.registry.pin_mut(pin);
        if p.description == description {
            return false;
        }
        p.description = description;
        self.bus.notify(ModelNode::Pin(pin), Properties::VALUE);
        true
    }

    /// Replace a pin's PCR properties. Bits outside
    /// [`PROPERTIES_MASK`] are discarded; the unassigned pin has none.
    pub fn set_pin_properties(&mut self, pin: PinId, properties: u32) -> bool {
        if pin.is_sentinel() {
            return false;
        }
        let properties = properties & PROPERTIES_MASK;
        let p = self.registry.pin_mut(pin);
        if p.properties == properties {
            return false;
        }
        p.properties = properties;
        tracing::debug!(pin = %p.name(), properties = format_args!("{properties:#x}"), "pin properties changed");
        self.bus.notify(ModelNode::Pin(pin), Properties::VALUE);
        true
    }

    pub fn pin_property(&self, pin: PinId, field: PcrField) -> u32 {
        field.get(self.registry.pin(pin).properties)
    }

    pub fn set_pin_property(&mut self, pin: PinId, field: PcrField, value: u32) -> bool {
        let properties = field.set(self.registry.pin(pin).properties, value);
        self.set_pin_properties(pin, properties)
    }

    /// PCR word for the pin's properties and current selection.
    pub fn pin_pcr(&self, pin: PinId) -> u32 {
        pcr::pcr_value(self.registry.pin(pin).properties, self.pin_selection(pin))
    }

    pub fn set_signal_description(&mut self, signal: SignalId, description: Option<String>) -> bool {
        let s = self.registry.signal_mut(signal);
        if s.description == description {
            return false;
        }
        s.description = description;
        self.bus.notify(ModelNode::Signal(signal), Properties::VALUE);
        true
    }

    /// Identifier used for the signal in generated code.
    pub fn set_signal_code_identifier(&mut self, signal: SignalId, identifier: Option<String>) -> bool {
        let s = self.registry.signal_mut(signal);
        if s.code_identifier == identifier {
            return false;
        }
        s.code_identifier = identifier;
        self.bus.notify(ModelNode::Signal(signal), Properties::VALUE);
        true
    }
}
