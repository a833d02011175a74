//! A device session: one registry, its mapping graph and its variables.
//!
//! The session is the single owner of all mutable model state. Conflict
//! checks requested by the mapping graph are debounced on a timer thread and
//! run here, on the owning thread, when [`DeviceSession::process_pending`]
//! or [`DeviceSession::wait_for_conflict_check`] is called.
//!
//! Pin maps tie signal placements to variables. A rule `"SIG,PIN;SIG2,PIN2"`
//! with an enable formula maps its signals while the formula holds and
//! releases them when it stops holding. Choice entries may carry a pin map
//! that applies while the entry is selected.

use std::time::Duration;

use pinmux_core::{most_severe, MuxSelection, Status, StructuralError};
use pinmux_vars::{Effect, ExprId, Settings, Value, VarId, VariableStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::{check_conflicts, ConflictReport, ConflictScheduler};
use crate::error::DeviceError;
use crate::mapping::MappingGraph;
use crate::registry::{PeripheralId, PinId, Registry, SignalId};

/// Session tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between a selection change and the conflict check it triggers.
    pub debounce_ms: u64,
    /// Schedule conflict checks after selection changes.
    pub auto_check: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            auto_check: true,
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Signal-to-pin pairs of a pin map.
pub type Placements = Vec<(SignalId, PinId)>;

#[derive(Debug)]
struct PinMapRule {
    source: String,
    placements: Placements,
    enable: Option<ExprId>,
    active: bool,
}

#[derive(Debug)]
struct ChoicePinMaps {
    variable: VarId,
    /// Per choice entry.
    maps: Vec<Option<Placements>>,
    active: Option<usize>,
}

#[derive(Debug)]
pub struct DeviceSession {
    id: Uuid,
    config: SessionConfig,
    graph: MappingGraph,
    vars: VariableStore,
    pin_maps: Vec<PinMapRule>,
    choice_maps: Vec<ChoicePinMaps>,
}

impl DeviceSession {
    pub fn new(registry: Registry, vars: VariableStore, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        let mut graph = MappingGraph::new(registry);
        if config.auto_check {
            graph = graph.with_scheduler(ConflictScheduler::new(id, config.debounce()));
        }
        tracing::debug!(session = %id, pins = graph.registry().pin_count(), variables = vars.len(), "session created");
        Self {
            id,
            config,
            graph,
            vars,
            pin_maps: Vec::new(),
            choice_maps: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        self.graph.registry()
    }

    pub fn graph(&self) -> &MappingGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut MappingGraph {
        &mut self.graph
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    /// Direct access for building formulas and bindings. Value changes made
    /// through this handle reach pin maps on the next [`flush_effects`].
    ///
    /// [`flush_effects`]: Self::flush_effects
    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    // ---------------------------------------------------------------
    // Selection by name
    // ---------------------------------------------------------------

    pub fn select_pin(&mut self, pin: &str, mux: MuxSelection) -> Result<bool, DeviceError> {
        let pin = self.registry().find_pin(pin)?;
        self.graph.select_from_pin(pin, mux)
    }

    pub fn map_signal(&mut self, signal: &str, pin: &str) -> Result<bool, DeviceError> {
        let signal = self.registry().find_signal(signal)?;
        let pin = self.registry().find_pin(pin)?;
        self.graph.map_signal_to_pin(signal, pin)
    }

    pub fn release_signal(&mut self, signal: &str) -> Result<bool, DeviceError> {
        let signal = self.registry().find_signal(signal)?;
        self.graph.release_signal(signal)
    }

    // ---------------------------------------------------------------
    // Variables
    // ---------------------------------------------------------------

    /// Set a variable and apply any pin maps that depend on it.
    pub fn set_value(&mut self, key: &str, value: impl Into<Value>) -> Result<bool, DeviceError> {
        let changed = self.vars.set_value_by_key(key, value)?;
        self.flush_effects()?;
        Ok(changed)
    }

    /// Set a variable from its persisted text form.
    pub fn set_persistent_value(&mut self, key: &str, text: &str) -> Result<bool, DeviceError> {
        let changed = self.vars.set_persistent_value(key, text)?;
        self.flush_effects()?;
        Ok(changed)
    }

    // ---------------------------------------------------------------
    // Pin maps
    // ---------------------------------------------------------------

    /// Parse `"SIG,PIN;SIG2,PIN2"`. Empty entries are ignored.
    pub fn parse_pin_map(&self, text: &str) -> Result<Placements, StructuralError> {
        let reg = self.registry();
        let mut placements = Vec::new();
        for entry in text.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((signal, pin)) = entry.split_once(',') else {
                return Err(StructuralError::InvalidPinMap(text.to_string()));
            };
            if pin.contains(',') {
                return Err(StructuralError::InvalidPinMap(text.to_string()));
            }
            placements.push((reg.find_signal(signal.trim())?, reg.find_pin(pin.trim())?));
        }
        Ok(placements)
    }

    /// Register a pin-map rule, optionally guarded by an enable formula, and
    /// apply it. Returns the rule index.
    pub fn add_pin_map(&mut self, map: &str, enable: Option<&str>) -> Result<usize, DeviceError> {
        let placements = self.parse_pin_map(map)?;
        let enable = match enable {
            Some(formula) => {
                let eid = self.vars.compile(formula)?;
                self.vars.watch_expression(eid);
                Some(eid)
            }
            None => None,
        };
        let active = enable.map_or(true, |eid| self.vars.expression_as_bool(eid).unwrap_or(false));
        apply_placements(&mut self.graph, &placements, active)?;
        tracing::debug!(map, active, "pin map registered");
        self.pin_maps.push(PinMapRule {
            source: map.to_string(),
            placements,
            enable,
            active,
        });
        Ok(self.pin_maps.len() - 1)
    }

    /// Whether pin-map rule `index` is currently applied.
    pub fn pin_map_active(&self, index: usize) -> Option<bool> {
        self.pin_maps.get(index).map(|rule| rule.active)
    }

    /// Track the pin maps carried by the entries of choice variable `key`.
    /// Returns false if no entry carries one.
    pub fn add_choice_pin_maps(&mut self, key: &str) -> Result<bool, DeviceError> {
        let variable = self.vars.lookup(key)?;
        let maps = self
            .vars
            .get(variable)
            .choices()
            .iter()
            .map(|c| c.pin_map.as_deref().map(|m| self.parse_pin_map(m)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        if maps.iter().all(Option::is_none) {
            return Ok(false);
        }
        self.vars.watch_variable(variable);
        let active = self.vars.get(variable).selected_choice().map(|(i, _)| i);
        if let Some(Some(placements)) = active.map(|i| &maps[i]) {
            apply_placements(&mut self.graph, placements, true)?;
        }
        self.choice_maps.push(ChoicePinMaps { variable, maps, active });
        Ok(true)
    }

    /// Apply pin maps affected by queued variable changes. Returns the number
    /// of rules that switched.
    pub fn flush_effects(&mut self) -> Result<usize, DeviceError> {
        let mut switched = 0;
        loop {
            let effects = self.vars.take_effects();
            if effects.is_empty() {
                return Ok(switched);
            }
            for effect in effects {
                switched += match effect {
                    Effect::Expression(eid) => self.refresh_rules(eid)?,
                    Effect::Variable(vid) => self.refresh_choice_maps(vid)?,
                };
            }
        }
    }

    fn refresh_rules(&mut self, eid: ExprId) -> Result<usize, DeviceError> {
        let mut switched = 0;
        for rule in self.pin_maps.iter_mut().filter(|r| r.enable == Some(eid)) {
            let active = self.vars.expression_as_bool(eid).unwrap_or(false);
            if active == rule.active {
                continue;
            }
            rule.active = active;
            apply_placements(&mut self.graph, &rule.placements, active)?;
            tracing::debug!(map = %rule.source, active, "pin map switched");
            switched += 1;
        }
        Ok(switched)
    }

    fn refresh_choice_maps(&mut self, vid: VarId) -> Result<usize, DeviceError> {
        let mut switched = 0;
        for maps in self.choice_maps.iter_mut().filter(|m| m.variable == vid) {
            let selected = self.vars.get(vid).selected_choice().map(|(i, _)| i);
            if selected == maps.active {
                continue;
            }
            if let Some(Some(old)) = maps.active.map(|i| &maps.maps[i]) {
                apply_placements(&mut self.graph, old, false)?;
            }
            if let Some(Some(new)) = selected.map(|i| &maps.maps[i]) {
                apply_placements(&mut self.graph, new, true)?;
            }
            maps.active = selected;
            switched += 1;
        }
        Ok(switched)
    }

    // ---------------------------------------------------------------
    // Conflicts and status
    // ---------------------------------------------------------------

    /// Run a conflict check if a debounced request is due.
    pub fn process_pending(&mut self) -> Option<ConflictReport> {
        let due = self.graph.scheduler().is_some_and(|s| s.take_due());
        due.then(|| check_conflicts(&mut self.graph))
    }

    /// Block until a pending check is due, then run it.
    pub fn wait_for_conflict_check(&mut self, timeout: Duration) -> Option<ConflictReport> {
        let due = self
            .graph
            .scheduler()
            .is_some_and(|s| s.is_pending() && s.wait(timeout));
        due.then(|| check_conflicts(&mut self.graph))
    }

    pub fn check_conflicts_now(&mut self) -> ConflictReport {
        if let Some(scheduler) = self.graph.scheduler() {
            scheduler.take_due();
        }
        check_conflicts(&mut self.graph)
    }

    /// Most severe status among the peripheral's signals and the variables
    /// under `/<peripheral>/`.
    pub fn peripheral_status(&self, peripheral: PeripheralId) -> Option<Status> {
        let reg = self.registry();
        let p = reg.peripheral(peripheral);
        let prefix = format!("/{}/", p.name());
        let signals = p.signals().iter().filter_map(|s| reg.signal(*s).status());
        let variables = self
            .vars
            .iter()
            .filter(|(_, v)| v.key().starts_with(&prefix))
            .filter_map(|(_, v)| v.status());
        most_severe(signals.chain(variables)).cloned()
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    pub fn save_settings(&self) -> Settings {
        let reg = self.registry();
        let mut settings = Settings::new();
        for (_, pin) in reg.pins() {
            for (mux, id) in pin.mappings() {
                if mux != MuxSelection::Fixed && reg.mapping(id).is_selected() {
                    settings.put(mux_key(pin.name(), mux), "selected");
                }
            }
            if pin.properties() != 0 {
                settings.put(pcr_key(pin.name()), format!("{:x}", pin.properties()));
            }
            if let Some(desc) = pin.description() {
                settings.put(format!("$pin${}_descriptionSetting", pin.name()), desc);
            }
        }
        for (_, signal) in reg.signals() {
            if let Some(desc) = signal.description() {
                settings.put(format!("$signal${}_descriptionSetting", signal.name()), desc);
            }
            if let Some(ident) = signal.code_identifier() {
                settings.put(format!("$signal${}_codeIdentifier", signal.name()), ident);
            }
        }
        self.vars.save_to(&mut settings);
        tracing::debug!(session = %self.id, entries = settings.len(), "settings saved");
        settings
    }

    /// Restore state saved by [`save_settings`](Self::save_settings).
    ///
    /// Every pin is cleared first, so the result does not depend on what was
    /// selected before the load. Saved selections are then restored as-is,
    /// conflicts included. Entries that cannot be applied are skipped and
    /// returned. Conflict requests issued before the load are discarded.
    pub fn load_settings(&mut self, settings: &Settings) -> Vec<DeviceError> {
        let mut failures = Vec::new();
        self.id = Uuid::new_v4();
        if let Some(scheduler) = self.graph.scheduler_mut() {
            scheduler.renew(self.id);
        }

        let pins: Vec<(PinId, String)> = self
            .registry()
            .pins()
            .map(|(id, p)| (id, p.name().to_string()))
            .collect();
        for (pin, _) in &pins {
            if let Err(e) = self.graph.select_from_pin(*pin, MuxSelection::Unassigned) {
                failures.push(e);
            }
        }
        for (pin, name) in pins {
            if let Some(legacy) = settings.get(&format!("$signal${name}_muxSetting")) {
                let restored = legacy
                    .parse::<MuxSelection>()
                    .map_err(DeviceError::from)
                    .and_then(|mux| self.graph.select_from_pin(pin, mux));
                if let Err(e) = restored {
                    failures.push(e);
                }
            }
            let saved: Vec<_> = self
                .registry()
                .pin(pin)
                .mappings()
                .filter(|(mux, _)| settings.get(&mux_key(&name, *mux)).is_some())
                .map(|(_, id)| id)
                .collect();
            for id in saved {
                self.graph.restore_selection(id);
            }
            match load_properties(settings, &name) {
                Ok(properties) => {
                    self.graph.set_pin_properties(pin, properties);
                }
                Err(e) => failures.push(e),
            }
            let desc = settings.get(&format!("$pin${name}_descriptionSetting"));
            self.graph.set_pin_description(pin, desc.map(str::to_string));
        }

        let signals: Vec<(SignalId, String)> = self
            .registry()
            .signals()
            .map(|(id, s)| (id, s.name().to_string()))
            .collect();
        for (signal, name) in signals {
            let desc = settings.get(&format!("$signal${name}_descriptionSetting"));
            self.graph.set_signal_description(signal, desc.map(str::to_string));
            let ident = settings.get(&format!("$signal${name}_codeIdentifier"));
            self.graph.set_signal_code_identifier(signal, ident.map(str::to_string));
        }

        failures.extend(self.vars.load_from(settings).into_iter().map(DeviceError::from));
        if let Err(e) = self.flush_effects() {
            failures.push(e);
        }
        self.graph.request_check();
        tracing::info!(session = %self.id, entries = settings.len(), failures = failures.len(), "settings loaded");
        failures
    }
}

fn mux_key(pin: &str, mux: MuxSelection) -> String {
    format!("$pin${pin}_muxSetting_{}", mux.short_name())
}

fn pcr_key(pin: &str) -> String {
    format!("$pin${pin}_pcrSetting")
}

/// Saved PCR properties as hex, falling back to the older signal-scoped key.
/// Absent means zero.
fn load_properties(settings: &Settings, pin: &str) -> Result<u32, DeviceError> {
    let Some(text) = settings
        .get(&pcr_key(pin))
        .or_else(|| settings.get(&format!("$signal${pin}_pcrSetting")))
    else {
        return Ok(0);
    };
    let digits = text.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    u32::from_str_radix(digits, 16).map_err(|_| DeviceError::InvalidProperties {
        pin: pin.to_string(),
        value: text.to_string(),
    })
}

/// Map each placement, or release each signal still sitting on its pin.
fn apply_placements(graph: &mut MappingGraph, placements: &[(SignalId, PinId)], active: bool) -> Result<(), DeviceError> {
    for (signal, pin) in placements {
        if active {
            graph.map_signal_to_pin(*signal, *pin)?;
        } else if graph.signal_pin(*signal) == *pin {
            graph.release_signal(*signal)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pinmux_core::{Severity, StatusKind};
    use pinmux_vars::{ChoiceData, Variable};

    use super::*;
    use crate::registry::MappingId;
    use crate::template::TemplateSet;

    fn registry() -> Registry {
        let templates = TemplateSet::with_defaults().unwrap();
        let mut graph = MappingGraph::new(Registry::new());
        for (pin, mux, signal) in [
            ("PTA3", MuxSelection::Mux0, "GPIOA_3"),
            ("PTA3", MuxSelection::Mux3, "FTM0_CH0"),
            ("PTC1", MuxSelection::Mux4, "FTM0_CH0"),
            ("PTB0", MuxSelection::Mux2, "I2C0_SCL"),
        ] {
            let p = graph.registry_mut().find_or_create_pin(pin);
            let (_, s) = templates.register(graph.registry_mut(), signal).unwrap();
            graph.create_mapping(p, mux, s).unwrap();
        }
        graph.registry().clone()
    }

    fn manual() -> SessionConfig {
        SessionConfig {
            auto_check: false,
            ..SessionConfig::default()
        }
    }

    fn session_with(vars: VariableStore) -> DeviceSession {
        DeviceSession::new(registry(), vars, manual())
    }

    #[test]
    fn config_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn pin_map_follows_enable_formula() {
        let mut vars = VariableStore::new();
        vars.add(Variable::boolean("/FTM0/enable", false)).unwrap();
        let mut session = session_with(vars);
        let rule = session.add_pin_map("FTM0_CH0,PTC1", Some("/FTM0/enable")).unwrap();
        let ch0 = session.registry().find_signal("FTM0_CH0").unwrap();
        let ptc1 = session.registry().find_pin("PTC1").unwrap();
        assert_eq!(session.pin_map_active(rule), Some(false));
        assert_eq!(session.graph().signal_placement(ch0), MappingId::UNASSIGNED);

        session.set_value("/FTM0/enable", true).unwrap();
        assert_eq!(session.pin_map_active(rule), Some(true));
        assert_eq!(session.graph().signal_pin(ch0), ptc1);

        session.set_value("/FTM0/enable", false).unwrap();
        assert_eq!(session.graph().signal_placement(ch0), MappingId::UNASSIGNED);
    }

    #[test]
    fn unguarded_pin_map_applies_immediately() {
        let mut session = session_with(VariableStore::new());
        session.add_pin_map("I2C0_SCL,PTB0; ", None).unwrap();
        let ptb0 = session.registry().find_pin("PTB0").unwrap();
        assert_eq!(session.graph().pin_selection(ptb0), MuxSelection::Mux2);
    }

    #[test]
    fn bad_pin_maps_rejected() {
        let session = session_with(VariableStore::new());
        assert!(matches!(session.parse_pin_map("FTM0_CH0"), Err(StructuralError::InvalidPinMap(_))));
        assert!(matches!(
            session.parse_pin_map("FTM0_CH0,PTZ9"),
            Err(StructuralError::PinNotFound(_))
        ));
    }

    #[test]
    fn choice_entries_carry_pin_maps() {
        let mut vars = VariableStore::new();
        vars.add(Variable::choice(
            "/FTM0/ch0Pin",
            vec![
                ChoiceData::new("None", "none"),
                ChoiceData::new("PTA3", "pta3").with_pin_map("FTM0_CH0,PTA3"),
                ChoiceData::new("PTC1", "ptc1").with_pin_map("FTM0_CH0,PTC1"),
            ],
            0,
        ))
        .unwrap();
        let mut session = session_with(vars);
        assert!(session.add_choice_pin_maps("/FTM0/ch0Pin").unwrap());
        let ch0 = session.registry().find_signal("FTM0_CH0").unwrap();
        let pta3 = session.registry().find_pin("PTA3").unwrap();
        let ptc1 = session.registry().find_pin("PTC1").unwrap();

        session.set_value("/FTM0/ch0Pin", "pta3").unwrap();
        assert_eq!(session.graph().signal_pin(ch0), pta3);
        session.set_value("/FTM0/ch0Pin", "ptc1").unwrap();
        assert_eq!(session.graph().signal_pin(ch0), ptc1);
        assert_eq!(session.graph().pin_selection(pta3), MuxSelection::Unassigned);
        session.set_value("/FTM0/ch0Pin", "none").unwrap();
        assert_eq!(session.graph().signal_placement(ch0), MappingId::UNASSIGNED);
    }

    #[test]
    fn settings_round_trip() {
        let mut vars = VariableStore::new();
        vars.add(Variable::long("/FTM0/period", 100).with_range(1, 1000)).unwrap();
        let mut session = session_with(vars);
        session.map_signal("FTM0_CH0", "PTC1").unwrap();
        session.select_pin("PTB0", MuxSelection::Mux2).unwrap();
        session.set_value("/FTM0/period", 250).unwrap();
        let ptb0 = session.registry().find_pin("PTB0").unwrap();
        session.graph_mut().set_pin_description(ptb0, Some("Sensor clock".into()));

        let settings = session.save_settings();
        assert_eq!(settings.get("$pin$PTC1_muxSetting_mux4"), Some("selected"));
        assert_eq!(settings.get("$pin$PTB0_descriptionSetting"), Some("Sensor clock"));

        let mut restored = session_with({
            let mut vars = VariableStore::new();
            vars.add(Variable::long("/FTM0/period", 100).with_range(1, 1000)).unwrap();
            vars
        });
        let before = restored.id();
        assert!(restored.load_settings(&settings).is_empty());
        assert_ne!(restored.id(), before);
        assert_eq!(restored.save_settings(), settings);
        assert_eq!(restored.vars().variable("/FTM0/period").unwrap().value_as_long(), Some(250));
    }

    #[test]
    fn legacy_mux_setting_restored() {
        let mut session = session_with(VariableStore::new());
        let mut settings = Settings::new();
        settings.put("$signal$PTA3_muxSetting", "mux3");
        settings.put("$signal$PTB0_muxSetting", "bogus");
        let failures = session.load_settings(&settings);
        assert_eq!(failures.len(), 1);
        let pta3 = session.registry().find_pin("PTA3").unwrap();
        assert_eq!(session.graph().pin_selection(pta3), MuxSelection::Mux3);
    }

    #[test]
    fn load_replaces_current_selection() {
        let mut session = session_with(VariableStore::new());
        session.select_pin("PTA3", MuxSelection::Mux3).unwrap();
        let earlier = session.save_settings();

        session.select_pin("PTA3", MuxSelection::Mux0).unwrap();
        session.select_pin("PTB0", MuxSelection::Mux2).unwrap();
        assert!(session.load_settings(&earlier).is_empty());

        let pta3 = session.registry().find_pin("PTA3").unwrap();
        let ptb0 = session.registry().find_pin("PTB0").unwrap();
        assert_eq!(session.graph().selected_on_pin(pta3).len(), 1);
        assert_eq!(session.graph().pin_selection(pta3), MuxSelection::Mux3);
        assert_eq!(session.graph().pin_selection(ptb0), MuxSelection::Unassigned);
        assert_eq!(session.save_settings(), earlier);
    }

    #[test]
    fn pin_properties_saved_as_hex() {
        let mut session = session_with(VariableStore::new());
        let pta3 = session.registry().find_pin("PTA3").unwrap();
        session.graph_mut().set_pin_properties(pta3, 0x000A_0043);
        let settings = session.save_settings();
        assert_eq!(settings.get("$pin$PTA3_pcrSetting"), Some("a0043"));
        assert_eq!(settings.get("$pin$PTB0_pcrSetting"), None);

        let mut restored = session_with(VariableStore::new());
        assert!(restored.load_settings(&settings).is_empty());
        assert_eq!(restored.registry().pin(pta3).properties(), 0x000A_0043);

        // loading without the key clears what was there
        assert!(restored.load_settings(&Settings::new()).is_empty());
        assert_eq!(restored.registry().pin(pta3).properties(), 0);
    }

    #[test]
    fn legacy_and_bad_pin_properties() {
        let mut session = session_with(VariableStore::new());
        let mut settings = Settings::new();
        settings.put("$signal$PTA3_pcrSetting", "143");
        settings.put("$pin$PTB0_pcrSetting", "zz");
        let failures = session.load_settings(&settings);
        assert_eq!(
            failures,
            vec![DeviceError::InvalidProperties {
                pin: "PTB0".into(),
                value: "zz".into(),
            }]
        );
        let pta3 = session.registry().find_pin("PTA3").unwrap();
        // the mux bit in the saved word is not a property
        assert_eq!(session.registry().pin(pta3).properties(), 0x43);
    }

    #[test]
    fn peripheral_status_rolls_up() {
        let mut vars = VariableStore::new();
        vars.add(Variable::long("/FTM0/period", 100).with_range(1, 1000)).unwrap();
        let mut session = session_with(vars);
        let ftm0 = session.registry().find_peripheral("FTM0").unwrap();
        assert_eq!(session.peripheral_status(ftm0), None);

        session.set_value("/FTM0/period", 5000).unwrap();
        let status = session.peripheral_status(ftm0).unwrap();
        assert_eq!(status.kind, StatusKind::Validation);

        let ch0 = session.registry().find_signal("FTM0_CH0").unwrap();
        let a = session.registry().signal(ch0).mappings()[0];
        let b = session.registry().signal(ch0).mappings()[1];
        session.graph_mut().restore_selection(a);
        session.graph_mut().restore_selection(b);
        assert!(!session.check_conflicts_now().is_clean());
        let status = session.peripheral_status(ftm0).unwrap();
        assert_eq!(status.severity, Severity::Error);
    }

    #[test]
    fn debounced_check_runs_on_owner() {
        let config = SessionConfig {
            debounce_ms: 5,
            auto_check: true,
        };
        let mut session = DeviceSession::new(registry(), VariableStore::new(), config);
        assert!(session.process_pending().is_none());
        session.select_pin("PTA3", MuxSelection::Mux3).unwrap();
        session.map_signal("FTM0_CH0", "PTC1").unwrap();
        let report = session.wait_for_conflict_check(Duration::from_secs(5)).unwrap();
        assert!(report.is_clean());
        assert!(session.process_pending().is_none());
    }
}
