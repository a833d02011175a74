//! TOML device descriptions.
//!
//! A description lists the package pins with the signals each mux setting
//! carries, optional reset settings, the device's configuration variables
//! and any pin maps driven by them:
//!
//! ```toml
//! name = "MK20DX32VLF5"
//!
//! [[pins]]
//! name = "PTA3"
//! mux = { mux0 = "GPIOA_3", mux3 = "FTM0_CH0" }
//! reset = "mux0"
//!
//! [[variables]]
//! key = "/FTM0/enable"
//! kind = "boolean"
//! default = false
//!
//! [[pin_maps]]
//! map = "FTM0_CH0,PTA3"
//! enabled_by = "/FTM0/enable"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use pinmux_core::MuxSelection;
use pinmux_device::{ClockInfo, DeviceError, DeviceSession, Registry, SessionConfig, TemplateRule, TemplateSet};
use pinmux_vars::{ChoiceData, Role, Settings, Value, Variable, VariableStore};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescription {
    pub name: String,
    #[serde(default)]
    pub session: SessionConfig,
    /// Extra name-splitting rules, tried before the built-in ones.
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
    #[serde(default)]
    pub peripherals: Vec<PeripheralSpec>,
    #[serde(default)]
    pub pins: Vec<PinSpec>,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub pin_maps: Vec<PinMapSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    pub pattern: String,
    #[serde(default = "group1")]
    pub base: String,
    #[serde(default = "group2")]
    pub instance: String,
    #[serde(default = "group3")]
    pub suffix: String,
}

fn group1() -> String {
    "$1".into()
}

fn group2() -> String {
    "$2".into()
}

fn group3() -> String {
    "$3".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeripheralSpec {
    pub name: String,
    pub clock_register: Option<String>,
    pub clock_mask: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinSpec {
    pub name: String,
    /// Mux setting to `/`-separated signal list.
    #[serde(default)]
    pub mux: BTreeMap<String, String>,
    /// A mux setting (`mux2`, `disabled`) or the signal list it carries.
    pub reset: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    pub key: String,
    pub kind: String,
    pub default: Option<toml::Value>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub type_name: Option<String>,
    pub units: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<i64>,
    pub radix: Option<u32>,
    pub offset: Option<i64>,
    pub on_text: Option<String>,
    pub off_text: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceData>,
    pub permitted: Option<u64>,
    #[serde(default)]
    pub bit_names: Vec<String>,
    pub separator: Option<char>,
    #[serde(default)]
    pub allowed: Vec<String>,
    pub max_items: Option<usize>,
    #[serde(default)]
    pub hidden: bool,
    pub disabled_value: Option<toml::Value>,
    /// Formula for a derived value.
    pub value_of: Option<String>,
    pub enabled_by: Option<String>,
    pub hidden_by: Option<String>,
    pub error_if: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinMapSpec {
    pub map: String,
    pub enabled_by: Option<String>,
}

fn to_value(key: &str, value: &toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Integer(i) => Value::Long(*i),
        toml::Value::Float(f) => Value::Double(*f),
        toml::Value::String(s) => Value::Str(s.clone()),
        other => bail!("{key}: unsupported value {other}"),
    })
}

impl VariableSpec {
    fn default_value(&self) -> Result<Option<Value>> {
        self.default.as_ref().map(|v| to_value(&self.key, v)).transpose()
    }

    fn build(&self) -> Result<Variable> {
        let key = self.key.as_str();
        let default = self.default_value()?;
        let mut var = match self.kind.as_str() {
            "boolean" => {
                let on = default.as_ref().and_then(Value::as_bool).unwrap_or(false);
                let var = Variable::boolean(key, on);
                match (&self.on_text, &self.off_text) {
                    (Some(on), Some(off)) => var.with_on_off_text(on.as_str(), off.as_str()),
                    (None, None) => var,
                    _ => bail!("{key}: on_text and off_text go together"),
                }
            }
            "long" => {
                let v = default.as_ref().and_then(Value::as_long).unwrap_or(0);
                let mut var = Variable::long(key, v);
                if self.min.is_some() || self.max.is_some() {
                    let lo = self.min.map_or(i64::MIN, |m| m as i64);
                    let hi = self.max.map_or(i64::MAX, |m| m as i64);
                    var = var.with_range(lo, hi);
                }
                if let Some(step) = self.step {
                    var = var.with_step(step);
                }
                if let Some(radix) = self.radix {
                    var = var.with_radix(radix);
                }
                if let Some(offset) = self.offset {
                    var = var.with_offset(offset);
                }
                var
            }
            "double" => {
                let v = default.as_ref().and_then(Value::as_double).unwrap_or(0.0);
                let var = Variable::double(key, v);
                if self.min.is_some() || self.max.is_some() {
                    var.with_limits(self.min.unwrap_or(f64::NEG_INFINITY), self.max.unwrap_or(f64::INFINITY))
                } else {
                    var
                }
            }
            "string" => Variable::string(key, default.map(|v| v.to_string()).unwrap_or_default()),
            "choice" => {
                if self.choices.is_empty() {
                    bail!("{key}: a choice variable needs at least one choice");
                }
                let index = match &default {
                    None => 0,
                    Some(Value::Long(i)) => usize::try_from(*i).context("negative choice index")?,
                    Some(v) => {
                        let text = v.to_string();
                        self.choices
                            .iter()
                            .position(|c| c.value == text || c.name == text)
                            .with_context(|| format!("{key}: no choice matches default {text:?}"))?
                    }
                };
                if index >= self.choices.len() {
                    bail!("{key}: default choice {index} out of range");
                }
                Variable::choice(key, self.choices.clone(), index)
            }
            "bitmask" => {
                let v = default.as_ref().and_then(Value::as_long).unwrap_or(0);
                let var = Variable::bitmask(key, self.permitted.unwrap_or(u64::MAX), v as u64);
                if self.bit_names.is_empty() {
                    var
                } else {
                    var.with_bit_names(self.bit_names.clone())
                }
            }
            "list" => {
                let mut var = Variable::list(key, default.map(|v| v.to_string()).unwrap_or_default());
                if let Some(sep) = self.separator {
                    var = var.with_separator(sep);
                }
                if !self.allowed.is_empty() {
                    var = var.with_allowed(self.allowed.clone());
                }
                if let Some(n) = self.max_items {
                    var = var.with_max_items(n);
                }
                var
            }
            other => bail!("{key}: unknown variable kind {other:?}"),
        };

        if let Some(name) = &self.name {
            var = var.with_name(name.as_str());
        }
        if let Some(description) = &self.description {
            var = var.with_description(description.as_str());
        }
        if let Some(type_name) = &self.type_name {
            var = var.with_type_name(type_name.as_str());
        }
        if let Some(units) = &self.units {
            var = var.with_units(units.as_str());
        }
        if let Some(disabled) = &self.disabled_value {
            var = var.with_disabled_value(to_value(key, disabled)?);
        }
        Ok(var.with_hidden(self.hidden))
    }

    fn bindings(&self) -> impl Iterator<Item = (&str, Role)> {
        [
            (self.value_of.as_deref(), Role::Value),
            (self.enabled_by.as_deref(), Role::EnabledBy),
            (self.hidden_by.as_deref(), Role::HiddenBy),
            (self.error_if.as_deref(), Role::ErrorIf),
        ]
        .into_iter()
        .filter_map(|(formula, role)| formula.map(|f| (f, role)))
    }
}

impl DeviceDescription {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing device description")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    fn templates(&self) -> Result<TemplateSet> {
        let mut custom = TemplateSet::new();
        for t in &self.templates {
            custom = custom.with_rule(TemplateRule::with_templates(&t.pattern, &t.base, &t.instance, &t.suffix)?);
        }
        Ok(custom.chain(TemplateSet::with_defaults()?))
    }

    fn variables(&self) -> Result<VariableStore> {
        let mut store = VariableStore::new();
        for spec in &self.variables {
            store.add(spec.build()?)?;
        }
        for spec in &self.variables {
            for (formula, role) in spec.bindings() {
                store
                    .compile_and_bind(formula, &spec.key, role)
                    .with_context(|| format!("binding {formula:?} to {}", spec.key))?;
            }
        }
        Ok(store)
    }

    /// Registry, mappings, resets and variables; nothing selected yet.
    fn assemble(&self) -> Result<DeviceSession> {
        let templates = self.templates()?;
        let mut reg = Registry::new();
        let mut rows = Vec::new();
        for spec in &self.pins {
            let pin = reg.create_pin(&spec.name)?;
            for (mux, signals) in &spec.mux {
                let mux: MuxSelection = mux.parse().with_context(|| format!("pin {}", spec.name))?;
                for name in signals.split('/').map(str::trim).filter(|s| !s.is_empty()) {
                    let (_, signal) = templates.register(&mut reg, name)?;
                    rows.push((pin, mux, signal));
                }
            }
        }
        for spec in &self.peripherals {
            let id = reg.find_peripheral(&spec.name)?;
            reg.set_clock_info(
                id,
                ClockInfo {
                    register: spec.clock_register.clone(),
                    mask: spec.clock_mask.clone(),
                },
            );
        }

        let mut session = DeviceSession::new(reg, self.variables()?, self.session.clone());
        let graph = session.graph_mut();
        for (pin, mux, signal) in rows {
            graph.create_mapping(pin, mux, signal)?;
        }
        for spec in &self.pins {
            let pin = graph.registry().find_pin(&spec.name)?;
            if let Some(reset) = &spec.reset {
                match reset.parse::<MuxSelection>() {
                    Ok(mux) => graph.set_pin_reset(pin, mux)?,
                    Err(_) => graph.set_pin_reset_signals(pin, reset)?,
                }
            }
            if spec.description.is_some() {
                graph.set_pin_description(pin, spec.description.clone());
            }
        }
        Ok(session)
    }

    /// Build a session with every pin at its reset setting and every pin map
    /// applied.
    pub fn build(&self) -> Result<DeviceSession> {
        self.open(None).map(|(session, _)| session)
    }

    /// Build a session and restore `settings` into it. Without settings the
    /// pins start at their reset setting; with them, the saved selections
    /// replace whatever the pin maps placed. Settings entries that could not
    /// be applied are returned alongside the session.
    pub fn open(&self, settings: Option<&Settings>) -> Result<(DeviceSession, Vec<DeviceError>)> {
        let mut session = self.assemble()?;
        if settings.is_none() {
            session.graph_mut().apply_reset();
        }
        for spec in &self.pin_maps {
            session
                .add_pin_map(&spec.map, spec.enabled_by.as_deref())
                .with_context(|| format!("pin map {:?}", spec.map))?;
        }
        for spec in self.variables.iter().filter(|v| v.kind == "choice") {
            session.add_choice_pin_maps(&spec.key)?;
        }
        let failures = settings.map(|s| session.load_settings(s)).unwrap_or_default();
        tracing::info!(
            device = %self.name,
            pins = session.registry().pin_count(),
            variables = session.vars().len(),
            "device loaded"
        );
        Ok((session, failures))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const BOARD: &str = r#"
name = "test-board"

[session]
auto_check = false

[[peripherals]]
name = "FTM0"
clock_register = "SIM->SCGC6"
clock_mask = "SIM_SCGC6_FTM0_MASK"

[[pins]]
name = "PTA3"
mux = { mux0 = "GPIOA_3", mux3 = "FTM0_CH0" }
reset = "mux0"

[[pins]]
name = "PTB0"
mux = { mux0 = "GPIOB_0/LLWU_P5", mux2 = "I2C0_SCL", mux3 = "FTM0_CH0" }
reset = "GPIOB_0/LLWU_P5"
description = "Sensor"

[[variables]]
key = "/FTM0/enable"
kind = "boolean"
default = false

[[variables]]
key = "/FTM0/period"
kind = "long"
default = 100
min = 1
max = 1000
enabled_by = "/FTM0/enable"

[[variables]]
key = "/FTM0/clockSource"
kind = "choice"
default = "bus"
type_name = "FtmClock"
choices = [
  { name = "Bus clock", value = "bus", enum_name = "Bus" },
  { name = "Fixed clock", value = "fixed", enum_name = "Fixed" },
]

[[variables]]
key = "/FTM0/prescale"
kind = "long"
value_of = "(/FTM0/clockSource==fixed)?8:1"

[[pin_maps]]
map = "FTM0_CH0,PTA3"
enabled_by = "/FTM0/enable"
"#;

    #[test]
    fn board_builds_at_reset() {
        let session = DeviceDescription::from_toml(BOARD).unwrap().build().unwrap();
        let reg = session.registry();
        let pta3 = reg.find_pin("PTA3").unwrap();
        let ptb0 = reg.find_pin("PTB0").unwrap();
        assert_eq!(session.graph().pin_selection(pta3), MuxSelection::Mux0);
        assert_eq!(session.graph().pin_selection(ptb0), MuxSelection::Mux0);
        assert_eq!(reg.pin(ptb0).description(), Some("Sensor"));

        let ftm0 = reg.find_peripheral("FTM0").unwrap();
        assert_eq!(reg.peripheral(ftm0).clock().register.as_deref(), Some("SIM->SCGC6"));

        let period = session.vars().variable("/FTM0/period").unwrap();
        assert!(!period.is_enabled());
        let prescale = session.vars().variable("/FTM0/prescale").unwrap();
        assert!(prescale.is_derived());
        assert_eq!(prescale.value_as_long(), Some(1));
    }

    #[test]
    fn enable_switches_pin_map() {
        let mut session = DeviceDescription::from_toml(BOARD).unwrap().build().unwrap();
        session.set_value("/FTM0/enable", true).unwrap();
        let pta3 = session.registry().find_pin("PTA3").unwrap();
        assert_eq!(session.graph().pin_selection(pta3), MuxSelection::Mux3);
        assert!(session.vars().variable("/FTM0/period").unwrap().is_enabled());
    }

    #[test]
    fn rejects_bad_descriptions() {
        let bad_kind = "name = \"x\"\n[[variables]]\nkey = \"/a/b\"\nkind = \"matrix\"\n";
        assert!(DeviceDescription::from_toml(bad_kind).unwrap().build().is_err());

        let duplicate = "name = \"x\"\n[[pins]]\nname = \"PTA0\"\n[[pins]]\nname = \"PTA0\"\n";
        let err = DeviceDescription::from_toml(duplicate).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("PTA0"));

        assert!(DeviceDescription::from_toml("name = \"x\"\nbogus = 1\n").is_err());
    }
}
