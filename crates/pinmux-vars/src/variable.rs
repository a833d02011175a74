//! Typed configuration variables.
//!
//! A [`Variable`] is one struct with a [`VariableKind`] payload. Kind-specific
//! behaviour lives in three small capability traits ([`Validatable`],
//! [`Formattable`], [`Persistable`]) implemented on the payload by matching on
//! the tag. Variables are built with the `with_*` builders, then handed to a
//! [`crate::VariableStore`], which owns every mutation from then on.

use pinmux_core::{Status, StatusKind};
use serde::{Deserialize, Serialize};

use crate::choice::ChoiceData;
use crate::error::VarError;
use crate::value::Value;

/// Payload describing a variable's type and its constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VariableKind {
    Boolean {
        on_text: Option<String>,
        off_text: Option<String>,
    },
    Long {
        min: i64,
        max: i64,
        step: i64,
        radix: u32,
        offset: i64,
        units: Option<String>,
    },
    Double {
        min: f64,
        max: f64,
        units: Option<String>,
    },
    Str,
    Choice {
        choices: Vec<ChoiceData>,
    },
    Bitmask {
        permitted: u64,
        bit_names: Vec<String>,
    },
    List {
        separator: char,
        allowed: Option<Vec<String>>,
        max_items: Option<usize>,
    },
}

/// Range and format checks.
pub trait Validatable {
    /// Returns a message describing why `value` is invalid, if it is.
    fn validate(&self, value: &Value) -> Option<String>;
}

/// Human and code-generation text forms.
pub trait Formattable {
    /// Text shown to a user.
    fn display(&self, value: &Value) -> String;
    /// Text substituted into generated code. `None` when the value has no
    /// legal substitution (a choice value matching no entry).
    fn substitution(&self, value: &Value, type_name: Option<&str>) -> Option<String>;
}

/// Lossless string form for settings files.
pub trait Persistable {
    fn persist(&self, value: &Value) -> String;
    fn restore(&self, text: &str) -> Result<Value, String>;
}

impl VariableKind {
    pub fn name(&self) -> &'static str {
        match self {
            VariableKind::Boolean { .. } => "boolean",
            VariableKind::Long { .. } => "long",
            VariableKind::Double { .. } => "double",
            VariableKind::Str => "string",
            VariableKind::Choice { .. } => "choice",
            VariableKind::Bitmask { .. } => "bitmask",
            VariableKind::List { .. } => "list",
        }
    }

    /// Convert an arbitrary value into this kind's canonical representation.
    pub fn translate(&self, value: Value) -> Result<Value, String> {
        match self {
            VariableKind::Boolean { on_text, off_text } => {
                if let Value::Str(s) = &value {
                    let s = s.trim();
                    if on_text.as_deref() == Some(s) {
                        return Ok(Value::Bool(true));
                    }
                    if off_text.as_deref() == Some(s) {
                        return Ok(Value::Bool(false));
                    }
                }
                value.as_bool().map(Value::Bool).ok_or_else(|| "not a boolean".to_string())
            }
            VariableKind::Long { .. } | VariableKind::Bitmask { .. } => match value {
                Value::Double(d) if d.fract() != 0.0 => Err(format!("{d} is not an integer")),
                v => v.as_long().map(Value::Long).ok_or_else(|| "not an integer".to_string()),
            },
            VariableKind::Double { .. } => value
                .as_double()
                .map(Value::Double)
                .ok_or_else(|| "not a number".to_string()),
            VariableKind::Str => Ok(Value::Str(value.to_string())),
            VariableKind::Choice { choices } => {
                let by_index = |i: i64| {
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| choices.get(i))
                        .map(|c| Value::Str(c.value.clone()))
                        .ok_or_else(|| format!("choice index {i} out of range"))
                };
                match value {
                    Value::Long(i) => by_index(i),
                    Value::Bool(b) => by_index(i64::from(b)),
                    other => {
                        let text = other.to_string();
                        let text = text.trim();
                        choices
                            .iter()
                            .find(|c| c.value == text)
                            .or_else(|| choices.iter().find(|c| c.name == text))
                            .or_else(|| choices.iter().find(|c| c.name.eq_ignore_ascii_case(text)))
                            .map(|c| Value::Str(c.value.clone()))
                            .ok_or_else(|| format!("no choice matches {text:?}"))
                    }
                }
            }
            VariableKind::List { separator, .. } => Ok(Value::Str(
                split_list(&value.to_string(), *separator).join(&separator.to_string()),
            )),
        }
    }

    /// Index of the entry whose value equals `value`.
    pub fn choice_index(&self, value: &Value) -> Option<usize> {
        match (self, value) {
            (VariableKind::Choice { choices }, Value::Str(s)) => choices.iter().position(|c| &c.value == s),
            _ => None,
        }
    }
}

impl Validatable for VariableKind {
    fn validate(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (VariableKind::Long { min, max, step, .. }, Value::Long(v)) => {
                if v < min {
                    Some(format!("value {v} is below the minimum {min}"))
                } else if v > max {
                    Some(format!("value {v} is above the maximum {max}"))
                } else if *step > 1 && v % step != 0 {
                    Some(format!("value {v} is not a multiple of {step}"))
                } else {
                    None
                }
            }
            (VariableKind::Double { min, max, .. }, Value::Double(v)) => {
                if v.is_nan() {
                    Some("value is not a number".to_string())
                } else if v < min {
                    Some(format!("value {v} is below the minimum {min}"))
                } else if v > max {
                    Some(format!("value {v} is above the maximum {max}"))
                } else {
                    None
                }
            }
            (VariableKind::Choice { choices }, _) if choices.is_empty() => Some("no choices available".to_string()),
            (VariableKind::Choice { .. }, v) if self.choice_index(v).is_none() => {
                Some(format!("{v} is not a permitted choice"))
            }
            (VariableKind::Bitmask { permitted, .. }, Value::Long(v)) => {
                let illegal = (*v as u64) & !permitted;
                (illegal != 0).then(|| format!("illegal bits set: 0x{illegal:X}"))
            }
            (
                VariableKind::List {
                    separator,
                    allowed,
                    max_items,
                },
                Value::Str(s),
            ) => {
                let items = split_list(s, *separator);
                if let Some(max) = max_items {
                    if items.len() > *max {
                        return Some(format!("too many items ({} > {max})", items.len()));
                    }
                }
                let allowed = allowed.as_ref()?;
                items
                    .iter()
                    .find(|item| !allowed.iter().any(|a| a == *item))
                    .map(|item| format!("item {item} is not permitted"))
            }
            _ => None,
        }
    }
}

impl Formattable for VariableKind {
    fn display(&self, value: &Value) -> String {
        match (self, value) {
            (VariableKind::Long { radix, units, .. }, Value::Long(v)) => {
                let text = if *radix == 16 {
                    format!("0x{:X}", *v as u64)
                } else {
                    v.to_string()
                };
                with_units(text, units.as_deref())
            }
            (VariableKind::Double { units, .. }, Value::Double(v)) => with_units(v.to_string(), units.as_deref()),
            (VariableKind::Choice { choices }, v) => match self.choice_index(v) {
                Some(i) => choices[i].name.clone(),
                None => v.to_string(),
            },
            (VariableKind::Bitmask { .. }, Value::Long(v)) => format!("0x{:X}", *v as u64),
            (_, v) => v.to_string(),
        }
    }

    fn substitution(&self, value: &Value, type_name: Option<&str>) -> Option<String> {
        Some(match (self, value) {
            (VariableKind::Boolean { on_text, off_text }, Value::Bool(b)) => {
                let text = if *b { on_text } else { off_text };
                text.clone().unwrap_or_else(|| b.to_string())
            }
            (VariableKind::Long { radix, offset, .. }, Value::Long(v)) => {
                let v = v.wrapping_add(*offset);
                if *radix == 16 {
                    format!("0x{:X}", v as u64)
                } else {
                    v.to_string()
                }
            }
            (VariableKind::Choice { choices }, v) => {
                let choice = &choices[self.choice_index(v)?];
                choice
                    .enum_identifier(type_name)
                    .unwrap_or_else(|| choice.value.clone())
            }
            (VariableKind::Bitmask { .. }, Value::Long(v)) => format!("0x{:X}", *v as u64),
            (_, v) => v.to_string(),
        })
    }
}

impl Persistable for VariableKind {
    fn persist(&self, value: &Value) -> String {
        match (self, value) {
            (VariableKind::Bitmask { .. }, Value::Long(v)) => format!("0x{:X}", *v as u64),
            (_, v) => v.to_string(),
        }
    }

    fn restore(&self, text: &str) -> Result<Value, String> {
        match self {
            VariableKind::Str => Ok(Value::Str(text.to_string())),
            VariableKind::Double { .. } => text
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| e.to_string()),
            _ => self.translate(Value::Str(text.to_string())),
        }
    }
}

fn with_units(text: String, units: Option<&str>) -> String {
    match units {
        Some(u) if !u.is_empty() => format!("{text} {u}"),
        _ => text,
    }
}

fn split_list(text: &str, separator: char) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Last path component of a key: `/ADC0/clockSource` -> `clockSource`.
pub fn name_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    key: String,
    name: String,
    description: Option<String>,
    type_name: Option<String>,
    kind: VariableKind,
    value: Value,
    default: Value,
    disabled_value: Option<Value>,
    enabled: bool,
    hidden: bool,
    derived: bool,
    status: Option<Status>,
}

impl Variable {
    fn with_kind(key: impl Into<String>, kind: VariableKind, default: Value) -> Self {
        let key = key.into();
        Self {
            name: name_from_key(&key).to_string(),
            key,
            description: None,
            type_name: None,
            kind,
            value: default.clone(),
            default,
            disabled_value: None,
            enabled: true,
            hidden: false,
            derived: false,
            status: None,
        }
    }

    pub fn boolean(key: impl Into<String>, default: bool) -> Self {
        Self::with_kind(
            key,
            VariableKind::Boolean {
                on_text: None,
                off_text: None,
            },
            Value::Bool(default),
        )
    }

    pub fn long(key: impl Into<String>, default: i64) -> Self {
        Self::with_kind(
            key,
            VariableKind::Long {
                min: i64::MIN,
                max: i64::MAX,
                step: 1,
                radix: 10,
                offset: 0,
                units: None,
            },
            Value::Long(default),
        )
    }

    pub fn double(key: impl Into<String>, default: f64) -> Self {
        Self::with_kind(
            key,
            VariableKind::Double {
                min: f64::NEG_INFINITY,
                max: f64::INFINITY,
                units: None,
            },
            Value::Double(default),
        )
    }

    pub fn string(key: impl Into<String>, default: impl Into<String>) -> Self {
        Self::with_kind(key, VariableKind::Str, Value::Str(default.into()))
    }

    /// A choice variable defaulting to the entry at `default_index`.
    pub fn choice(key: impl Into<String>, choices: Vec<ChoiceData>, default_index: usize) -> Self {
        let default = choices
            .get(default_index)
            .or_else(|| choices.first())
            .map(|c| c.value.clone())
            .unwrap_or_default();
        Self::with_kind(key, VariableKind::Choice { choices }, Value::Str(default))
    }

    pub fn bitmask(key: impl Into<String>, permitted: u64, default: u64) -> Self {
        Self::with_kind(
            key,
            VariableKind::Bitmask {
                permitted,
                bit_names: Vec::new(),
            },
            Value::Long(default as i64),
        )
    }

    pub fn list(key: impl Into<String>, default: impl Into<String>) -> Self {
        let kind = VariableKind::List {
            separator: ',',
            allowed: None,
            max_items: None,
        };
        let default = kind
            .translate(Value::Str(default.into()))
            .unwrap_or_else(|_| Value::Str(String::new()));
        Self::with_kind(key, kind, default)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Type name used to build enum identifiers for choice entries.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Value reported while the variable is disabled.
    pub fn with_disabled_value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.disabled_value = Some(self.kind.translate(value.clone()).unwrap_or(value));
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Inclusive range. Applies to long and double variables.
    pub fn with_range(mut self, lo: i64, hi: i64) -> Self {
        match &mut self.kind {
            VariableKind::Long { min, max, .. } => {
                *min = lo;
                *max = hi;
            }
            VariableKind::Double { min, max, .. } => {
                *min = lo as f64;
                *max = hi as f64;
            }
            _ => {}
        }
        self
    }

    pub fn with_limits(mut self, lo: f64, hi: f64) -> Self {
        if let VariableKind::Double { min, max, .. } = &mut self.kind {
            *min = lo;
            *max = hi;
        }
        self
    }

    pub fn with_step(mut self, value: i64) -> Self {
        if let VariableKind::Long { step, .. } = &mut self.kind {
            *step = value.max(1);
        }
        self
    }

    pub fn with_radix(mut self, value: u32) -> Self {
        if let VariableKind::Long { radix, .. } = &mut self.kind {
            *radix = value;
        }
        self
    }

    /// Offset added to the value in substitutions.
    pub fn with_offset(mut self, value: i64) -> Self {
        if let VariableKind::Long { offset, .. } = &mut self.kind {
            *offset = value;
        }
        self
    }

    pub fn with_units(mut self, value: impl Into<String>) -> Self {
        match &mut self.kind {
            VariableKind::Long { units, .. } | VariableKind::Double { units, .. } => *units = Some(value.into()),
            _ => {}
        }
        self
    }

    pub fn with_on_off_text(mut self, on: impl Into<String>, off: impl Into<String>) -> Self {
        if let VariableKind::Boolean { on_text, off_text } = &mut self.kind {
            *on_text = Some(on.into());
            *off_text = Some(off.into());
        }
        self
    }

    pub fn with_bit_names(mut self, names: Vec<String>) -> Self {
        if let VariableKind::Bitmask { bit_names, .. } = &mut self.kind {
            *bit_names = names;
        }
        self
    }

    pub fn with_allowed(mut self, items: Vec<String>) -> Self {
        if let VariableKind::List { allowed, .. } = &mut self.kind {
            *allowed = Some(items);
        }
        self
    }

    pub fn with_max_items(mut self, n: usize) -> Self {
        if let VariableKind::List { max_items, .. } = &mut self.kind {
            *max_items = Some(n);
        }
        self
    }

    pub fn with_separator(mut self, c: char) -> Self {
        if let VariableKind::List { separator, .. } = &mut self.kind {
            *separator = c;
        }
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    /// Stored value, regardless of the enabled state.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_default(&self) -> bool {
        self.value.same_as(&self.default)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// True when the value is driven by an expression.
    pub fn is_derived(&self) -> bool {
        self.derived
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// The value consumers see: the disabled value while disabled, if one is
    /// declared, otherwise the stored value.
    pub fn effective_value(&self) -> &Value {
        match (&self.disabled_value, self.enabled) {
            (Some(disabled), false) => disabled,
            _ => &self.value,
        }
    }

    pub fn value_as_string(&self) -> String {
        self.kind.display(self.effective_value())
    }

    pub fn value_as_bool(&self) -> Option<bool> {
        self.effective_value().as_bool()
    }

    pub fn value_as_long(&self) -> Option<i64> {
        self.effective_value().as_long()
    }

    pub fn value_as_double(&self) -> Option<f64> {
        self.effective_value().as_double()
    }

    /// Code-generation text. Never fails: a value with no legal substitution
    /// yields a diagnostic placeholder.
    pub fn substitution_value(&self) -> String {
        self.kind
            .substitution(self.effective_value(), self.type_name())
            .unwrap_or_else(|| format!("No valid choice selected for {}", self.key))
    }

    pub fn persistent_value(&self) -> String {
        self.kind.persist(&self.value)
    }

    /// Parse a persisted string into this variable's value type.
    pub fn parse_persistent(&self, text: &str) -> Result<Value, VarError> {
        self.kind.restore(text).map_err(|reason| self.conversion_error(text, reason))
    }

    pub fn translate(&self, value: Value) -> Result<Value, VarError> {
        let text = value.to_string();
        self.kind
            .translate(value)
            .map_err(|reason| self.conversion_error(&text, reason))
    }

    fn conversion_error(&self, text: &str, reason: String) -> VarError {
        VarError::Conversion {
            key: self.key.clone(),
            value: text.to_string(),
            reason,
        }
    }

    /// Validation message for the stored value.
    pub fn validation_message(&self) -> Option<String> {
        self.kind.validate(&self.value)
    }

    pub(crate) fn validation_status(&self) -> Option<Status> {
        self.validation_message()
            .map(|msg| Status::error(StatusKind::Validation, format!("{}: {msg}", self.name)))
    }

    /// Choice entries, empty for other kinds.
    pub fn choices(&self) -> &[ChoiceData] {
        match &self.kind {
            VariableKind::Choice { choices } => choices,
            _ => &[],
        }
    }

    /// Currently selected choice entry.
    pub fn selected_choice(&self) -> Option<(usize, &ChoiceData)> {
        let index = self.kind.choice_index(self.effective_value())?;
        Some((index, &self.choices()[index]))
    }

    /// Structured sub-field used by `key.field` and `key[index].field`
    /// substitutions. Problems produce a diagnostic string.
    pub fn field(&self, field: &str, index: Option<usize>) -> String {
        if let Some(index) = index {
            let Some(choice) = self.choices().get(index) else {
                return format!("Index {index} out of range for {}", self.key);
            };
            return choice_field(choice, field, self.type_name())
                .unwrap_or_else(|| format!("Field {field} not available for {}[{index}]", self.key));
        }
        match field {
            "value" => self.substitution_value(),
            "name" => self.name.clone(),
            "description" => self.description.clone().unwrap_or_default(),
            "persistent" => self.persistent_value(),
            "size" => match &self.kind {
                VariableKind::List { separator, .. } => split_list(&self.value.to_string(), *separator).len().to_string(),
                _ => self.choices().len().to_string(),
            },
            "index" => match self.selected_choice() {
                Some((i, _)) => i.to_string(),
                None => format!("No valid choice selected for {}", self.key),
            },
            "enum" | "code" | "choiceName" => match self.selected_choice() {
                Some((_, choice)) => {
                    let field = if field == "choiceName" { "name" } else { field };
                    choice_field(choice, field, self.type_name())
                        .unwrap_or_else(|| format!("Field {field} not available for {}", self.key))
                }
                None => format!("No valid choice selected for {}", self.key),
            },
            _ => format!("Unknown field {field} for {}", self.key),
        }
    }

    pub(crate) fn set_value_raw(&mut self, value: Value) {
        self.value = value;
    }

    pub(crate) fn set_enabled_raw(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_hidden_raw(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub(crate) fn set_derived(&mut self, derived: bool) {
        self.derived = derived;
    }

    /// Replace the status. Returns true if it changed.
    pub(crate) fn replace_status(&mut self, status: Option<Status>) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }
}

fn choice_field(choice: &ChoiceData, field: &str, type_name: Option<&str>) -> Option<String> {
    match field {
        "name" => Some(choice.name.clone()),
        "value" => Some(choice.value.clone()),
        "enum" => choice.enum_identifier(type_name),
        "code" => choice.code(type_name),
        "pinMap" => choice.pin_map.clone(),
        _ => None,
    }
}
