//! Entries of a choice variable.

use serde::{Deserialize, Serialize};

/// One selectable entry of a choice variable.
///
/// `value` is what the variable stores and what substitution produces; `name`
/// is what a user sees. An entry may carry a pin map that is applied while it
/// is the selected entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceData {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_map: Option<String>,
}

impl ChoiceData {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enum_name: None,
            code_value: None,
            pin_map: None,
        }
    }

    pub fn with_enum(mut self, enum_name: impl Into<String>) -> Self {
        self.enum_name = Some(enum_name.into());
        self
    }

    pub fn with_code(mut self, code_value: impl Into<String>) -> Self {
        self.code_value = Some(code_value.into());
        self
    }

    pub fn with_pin_map(mut self, pin_map: impl Into<String>) -> Self {
        self.pin_map = Some(pin_map.into());
        self
    }

    /// Enum identifier for generated code, `TypeName_EnumName`.
    pub fn enum_identifier(&self, type_name: Option<&str>) -> Option<String> {
        let enum_name = self.enum_name.as_deref()?;
        Some(match type_name {
            Some(t) => format!("{t}_{enum_name}"),
            None => enum_name.to_string(),
        })
    }

    /// Code value, falling back to the enum identifier.
    pub fn code(&self, type_name: Option<&str>) -> Option<String> {
        self.code_value.clone().or_else(|| self.enum_identifier(type_name))
    }
}
