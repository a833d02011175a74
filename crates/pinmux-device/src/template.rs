//! Loader rules that split raw signal names into peripheral and suffix.
//!
//! A rule is a regular expression matched against the whole signal name,
//! plus replacement templates (`$1`, `${name}`) that produce the
//! peripheral base, instance and signal suffix. Rules are tried in order;
//! the first match wins.

use pinmux_core::StructuralError;
use regex::Regex;

use crate::registry::{PeripheralId, Registry, SignalId};

/// One name-splitting rule.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    pattern: Regex,
    base: String,
    instance: String,
    suffix: String,
}

/// Result of applying a rule to a signal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalParts {
    pub base: String,
    pub instance: String,
    pub suffix: String,
}

impl SignalParts {
    pub fn peripheral_name(&self) -> String {
        format!("{}{}", self.base, self.instance)
    }
}

impl TemplateRule {
    /// A rule whose groups 1, 2 and 3 are base, instance and suffix.
    pub fn new(pattern: &str) -> Result<Self, StructuralError> {
        Self::with_templates(pattern, "$1", "$2", "$3")
    }

    pub fn with_templates(pattern: &str, base: &str, instance: &str, suffix: &str) -> Result<Self, StructuralError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored).map_err(|e| StructuralError::InvalidTemplate {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern,
            base: base.to_string(),
            instance: instance.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn apply(&self, name: &str) -> Option<SignalParts> {
        let caps = self.pattern.captures(name.trim())?;
        let expand = |template: &str| {
            let mut out = String::new();
            caps.expand(template, &mut out);
            out
        };
        Some(SignalParts {
            base: expand(&self.base),
            instance: expand(&self.instance),
            suffix: expand(&self.suffix),
        })
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    rules: Vec<TemplateRule>,
}

const DEFAULT_RULES: &[&str] = &[
    r"(GPIO)([A-I])_(\d+)",
    r"(ADC)(\d)_(SE\d+[ab]?|DP\d+|DM\d+)",
    r"(CMP)(\d)_(IN\d|OUT)",
    r"(FTM)(\d)_(CH\d+|QD_PH[AB]|FLT\d|CLKIN\d)",
    r"(TPM)(\d)_(CH\d+|QD_PH[AB]|CLKIN\d)",
    r"(I2C)(\d)_(SCL|SDA|4WSCLOUT|4WSDAOUT)",
    r"(SPI)(\d)_(SCK|SIN|SOUT|MISO|MOSI|SS|PCS\d*)",
    r"(LPUART)(\d)_(TX|RX|CTS_b|RTS_b)",
    r"(UART)(\d)_(TX|RX|CTS_b|RTS_b|COL_b)",
    r"(LPTMR)(\d)_(ALT\d+)",
    r"(TSI)(\d)_(CH\d+)",
    r"(LLWU)()_(P\d+)",
    r"(PIT)()(\d+)",
    r"(VREF)()_(OUT)",
];

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinetis-style rules: supply nets, the common peripherals, then a
    /// catch-all `BASE<digits>_SUFFIX`.
    pub fn with_defaults() -> Result<Self, StructuralError> {
        let mut set = Self::new().with_rule(TemplateRule::with_templates(
            r"(?:VDD|VSS|VREF[HL]|VBAT)\w*",
            "POWER",
            "",
            "$0",
        )?);
        for pattern in DEFAULT_RULES {
            set = set.with_rule(TemplateRule::new(pattern)?);
        }
        Ok(set.with_rule(TemplateRule::new(r"([A-Za-z]+?)(\d*)_(\w+)")?))
    }

    pub fn with_rule(mut self, rule: TemplateRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append `other`'s rules after this set's.
    pub fn chain(mut self, other: TemplateSet) -> Self {
        self.rules.extend(other.rules);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn split(&self, name: &str) -> Result<SignalParts, StructuralError> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(name))
            .ok_or_else(|| StructuralError::UnmatchedTemplate(name.to_string()))
    }

    /// Find or create the signal named `raw` and its peripheral.
    pub fn register(&self, registry: &mut Registry, raw: &str) -> Result<(PeripheralId, SignalId), StructuralError> {
        let name = raw.trim();
        let parts = self.split(name)?;
        let peripheral = registry.find_or_create_peripheral(&parts.base, &parts.instance);
        let signal = registry.find_or_create_signal(name, peripheral, &parts.suffix);
        tracing::trace!(signal = name, peripheral = %parts.peripheral_name(), suffix = %parts.suffix, "signal registered");
        Ok((peripheral, signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_split_names() {
        let set = TemplateSet::with_defaults().unwrap();
        let parts = set.split("FTM0_CH3").unwrap();
        assert_eq!(parts.peripheral_name(), "FTM0");
        assert_eq!(parts.suffix, "CH3");

        let parts = set.split("GPIOC_12").unwrap();
        assert_eq!((parts.base.as_str(), parts.instance.as_str()), ("GPIO", "C"));

        let parts = set.split("VDD3").unwrap();
        assert_eq!(parts.peripheral_name(), "POWER");
        assert_eq!(parts.suffix, "VDD3");

        let parts = set.split("LLWU_P7").unwrap();
        assert_eq!(parts.peripheral_name(), "LLWU");

        let parts = set.split("EWM_IN").unwrap();
        assert_eq!(parts.peripheral_name(), "EWM");
        assert_eq!(parts.suffix, "IN");
    }

    #[test]
    fn lpuart_not_swallowed_by_uart() {
        let set = TemplateSet::with_defaults().unwrap();
        assert_eq!(set.split("LPUART1_RX").unwrap().base, "LPUART");
    }

    #[test]
    fn unmatched_and_invalid() {
        let set = TemplateSet::new().with_rule(TemplateRule::new(r"(I2C)(\d)_(SCL|SDA)").unwrap());
        assert_eq!(set.split("RESET_b"), Err(StructuralError::UnmatchedTemplate("RESET_b".into())));
        assert!(matches!(TemplateRule::new("(unclosed"), Err(StructuralError::InvalidTemplate { .. })));
    }

    #[test]
    fn register_is_idempotent() {
        let set = TemplateSet::with_defaults().unwrap();
        let mut reg = Registry::new();
        let (p1, s1) = set.register(&mut reg, "I2C0_SCL").unwrap();
        let (p2, s2) = set.register(&mut reg, " I2C0_SCL ").unwrap();
        let (p3, _) = set.register(&mut reg, "I2C0_SDA").unwrap();
        assert_eq!((p1, s1), (p2, s2));
        assert_eq!(p1, p3);
        assert_eq!(reg.peripheral(p1).signals().len(), 2);
        assert_eq!(reg.signal(s1).suffix(), "SCL");
    }
}
