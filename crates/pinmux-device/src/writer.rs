//! Peripheral-kind registry.
//!
//! Code generation needs to know, per kind of peripheral, which group it is
//! listed under, what its generated class is called and how its signals are
//! numbered. Kinds are found by base-name prefix in a static table; bases
//! with no entry get [`GenericWriter`].

use std::cmp::Ordering;

use crate::registry::{Peripheral, Registry, SignalId};

pub trait PeripheralWriter: std::fmt::Debug {
    /// Group heading, e.g. `PWM, Input capture and Output compare`.
    fn group_name(&self) -> &'static str;

    /// Generated class name for an instance.
    fn class_name(&self, peripheral: &Peripheral) -> String;

    /// Channel number of a signal suffix, if the kind numbers its signals.
    fn signal_index(&self, suffix: &str) -> Option<u32>;
}

fn capitalise(base: &str) -> String {
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

fn trailing_number(suffix: &str) -> Option<u32> {
    let digits = suffix.trim_end_matches(|c: char| !c.is_ascii_digit());
    let start = digits.rfind(|c: char| !c.is_ascii_digit()).map_or(0, |i| i + 1);
    digits[start..].parse().ok()
}

#[derive(Debug)]
pub struct GenericWriter;

impl PeripheralWriter for GenericWriter {
    fn group_name(&self) -> &'static str {
        "Miscellaneous"
    }

    fn class_name(&self, peripheral: &Peripheral) -> String {
        capitalise(peripheral.name())
    }

    fn signal_index(&self, _suffix: &str) -> Option<u32> {
        None
    }
}

#[derive(Debug)]
struct DigitalIoWriter;

impl PeripheralWriter for DigitalIoWriter {
    fn group_name(&self) -> &'static str {
        "Digital Input/Output"
    }

    fn class_name(&self, peripheral: &Peripheral) -> String {
        format!("Gpio{}", peripheral.instance())
    }

    fn signal_index(&self, suffix: &str) -> Option<u32> {
        suffix.parse().ok()
    }
}

#[derive(Debug)]
struct AnalogueWriter;

impl PeripheralWriter for AnalogueWriter {
    fn group_name(&self) -> &'static str {
        "Analogue Input"
    }

    fn class_name(&self, peripheral: &Peripheral) -> String {
        capitalise(peripheral.name())
    }

    fn signal_index(&self, suffix: &str) -> Option<u32> {
        let body = ["SE", "DP", "DM", "IN"]
            .iter()
            .find_map(|p| suffix.strip_prefix(p))
            .unwrap_or(suffix);
        body.trim_end_matches(['a', 'b']).parse().ok()
    }
}

const QUAD_INDEX: u32 = 16;
const CLOCK_INDEX: u32 = 18;
const FAULT_INDEX: u32 = 20;

#[derive(Debug)]
struct TimerWriter;

impl PeripheralWriter for TimerWriter {
    fn group_name(&self) -> &'static str {
        "PWM, Input capture and Output compare"
    }

    fn class_name(&self, peripheral: &Peripheral) -> String {
        capitalise(peripheral.name())
    }

    fn signal_index(&self, suffix: &str) -> Option<u32> {
        if let Some(ch) = suffix.strip_prefix("CH") {
            return ch.parse().ok();
        }
        match suffix {
            "QD_PHA" => Some(QUAD_INDEX),
            "QD_PHB" => Some(QUAD_INDEX + 1),
            _ if suffix.starts_with("CLKIN") => trailing_number(suffix).and_then(|n| CLOCK_INDEX.checked_add(n)),
            _ if suffix.starts_with("FLT") => trailing_number(suffix).and_then(|n| FAULT_INDEX.checked_add(n)),
            _ => None,
        }
    }
}

/// Communication interfaces: signals ordered by a fixed role list.
#[derive(Debug)]
struct SerialWriter {
    group: &'static str,
    roles: &'static [&'static str],
}

impl PeripheralWriter for SerialWriter {
    fn group_name(&self) -> &'static str {
        self.group
    }

    fn class_name(&self, peripheral: &Peripheral) -> String {
        capitalise(peripheral.name())
    }

    fn signal_index(&self, suffix: &str) -> Option<u32> {
        if let Some(i) = self.roles.iter().position(|r| *r == suffix) {
            return Some(i as u32);
        }
        // PCS0..PCSn follow the fixed roles
        let n = suffix.strip_prefix("PCS")?.parse::<u32>().ok()?;
        u32::try_from(self.roles.len()).ok()?.checked_add(n)
    }
}

#[derive(Debug)]
struct NumberedWriter {
    group: &'static str,
}

impl PeripheralWriter for NumberedWriter {
    fn group_name(&self) -> &'static str {
        self.group
    }

    fn class_name(&self, peripheral: &Peripheral) -> String {
        capitalise(peripheral.name())
    }

    fn signal_index(&self, suffix: &str) -> Option<u32> {
        trailing_number(suffix)
    }
}

static DIGITAL_IO: DigitalIoWriter = DigitalIoWriter;
static ANALOGUE: AnalogueWriter = AnalogueWriter;
static TIMER: TimerWriter = TimerWriter;
static GENERIC: GenericWriter = GenericWriter;
static I2C: SerialWriter = SerialWriter {
    group: "I2C, Inter-Integrated-Circuit Interface",
    roles: &["SCL", "SDA", "4WSCLOUT", "4WSDAOUT"],
};
static SPI: SerialWriter = SerialWriter {
    group: "SPI, Serial Peripheral Interface",
    roles: &["SCK", "SIN", "SOUT", "MISO", "MOSI", "SS"],
};
static UART: SerialWriter = SerialWriter {
    group: "UART, Universal Asynchronous Receiver/Transmitter",
    roles: &["TX", "RX", "CTS_b", "RTS_b", "COL_b"],
};
static CAN: SerialWriter = SerialWriter {
    group: "CAN, Controller Area Network",
    roles: &["TX", "RX"],
};
static LPTMR: NumberedWriter = NumberedWriter {
    group: "Low Power Timer",
};
static PIT: NumberedWriter = NumberedWriter {
    group: "Periodic Interrupt Timer",
};
static LLWU: NumberedWriter = NumberedWriter {
    group: "Low-leakage Wake-up Unit",
};
static TSI: NumberedWriter = NumberedWriter {
    group: "Touch Sense Interface",
};

/// Base-name prefixes, longest first so `LPUART` wins over `UART`.
static KINDS: &[(&str, &(dyn PeripheralWriter + Sync))] = &[
    ("LPUART", &UART),
    ("LPTMR", &LPTMR),
    ("GPIO", &DIGITAL_IO),
    ("PORT", &DIGITAL_IO),
    ("LLWU", &LLWU),
    ("UART", &UART),
    ("ADC", &ANALOGUE),
    ("CMP", &ANALOGUE),
    ("DAC", &ANALOGUE),
    ("FTM", &TIMER),
    ("TPM", &TIMER),
    ("PIT", &PIT),
    ("TSI", &TSI),
    ("I2C", &I2C),
    ("SPI", &SPI),
    ("CAN", &CAN),
];

/// Writer for a peripheral base name.
pub fn writer_for(base: &str) -> &'static dyn PeripheralWriter {
    let upper = base.to_ascii_uppercase();
    KINDS
        .iter()
        .find(|(prefix, _)| upper.starts_with(prefix))
        .map_or(&GENERIC as &'static dyn PeripheralWriter, |(_, w)| *w as &'static dyn PeripheralWriter)
}

/// The peripheral's signals ordered by the kind's numbering. Signals the
/// kind does not number follow in name order.
pub fn ordered_signals(registry: &Registry, peripheral: &Peripheral) -> Vec<SignalId> {
    let writer = writer_for(peripheral.base());
    let mut signals = peripheral.signals().to_vec();
    signals.sort_by(|a, b| {
        let (sa, sb) = (registry.signal(*a), registry.signal(*b));
        match (writer.signal_index(sa.suffix()), writer.signal_index(sb.suffix())) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| sa.name().cmp(sb.name())),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => sa.name().cmp(sb.name()),
        }
    });
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_by_prefix() {
        assert_eq!(writer_for("FTM").group_name(), "PWM, Input capture and Output compare");
        assert_eq!(writer_for("LPUART").group_name(), writer_for("UART").group_name());
        assert_eq!(writer_for("EWM").group_name(), "Miscellaneous");
    }

    #[test]
    fn signal_numbering() {
        let ftm = writer_for("FTM");
        assert_eq!(ftm.signal_index("CH5"), Some(5));
        assert_eq!(ftm.signal_index("QD_PHB"), Some(QUAD_INDEX + 1));
        assert_eq!(ftm.signal_index("FLT2"), Some(FAULT_INDEX + 2));
        assert_eq!(writer_for("ADC").signal_index("SE17a"), Some(17));
        assert_eq!(writer_for("SPI").signal_index("PCS1"), Some(7));
        assert_eq!(writer_for("EWM").signal_index("IN"), None);
    }

    #[test]
    fn huge_signal_numbers_have_no_index() {
        assert_eq!(writer_for("SPI").signal_index("PCS4294967295"), None);
        assert_eq!(writer_for("FTM").signal_index("CLKIN4294967295"), None);
        assert_eq!(writer_for("FTM").signal_index("FLT4294967280"), None);
        assert_eq!(writer_for("FTM").signal_index("CH99999999999"), None);
    }

    #[test]
    fn signals_sorted_by_channel() {
        let mut reg = Registry::new();
        let ftm = reg.create_peripheral("FTM", "0").unwrap();
        let ch10 = reg.create_signal("FTM0_CH10", ftm, "CH10").unwrap();
        let flt = reg.create_signal("FTM0_FLT0", ftm, "FLT0").unwrap();
        let ch2 = reg.create_signal("FTM0_CH2", ftm, "CH2").unwrap();
        let odd = reg.create_signal("FTM0_TRIG", ftm, "TRIG").unwrap();
        let order = ordered_signals(&reg, reg.peripheral(ftm));
        assert_eq!(order, vec![ch2, ch10, flt, odd]);
        assert_eq!(writer_for("FTM").class_name(reg.peripheral(ftm)), "Ftm0");
    }
}
