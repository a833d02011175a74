//! Pin control register (PCR) fields.
//!
//! A pin carries the non-mux part of its PCR as a raw word. The mux field is
//! owned by the mapping graph and is merged in by [`pcr_value`].

use pinmux_core::MuxSelection;

/// One bit field of the pin control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrField {
    pub name: &'static str,
    pub shift: u32,
    pub mask: u32,
}

impl PcrField {
    const fn new(name: &'static str, shift: u32, width_mask: u32) -> Self {
        Self {
            name,
            shift,
            mask: width_mask << shift,
        }
    }

    pub fn get(&self, pcr: u32) -> u32 {
        (pcr & self.mask) >> self.shift
    }

    /// `pcr` with this field replaced by `value`; excess bits are discarded.
    pub fn set(&self, pcr: u32, value: u32) -> u32 {
        (pcr & !self.mask) | (value.wrapping_shl(self.shift) & self.mask)
    }
}

pub const PULL: PcrField = PcrField::new("PULL", 0, 0x3);
pub const SLEW_RATE: PcrField = PcrField::new("SRE", 2, 0x1);
pub const PASSIVE_FILTER: PcrField = PcrField::new("PFE", 4, 0x1);
pub const OPEN_DRAIN: PcrField = PcrField::new("ODE", 5, 0x1);
pub const DRIVE_STRENGTH: PcrField = PcrField::new("DSE", 6, 0x1);
pub const MUX: PcrField = PcrField::new("MUX", 8, 0x7);
pub const LOCK: PcrField = PcrField::new("LK", 15, 0x1);
pub const IRQC: PcrField = PcrField::new("IRQC", 16, 0xF);
pub const INTERRUPT_FLAG: PcrField = PcrField::new("ISF", 24, 0x1);

/// Fields a pin stores as its properties.
pub const PROPERTY_FIELDS: &[PcrField] = &[PULL, SLEW_RATE, PASSIVE_FILTER, OPEN_DRAIN, DRIVE_STRENGTH, LOCK, IRQC];

pub const PROPERTIES_MASK: u32 =
    PULL.mask | SLEW_RATE.mask | PASSIVE_FILTER.mask | OPEN_DRAIN.mask | DRIVE_STRENGTH.mask | LOCK.mask | IRQC.mask;

/// Full PCR word for `properties` with the mux field set from `mux`.
/// Settings without a mux number leave the field zero.
pub fn pcr_value(properties: u32, mux: MuxSelection) -> u32 {
    let properties = properties & PROPERTIES_MASK;
    match mux.value() {
        Some(n) => MUX.set(properties, u32::from(n)),
        None => properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_layout() {
        assert_eq!(PULL.mask, 0x3);
        assert_eq!(DRIVE_STRENGTH.mask, 0x40);
        assert_eq!(MUX.mask, 0x700);
        assert_eq!(IRQC.mask, 0xF_0000);
        assert_eq!(PROPERTIES_MASK, 0x000F_8077);
        assert_eq!(PROPERTIES_MASK & MUX.mask, 0);
        assert_eq!(PROPERTIES_MASK & INTERRUPT_FLAG.mask, 0);
    }

    #[test]
    fn set_replaces_only_its_field() {
        let pcr = PULL.set(0, 3);
        let pcr = IRQC.set(pcr, 0xA);
        assert_eq!(pcr, 0x000A_0003);
        assert_eq!(IRQC.get(pcr), 0xA);
        assert_eq!(PULL.get(PULL.set(pcr, 1)), 1);
        assert_eq!(IRQC.get(PULL.set(pcr, 1)), 0xA);
        // value wider than the field is truncated
        assert_eq!(MUX.get(MUX.set(0, 0xF)), 0x7);
        assert_eq!(LOCK.set(0, 1 << 20), 0);
    }

    #[test]
    fn value_merges_mux() {
        assert_eq!(pcr_value(0x43, MuxSelection::Mux3), 0x343);
        assert_eq!(pcr_value(0x43, MuxSelection::Unassigned), 0x43);
        assert_eq!(pcr_value(0x43 | MUX.mask, MuxSelection::Mux1), 0x143);
    }
}
