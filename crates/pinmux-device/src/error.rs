//! Error types for the device model.

use pinmux_core::{MuxSelection, StructuralError};
use pinmux_vars::VarError;

/// Errors from run-time requests against a device session.
///
/// Invalid requests fail here; inconsistent but legal states (conflicts,
/// out-of-range values) are reported as statuses instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Variable(#[from] VarError),

    #[error("pin {pin} has no {mux} mapping")]
    NoMapping { pin: String, mux: MuxSelection },

    #[error("mapping {mapping} is not a placement of signal {signal}")]
    ForeignMapping { mapping: String, signal: String },

    #[error("pin {pin}: invalid PCR setting '{value}'")]
    InvalidProperties { pin: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DeviceError::NoMapping {
            pin: "PTA3".into(),
            mux: MuxSelection::Mux5,
        };
        assert_eq!(err.to_string(), "pin PTA3 has no mux5 mapping");

        let err: DeviceError = StructuralError::PinNotFound("PTZ9".into()).into();
        assert_eq!(err.to_string(), "pin PTZ9 not found");
    }
}
