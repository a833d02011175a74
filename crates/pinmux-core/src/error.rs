//! Error types for model construction.
//!
//! Structural errors are fatal while a device model is being built: they abort
//! the construction of the entity (or of the whole session) that caused them.
//! Problems found after construction are reported as [`crate::Status`] values
//! instead.

/// Errors raised while building or wiring the device model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("pin {0} already exists")]
    DuplicatePin(String),

    #[error("signal {0} already exists")]
    DuplicateSignal(String),

    #[error("peripheral {0} already exists")]
    DuplicatePeripheral(String),

    #[error("variable {0} already exists")]
    DuplicateVariable(String),

    #[error("pin {0} not found")]
    PinNotFound(String),

    #[error("signal {0} not found")]
    SignalNotFound(String),

    #[error("peripheral {0} not found")]
    PeripheralNotFound(String),

    #[error("variable {0} not found")]
    VariableNotFound(String),

    #[error("{owner} already has reset mapping {existing}, cannot set {requested}")]
    DuplicateResetMapping {
        owner: String,
        existing: String,
        requested: String,
    },

    #[error("reset signals {signals} not found as an option for pin {pin}")]
    ResetSignalsNotFound { pin: String, signals: String },

    #[error("signal {signal} has a fixed pin mapping, cannot add {mapping}")]
    FixedMappingConflict { signal: String, mapping: String },

    #[error("signal {signal} cannot be mapped to pin {pin}")]
    NoSuchMapping { signal: String, pin: String },

    #[error("no template rule matches signal name {0}")]
    UnmatchedTemplate(String),

    #[error("invalid template pattern {pattern}: {reason}")]
    InvalidTemplate { pattern: String, reason: String },

    #[error("invalid mux selection {0}")]
    InvalidMuxSelection(String),

    #[error("invalid pin map entry {0}")]
    InvalidPinMap(String),

    #[error("syntax error in expression {expression}: {reason}")]
    ExpressionSyntax { expression: String, reason: String },

    #[error("circular dependency detected involving variable {0}")]
    CircularDependency(String),
}
