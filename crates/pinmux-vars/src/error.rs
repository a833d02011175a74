//! Error types for the variable engine.

use pinmux_core::StructuralError;

/// Errors from variable lookups and value conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VarError {
    #[error("variable {0} not found")]
    NotFound(String),

    #[error("cannot convert {value:?} for variable {key}: {reason}")]
    Conversion {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Failures while evaluating a formula.
///
/// These never escape an expression: they are turned into an error status on
/// the expression and on any variable it drives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("variable {0} not found")]
    MissingVariable(String),

    #[error("operator {op} cannot be applied to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("operator {op} cannot be applied to {operand}")]
    BadOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("shift amount {0} out of range")]
    ShiftOutOfRange(i64),
}

/// Errors from the framed settings file format.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid settings magic bytes")]
    InvalidMagic,

    #[error("unsupported settings version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailed { expected: String, actual: String },

    #[error("settings file too short: need at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VarError::NotFound("/ADC0/clockSource".into());
        assert!(err.to_string().contains("not found"));

        let err = EvalError::TypeMismatch {
            op: "+",
            lhs: "boolean",
            rhs: "long",
        };
        assert_eq!(err.to_string(), "operator + cannot be applied to boolean and long");
    }

    #[test]
    fn structural_converts() {
        let err: VarError = StructuralError::DuplicateVariable("/x".into()).into();
        assert!(matches!(err, VarError::Structural(_)));
    }
}
