//! Compiled formulas and their bindings to variables.

use std::fmt;

use pinmux_core::{Status, StatusKind};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::expr::Node;
use crate::store::VarId;
use crate::value::Value;

/// Handle to an expression owned by a [`crate::VariableStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr#{}", self.0)
    }
}

/// How an expression drives the variable it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The expression's value becomes the variable's value.
    Value,
    /// The variable is enabled while the expression is true.
    EnabledBy,
    /// The variable is hidden while the expression is true.
    HiddenBy,
    /// The variable carries an error status while the expression is true.
    ErrorIf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub target: VarId,
    pub role: Role,
}

pub(crate) type Outcome = Result<Value, EvalError>;

/// A formula over variables with a cached result.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    pub(crate) root: Node,
    pub(crate) inputs: Vec<VarId>,
    /// `None` once an input changed since the last evaluation.
    pub(crate) cache: Option<Outcome>,
    /// Last outcome delivered to bindings and listeners.
    pub(crate) published: Option<Outcome>,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) watched: bool,
    pub(crate) evaluations: u64,
}

impl Expression {
    pub(crate) fn new(source: impl Into<String>, root: Node, inputs: Vec<VarId>) -> Self {
        Self {
            source: source.into(),
            root,
            inputs,
            cache: None,
            published: None,
            bindings: Vec::new(),
            watched: false,
            evaluations: 0,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct variables the formula reads.
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Number of times the formula has been evaluated.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    pub fn is_stale(&self) -> bool {
        self.cache.is_none()
    }

    /// Error status for the last evaluation, if it failed.
    pub fn status(&self) -> Option<Status> {
        match self.cache.as_ref().or(self.published.as_ref())? {
            Ok(_) => None,
            Err(e) => Some(self.error_status(e)),
        }
    }

    pub(crate) fn error_status(&self, err: &EvalError) -> Status {
        Status::error(StatusKind::Expression, format!("{}: {err}", self.source))
    }

    /// True if the role is active for the given outcome.
    pub(crate) fn holds(outcome: &Outcome) -> bool {
        matches!(outcome, Ok(v) if v.as_bool() == Some(true))
    }
}

pub(crate) fn same_outcome(a: &Outcome, b: &Outcome) -> bool {
    match (a, b) {
        (Ok(a), Ok(b)) => a.same_as(b) || doubles_close(a, b),
        (Err(a), Err(b)) => a == b,
        _ => false,
    }
}

/// Doubles within a relative 1e-9 count as unchanged.
fn doubles_close(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(a), Value::Double(b)) => {
            let scale = a.abs().max(b.abs());
            scale > 0.0 && (a - b).abs() <= scale * 1e-9
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_comparison() {
        assert!(same_outcome(&Ok(Value::Long(1)), &Ok(Value::Long(1))));
        assert!(!same_outcome(&Ok(Value::Long(1)), &Ok(Value::Double(1.0))));
        assert!(same_outcome(&Ok(Value::Double(1.0)), &Ok(Value::Double(1.0 + 1e-12))));
        assert!(!same_outcome(&Ok(Value::Double(1.0)), &Ok(Value::Double(1.001))));
        assert!(same_outcome(&Err(EvalError::DivisionByZero), &Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn holds_only_for_true() {
        assert!(Expression::holds(&Ok(Value::Bool(true))));
        assert!(Expression::holds(&Ok(Value::Long(3))));
        assert!(!Expression::holds(&Ok(Value::Bool(false))));
        assert!(!Expression::holds(&Err(EvalError::DivisionByZero)));
    }
}
