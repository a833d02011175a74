//! Severity-tagged status messages attached to model nodes.
//!
//! A status never alters the value it describes. Display layers roll the
//! statuses of child nodes up to their ancestors with [`most_severe`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// How serious a status is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Ok => write!(f, "OK"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// What produced a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Value out of declared range or format.
    Validation,
    /// Pin/signal mapping clash found by the conflict checker.
    Conflict,
    /// A formula could not be evaluated.
    Expression,
    /// Informational: the node is disabled by a controlling expression.
    Disabled,
    /// Forced by an `ErrorIf` expression.
    Forced,
}

/// A status message attached to a pin, signal, mapping or variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub severity: Severity,
    pub kind: StatusKind,
    pub message: String,
}

impl Status {
    pub fn new(severity: Severity, kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
        }
    }

    pub fn error(kind: StatusKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    pub fn warning(kind: StatusKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    pub fn info(kind: StatusKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, message)
    }

    /// True when the status should be shown as a problem.
    pub fn is_problem(&self) -> bool {
        self.severity >= Severity::Warning
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Pick the most severe status from a set of child statuses.
///
/// Ties keep the first status seen, so callers control precedence by order.
pub fn most_severe<'a, I>(statuses: I) -> Option<&'a Status>
where
    I: IntoIterator<Item = &'a Status>,
{
    let mut worst: Option<&Status> = None;
    for status in statuses {
        match worst {
            Some(w) if w.severity >= status.severity => {}
            _ => worst = Some(status),
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Ok < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn most_severe_keeps_first_of_equal() {
        let a = Status::warning(StatusKind::Validation, "a");
        let b = Status::error(StatusKind::Conflict, "b");
        let c = Status::error(StatusKind::Expression, "c");
        let all = [a.clone(), b.clone(), c];
        assert_eq!(most_severe(all.iter()), Some(&b));
        assert_eq!(most_severe([a.clone()].iter()), Some(&a));
        assert_eq!(most_severe(std::iter::empty()), None);
    }

    #[test]
    fn display_includes_severity() {
        let s = Status::error(StatusKind::Conflict, "pin PTB0 claimed twice");
        assert_eq!(s.to_string(), "ERROR: pin PTB0 claimed twice");
        assert!(s.is_problem());
        assert!(!Status::info(StatusKind::Disabled, "off").is_problem());
    }
}
