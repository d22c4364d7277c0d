//! Crate-wide error type.

use crate::checkpoint::CheckpointError;
use crate::enforcement::Violation;
use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, StsError>;

/// Errors surfaced by the transition tracker.
#[derive(Debug, Error)]
pub enum StsError {
    /// A transition protocol rule was violated. Carries every rule that failed.
    #[error("state error: {}", join_violations(.violations))]
    State { violations: Vec<Violation> },

    /// A catalog entry or system looked up by identifier does not exist.
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    /// Out-of-range index or unsupported slice shape.
    #[error("index error: {0}")]
    Index(String),

    /// Slice shape that is well-formed but disallowed.
    #[error("value error: {0}")]
    Value(String),

    /// Failure reported by the persistence layer, including transaction conflicts.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl StsError {
    pub(crate) fn state(violation: Violation) -> Self {
        Self::State {
            violations: vec![violation],
        }
    }

    /// True when this is a protocol error that includes `violation`.
    pub fn violates(&self, violation: &Violation) -> bool {
        match self {
            Self::State { violations } => violations.contains(violation),
            _ => false,
        }
    }

    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::State { .. })
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
