//! Protocol rule violations.

use thiserror::Error;

/// A transition protocol rule that a request broke.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("cannot start a transition while already in one")]
    AlreadyInTransition,

    #[error("cannot end a transition while not in one")]
    NotInTransition,

    #[error("cannot create a transition with an empty state")]
    MissingState,

    #[error("cannot target the reserved transitioning state '{name}'")]
    ReservedState { name: String },
}
