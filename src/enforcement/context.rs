//! Context provided to protocol checks.

use crate::core::State;

/// Which protocol entry point is being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// `start_transition`
    Start,
    /// `end_transition`
    End,
    /// One-phase `transition`
    Immediate,
}

/// Facts about a system and a request.
///
/// Catalog names are unique, so a target is compared with the sentinel by
/// name and need not exist yet.
#[derive(Clone, Debug)]
pub struct ProtocolContext<'a> {
    pub operation: Operation,
    /// Whether the system currently has an open transition
    pub in_transition: bool,
    /// Name of the target state, if the request names one
    pub target: Option<&'a str>,
    /// The reserved transitioning state
    pub sentinel: &'a State,
}

impl ProtocolContext<'_> {
    pub(crate) fn targets_sentinel(&self) -> bool {
        self.target.is_some_and(|name| name == self.sentinel.name)
    }
}
