//! Builders for the three protocol entry points.

use crate::core::{Event, Lookup, State};
use chrono::{DateTime, Utc};

/// Arguments to [`SystemHandle::start_transition`](super::SystemHandle::start_transition).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartTransition {
    pub(crate) event: Option<Lookup<Event>>,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) message: Option<String>,
}

impl StartTransition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the triggering event (optional).
    pub fn event(mut self, event: impl Into<Lookup<Event>>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the start time (optional, defaults to now).
    pub fn start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    /// Set a message kept on the open transition (optional).
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Arguments to [`SystemHandle::end_transition`](super::SystemHandle::end_transition).
#[derive(Clone, Debug, PartialEq)]
pub struct EndTransition {
    pub(crate) state: Lookup<State>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) message: Option<String>,
    pub(crate) failed: bool,
}

impl EndTransition {
    pub fn new(state: impl Into<Lookup<State>>) -> Self {
        Self {
            state: state.into(),
            end_time: None,
            message: None,
            failed: false,
        }
    }

    /// Set the end time (optional, defaults to now).
    pub fn end_time(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self
    }

    /// Replace the open transition's message (optional; kept when unset).
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failed(mut self, failed: bool) -> Self {
        self.failed = failed;
        self
    }
}

/// Arguments to the one-phase [`SystemHandle::transition`](super::SystemHandle::transition).
///
/// `start_time` and `end_time` each default to the current time on their
/// own. Supplying only one of them measures the duration against "now",
/// which is negative when the given time lies in the future.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionRequest {
    pub(crate) state: Option<Lookup<State>>,
    pub(crate) event: Option<Lookup<Event>>,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) message: Option<String>,
    pub(crate) failed: bool,
}

impl TransitionRequest {
    pub fn new(state: impl Into<Lookup<State>>) -> Self {
        Self {
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// Set the triggering event (optional).
    pub fn event(mut self, event: impl Into<Lookup<Event>>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    pub fn end_time(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failed(mut self, failed: bool) -> Self {
        self.failed = failed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_collect_arguments() {
        let start = StartTransition::new().event("Boot").message("warming up");
        assert_eq!(start.event, Some(Lookup::Name("Boot".to_string())));
        assert_eq!(start.message.as_deref(), Some("warming up"));
        assert_eq!(start.start_time, None);

        let end = EndTransition::new(3_i64).failed(true);
        assert_eq!(end.state, Lookup::Id(3));
        assert!(end.failed);
        assert_eq!(end.message, None);
    }

    #[test]
    fn default_request_has_no_state() {
        let request = TransitionRequest::default().event("Save");
        assert_eq!(request.state, None);
        assert!(!request.failed);
    }
}
