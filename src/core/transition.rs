//! Transition records.

use super::duration::{get_duration, get_natural_duration};
use super::vocabulary::{Event, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record of a single state change of one system.
///
/// A transition is created complete by the one-phase protocol, or opened by
/// `start_transition` (reserved state, no end time, no duration) and closed
/// exactly once by `end_transition`. It is immutable afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: i64,
    /// The system this transition belongs to
    pub system_id: i64,
    /// The event that caused the state change, if any
    pub event: Option<Event>,
    /// The resulting state
    pub state: State,
    pub message: Option<String>,
    pub failed: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between start and end; `None` while open
    pub duration: Option<i64>,
}

impl Transition {
    /// True while no end time has been recorded.
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// True when this record is the open transition of its system, given the
    /// reserved transitioning state.
    pub fn in_transition(&self, sentinel: &State) -> bool {
        self.state.id == sentinel.id && self.is_open()
    }

    /// Stored duration, or the time elapsed so far for an open transition.
    pub fn current_duration(&self) -> i64 {
        self.duration
            .unwrap_or_else(|| get_duration(self.start_time, self.end_time))
    }

    /// Natural-language rendering of [`Transition::current_duration`].
    pub fn natural_duration(&self, short: bool) -> String {
        get_natural_duration(self.start_time, self.end_time, short)
    }

    /// Close this transition. Only the protocol in `machine` calls this.
    pub(crate) fn close(
        &mut self,
        state: State,
        end_time: DateTime<Utc>,
        message: Option<String>,
        failed: bool,
    ) {
        self.duration = Some(get_duration(self.start_time, Some(end_time)));
        self.end_time = Some(end_time);
        self.state = state;
        self.failed = failed;
        if message.is_some() {
            self.message = message;
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            Some(event) => write!(f, "{event} => {}", self.state),
            None => write!(f, "=> {}", self.state),
        }
    }
}

/// Field values for a transition that has not been persisted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTransition {
    pub system_id: i64,
    pub event: Option<Event>,
    pub state: State,
    pub message: Option<String>,
    pub failed: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

impl NewTransition {
    pub fn into_transition(self, id: i64) -> Transition {
        Transition {
            id,
            system_id: self.system_id,
            event: self.event,
            state: self.state,
            message: self.message,
            failed: self.failed,
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn sentinel() -> State {
        State {
            id: 1,
            name: "Transition".to_string(),
        }
    }

    fn open_transition() -> Transition {
        NewTransition {
            system_id: 1,
            event: Some(Event {
                id: 1,
                name: "Initialize".to_string(),
            }),
            state: sentinel(),
            message: Some("booting".to_string()),
            failed: false,
            start_time: Utc::now() - TimeDelta::seconds(2),
            end_time: None,
            duration: None,
        }
        .into_transition(10)
    }

    #[test]
    fn open_transition_reports_in_transition() {
        let transition = open_transition();
        assert!(transition.is_open());
        assert!(transition.in_transition(&sentinel()));
        assert!(transition.current_duration() >= 2000);
    }

    #[test]
    fn close_sets_duration_and_state() {
        let mut transition = open_transition();
        let end = transition.start_time + TimeDelta::milliseconds(1500);
        let done = State {
            id: 2,
            name: "Initialized".to_string(),
        };

        transition.close(done.clone(), end, None, true);

        assert_eq!(transition.state, done);
        assert_eq!(transition.end_time, Some(end));
        assert_eq!(transition.duration, Some(1500));
        assert!(transition.failed);
        assert!(!transition.in_transition(&sentinel()));
        assert_eq!(transition.message.as_deref(), Some("booting"));
        assert_eq!(transition.natural_duration(false), "2 seconds");
    }

    #[test]
    fn close_overwrites_message_when_given() {
        let mut transition = open_transition();
        let end = transition.start_time + TimeDelta::milliseconds(10);
        transition.close(sentinel(), end, Some("done".to_string()), false);
        assert_eq!(transition.message.as_deref(), Some("done"));
    }

    #[test]
    fn display_shows_event_and_state() {
        let transition = open_transition();
        assert_eq!(transition.to_string(), "Initialize => Transition");
    }
}
