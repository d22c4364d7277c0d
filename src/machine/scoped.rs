//! Block-scoped long-running transitions.
//!
//! [`ScopedTransition::run`] starts a transition, runs a block and always
//! ends the transition afterwards: with the success state when the block
//! returns `Ok`, with the failure state when it returns `Err` or panics.

use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

use super::request::{EndTransition, StartTransition};
use super::SystemHandle;
use crate::core::{Event, Lookup, State, Transition};
use crate::error::StsError;
use crate::store::TransitionStore;

/// Errors from a scoped transition.
#[derive(Debug, Error)]
pub enum ScopeError<E> {
    /// The block failed; the transition was ended with the failure state.
    #[error("scoped block failed: {0}")]
    Block(E),

    /// Starting or ending the transition failed.
    #[error(transparent)]
    Tracker(StsError),

    /// The block failed and the transition could not be ended either.
    #[error("scoped block failed ({block}) and ending the transition failed: {end}")]
    EndFailed { block: E, end: StsError },
}

/// Configuration for a block-scoped transition.
///
/// # Example
///
/// ```rust
/// use sts::machine::{ScopedTransition, Tracker};
/// use sts::store::MemoryStore;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let tracker = Tracker::new(MemoryStore::new());
/// let import = tracker.named("nightly import").await.unwrap();
///
/// let rows = ScopedTransition::new("Imported")
///     .event("Import")
///     .failure_state("Import Failed")
///     .run(&import, |_open| async { Ok::<_, std::io::Error>(128) })
///     .await
///     .unwrap();
///
/// assert_eq!(rows, 128);
/// assert_eq!(import.current_state().await.unwrap().unwrap().name, "Imported");
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct ScopedTransition {
    state: Lookup<State>,
    event: Option<Lookup<Event>>,
    message: Option<String>,
    failure_state: Option<Lookup<State>>,
    fail_on_error: Option<bool>,
}

impl ScopedTransition {
    pub fn new(state: impl Into<Lookup<State>>) -> Self {
        Self {
            state: state.into(),
            event: None,
            message: None,
            failure_state: None,
            fail_on_error: None,
        }
    }

    /// Set the triggering event (optional).
    pub fn event(mut self, event: impl Into<Lookup<Event>>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the message recorded on the transition (optional).
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// State to end with when the block fails (defaults to the success state).
    pub fn failure_state(mut self, state: impl Into<Lookup<State>>) -> Self {
        self.failure_state = Some(state.into());
        self
    }

    /// Whether a failing block marks the transition failed (defaults to the
    /// tracker configuration).
    pub fn fail_on_error(mut self, fail: bool) -> Self {
        self.fail_on_error = Some(fail);
        self
    }

    /// Start the transition, run `block` with the open record, then end it.
    ///
    /// A panicking block ends the transition like an error and the panic
    /// resumes afterwards.
    pub async fn run<S, F, Fut, T, E>(
        self,
        system: &SystemHandle<S>,
        block: F,
    ) -> Result<T, ScopeError<E>>
    where
        S: TransitionStore,
        F: FnOnce(Transition) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let fail_on_error = self
            .fail_on_error
            .unwrap_or(system.tracker().config().fail_on_error);

        let mut start = StartTransition::new();
        if let Some(event) = self.event {
            start = start.event(event);
        }
        if let Some(message) = &self.message {
            start = start.message(message.clone());
        }
        let opened = system
            .start_transition(start)
            .await
            .map_err(ScopeError::Tracker)?;

        let outcome = AssertUnwindSafe(block(opened)).catch_unwind().await;

        let failure = self.failure_state.unwrap_or_else(|| self.state.clone());
        match outcome {
            Ok(Ok(value)) => {
                system
                    .end_transition(EndTransition::new(self.state))
                    .await
                    .map_err(ScopeError::Tracker)?;
                Ok(value)
            }
            Ok(Err(error)) => {
                let reason = self.message.is_none().then(|| error.to_string());
                let end = failed_end(failure, reason, fail_on_error);
                match system.end_transition(end).await {
                    Ok(_) => Err(ScopeError::Block(error)),
                    Err(end) => Err(ScopeError::EndFailed { block: error, end }),
                }
            }
            Err(payload) => {
                let reason = self.message.is_none().then(|| panic_text(&*payload));
                let end = failed_end(failure, reason, fail_on_error);
                if let Err(e) = system.end_transition(end).await {
                    warn!(
                        system_id = system.id(),
                        error = %e,
                        "could not end transition after panic"
                    );
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

/// Without a configured message the failure reason becomes the message.
fn failed_end(state: Lookup<State>, reason: Option<String>, failed: bool) -> EndTransition {
    let end = EndTransition::new(state).failed(failed);
    match reason {
        Some(reason) => end.message(reason),
        None => end,
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SubjectRef;
    use crate::machine::Tracker;
    use crate::store::MemoryStore;

    async fn system() -> SystemHandle<MemoryStore> {
        Tracker::new(MemoryStore::new())
            .for_subject(SubjectRef::new("upload", 1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn success_ends_with_the_success_state() {
        let system = system().await;
        let result = ScopedTransition::new("Uploaded")
            .event("Upload")
            .message("3 files")
            .run(&system, |open| async move {
                assert!(open.is_open());
                Ok::<_, String>(open.id)
            })
            .await
            .unwrap();

        let last = system.last_transition().await.unwrap().unwrap();
        assert_eq!(last.id, result);
        assert_eq!(last.state.name, "Uploaded");
        assert_eq!(last.message.as_deref(), Some("3 files"));
        assert!(!last.failed);
        assert!(!system.in_transition().await.unwrap());
    }

    #[tokio::test]
    async fn error_ends_failed_with_the_error_text() {
        let system = system().await;
        let err = ScopedTransition::new("Uploaded")
            .failure_state("Upload Failed")
            .run(&system, |_| async { Err::<(), _>("disk full") })
            .await
            .unwrap_err();

        assert!(matches!(err, ScopeError::Block("disk full")));
        let last = system.last_transition().await.unwrap().unwrap();
        assert_eq!(last.state.name, "Upload Failed");
        assert_eq!(last.message.as_deref(), Some("disk full"));
        assert!(last.failed);
    }

    #[tokio::test]
    async fn failure_state_defaults_to_the_success_state() {
        let system = system().await;
        let _ = ScopedTransition::new("Uploaded")
            .message("nightly")
            .fail_on_error(false)
            .run(&system, |_| async { Err::<(), _>("timeout") })
            .await;

        let last = system.last_transition().await.unwrap().unwrap();
        assert_eq!(last.state.name, "Uploaded");
        assert_eq!(last.message.as_deref(), Some("nightly"));
        assert!(!last.failed);
    }

    #[tokio::test]
    async fn start_failure_skips_the_block() {
        let system = system().await;
        system
            .start_transition(StartTransition::new())
            .await
            .unwrap();

        let err = ScopedTransition::new("Uploaded")
            .run(&system, |_| async { Ok::<_, String>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ScopeError::Tracker(ref e) if e.is_state_error()));
        assert_eq!(system.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn panic_still_ends_the_transition() {
        let system = system().await;
        let scoped = system.clone();

        let joined = tokio::spawn(async move {
            ScopedTransition::new("Uploaded")
                .run(&scoped, |_| async {
                    if true {
                        panic!("worker crashed");
                    }
                    Ok::<_, String>(())
                })
                .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        let last = system.last_transition().await.unwrap().unwrap();
        assert!(last.failed);
        assert_eq!(last.message.as_deref(), Some("worker crashed"));
        assert!(!system.in_transition().await.unwrap());
    }
}
