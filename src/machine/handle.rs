//! The transition protocol for one system.
//!
//! Every write first checks the protocol rules against the current state of
//! the system, so a rejected request creates no catalog entries. It then
//! resolves its vocabulary and opens one snapshot in which it locks the
//! system row, looks for the open transition, checks the rules again and
//! writes. The check and the write are therefore a single unit with respect
//! to other writers on the same system. A rejected or failed write aborts the
//! snapshot; nothing is retried here.

use chrono::Utc;
use std::fmt;
use tracing::{debug, info, warn};

use super::request::{EndTransition, StartTransition, TransitionRequest};
use super::Tracker;
use crate::core::{get_duration, Lookup, NewTransition, State, System, Transition};
use crate::enforcement::{enforce, Operation, ProtocolContext, Violation};
use crate::error::{Result, StsError};
use crate::registry::Registry;
use crate::store::TransitionStore;

/// A system record bound to the tracker that loaded it.
pub struct SystemHandle<S: TransitionStore> {
    tracker: Tracker<S>,
    system: System,
}

impl<S: TransitionStore> Clone for SystemHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            system: self.system.clone(),
        }
    }
}

impl<S: TransitionStore> fmt::Debug for SystemHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemHandle")
            .field("system", &self.system)
            .finish()
    }
}

impl<S: TransitionStore> SystemHandle<S> {
    pub(crate) fn new(tracker: Tracker<S>, system: System) -> Self {
        Self { tracker, system }
    }

    pub fn id(&self) -> i64 {
        self.system.id
    }

    /// The system record as of loading (or the last [`SystemHandle::refresh`]).
    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn tracker(&self) -> &Tracker<S> {
        &self.tracker
    }

    /// Reload the system record, picking up a newer `modified` timestamp.
    pub async fn refresh(&mut self) -> Result<&System> {
        self.system = self.store().get_system(self.system.id).await?;
        Ok(&self.system)
    }

    pub(crate) fn store(&self) -> &S {
        self.tracker.store()
    }

    fn registry(&self) -> &Registry<S> {
        self.tracker.registry()
    }

    /// The most recently started transition.
    pub async fn last_transition(&self) -> Result<Option<Transition>> {
        Ok(self.store().latest_transition(self.id()).await?)
    }

    /// State of the most recently started transition; `None` without history.
    pub async fn current_state(&self) -> Result<Option<State>> {
        Ok(self.last_transition().await?.map(|t| t.state))
    }

    /// True while a transition in the reserved state has no end time.
    pub async fn in_transition(&self) -> Result<bool> {
        let sentinel = self.registry().transition_state().await?;
        self.has_open_transition(&sentinel).await
    }

    /// Failure flag of the most recently started transition.
    pub async fn failed_last_transition(&self) -> Result<Option<bool>> {
        Ok(self.last_transition().await?.map(|t| t.failed))
    }

    /// Open a long-running transition in the reserved state.
    pub async fn start_transition(&self, request: StartTransition) -> Result<Transition> {
        let StartTransition {
            event,
            start_time,
            message,
        } = request;
        let sentinel = self.registry().transition_state().await?;
        self.precheck(Operation::Start, None, &sentinel).await?;
        let event = self.registry().get(event).await?;
        let start_time = start_time.unwrap_or_else(Utc::now);

        let store = self.store();
        let mut snapshot = store.begin_snapshot().await?;
        let outcome = async {
            store.lock_system(&mut snapshot, self.id()).await?;
            let open = self.open_transition(&mut snapshot, &sentinel).await?;
            self.check(ProtocolContext {
                operation: Operation::Start,
                in_transition: open.is_some(),
                target: None,
                sentinel: &sentinel,
            })?;

            let created = store
                .insert_transition(
                    &mut snapshot,
                    NewTransition {
                        system_id: self.id(),
                        event,
                        state: sentinel.clone(),
                        message,
                        failed: false,
                        start_time,
                        end_time: None,
                        duration: None,
                    },
                )
                .await?;
            store.touch_system(&mut snapshot, self.id(), Utc::now()).await?;
            Ok::<_, StsError>(created)
        }
        .await;

        let created = self.finish(snapshot, outcome).await?;
        info!(
            system_id = self.id(),
            event = created.event.as_ref().map(|e| e.name.as_str()),
            "started transition"
        );
        Ok(created)
    }

    /// Close the open transition with a terminal state.
    ///
    /// The open record's message is kept unless the request carries one.
    pub async fn end_transition(&self, request: EndTransition) -> Result<Transition> {
        let EndTransition {
            state,
            end_time,
            message,
            failed,
        } = request;
        let sentinel = self.registry().transition_state().await?;
        self.precheck(Operation::End, Some(&state), &sentinel).await?;
        let state = self.registry().state(state).await?;
        let end_time = end_time.unwrap_or_else(Utc::now);

        let store = self.store();
        let mut snapshot = store.begin_snapshot().await?;
        let outcome = async {
            store.lock_system(&mut snapshot, self.id()).await?;
            let open = self.open_transition(&mut snapshot, &sentinel).await?;
            self.check(ProtocolContext {
                operation: Operation::End,
                in_transition: open.is_some(),
                target: Some(state.name.as_str()),
                sentinel: &sentinel,
            })?;
            let Some(mut record) = open else {
                return Err(StsError::state(Violation::NotInTransition));
            };

            record.close(state.clone(), end_time, message, failed);
            store.update_transition(&mut snapshot, &record).await?;
            store.touch_system(&mut snapshot, self.id(), Utc::now()).await?;
            Ok::<_, StsError>(record)
        }
        .await;

        let closed = self.finish(snapshot, outcome).await?;
        info!(
            system_id = self.id(),
            state = %closed.state,
            duration_ms = closed.duration,
            failed = closed.failed,
            "ended transition"
        );
        Ok(closed)
    }

    /// Record a complete transition in one step.
    ///
    /// Fails while a long-running transition is open, and when the target
    /// state is missing or reserved; all broken rules are reported together.
    pub async fn transition(&self, request: TransitionRequest) -> Result<Transition> {
        let TransitionRequest {
            state,
            event,
            start_time,
            end_time,
            message,
            failed,
        } = request;
        let sentinel = self.registry().transition_state().await?;
        self.precheck(Operation::Immediate, state.as_ref(), &sentinel).await?;
        let state = self.registry().get(state).await?;
        let event = self.registry().get(event).await?;
        let start_time = start_time.unwrap_or_else(Utc::now);
        let end_time = end_time.unwrap_or_else(Utc::now);

        let store = self.store();
        let mut snapshot = store.begin_snapshot().await?;
        let outcome = async {
            store.lock_system(&mut snapshot, self.id()).await?;
            let open = self.open_transition(&mut snapshot, &sentinel).await?;
            self.check(ProtocolContext {
                operation: Operation::Immediate,
                in_transition: open.is_some(),
                target: state.as_ref().map(|state| state.name.as_str()),
                sentinel: &sentinel,
            })?;
            let Some(state) = state else {
                return Err(StsError::state(Violation::MissingState));
            };

            let created = store
                .insert_transition(
                    &mut snapshot,
                    NewTransition {
                        system_id: self.id(),
                        event,
                        state,
                        message,
                        failed,
                        start_time,
                        end_time: Some(end_time),
                        duration: Some(get_duration(start_time, Some(end_time))),
                    },
                )
                .await?;
            store.touch_system(&mut snapshot, self.id(), Utc::now()).await?;
            Ok::<_, StsError>(created)
        }
        .await;

        let created = self.finish(snapshot, outcome).await?;
        info!(
            system_id = self.id(),
            state = %created.state,
            event = created.event.as_ref().map(|e| e.name.as_str()),
            duration_ms = created.duration,
            "recorded transition"
        );
        Ok(created)
    }

    async fn has_open_transition(&self, sentinel: &State) -> Result<bool> {
        Ok(self
            .store()
            .has_open_transition(self.id(), sentinel.id)
            .await?)
    }

    async fn open_transition(
        &self,
        snapshot: &mut S::Snapshot,
        sentinel: &State,
    ) -> Result<Option<Transition>> {
        let found = self
            .store()
            .find_open_transition(snapshot, self.id(), sentinel.id)
            .await?;
        Ok(found.filter(|t| t.in_transition(sentinel)))
    }

    /// Check the rules before the target state is fetched or created.
    ///
    /// The snapshot check stays authoritative; this only turns away requests
    /// that would already fail without writing their vocabulary.
    async fn precheck(
        &self,
        operation: Operation,
        target: Option<&Lookup<State>>,
        sentinel: &State,
    ) -> Result<()> {
        let in_transition = self.has_open_transition(sentinel).await?;
        let name = match target {
            None => None,
            Some(Lookup::Record(state)) => Some(state.name.clone()),
            Some(Lookup::Name(name)) => Some(name.clone()),
            Some(Lookup::Id(id)) => Some(self.registry().by_id::<State>(*id).await?.name),
        };
        self.check(ProtocolContext {
            operation,
            in_transition,
            target: name.as_deref(),
            sentinel,
        })
    }

    fn check(&self, context: ProtocolContext<'_>) -> Result<()> {
        enforce(&context).inspect_err(|e| {
            debug!(
                system_id = self.id(),
                operation = ?context.operation,
                error = %e,
                "rejected transition request"
            );
        })
    }

    async fn finish<T>(&self, snapshot: S::Snapshot, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.store().commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = self.store().abort_snapshot(snapshot).await {
                    warn!(system_id = self.id(), error = %abort, "failed to abort snapshot");
                }
                Err(e)
            }
        }
    }
}
