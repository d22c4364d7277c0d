//! The imperative shell: runs the pure core against a [`TransitionStore`].
//!
//! [`Tracker`] finds or creates systems and hands out [`SystemHandle`]s,
//! which carry the transition protocol and the history accessor.
//!
//! # Example
//!
//! ```rust
//! use sts::core::SubjectRef;
//! use sts::machine::{EndTransition, StartTransition, Tracker, TransitionRequest};
//! use sts::store::MemoryStore;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let tracker = Tracker::new(MemoryStore::new());
//! let order = tracker.for_subject(SubjectRef::new("order", 42)).await.unwrap();
//!
//! order.start_transition(StartTransition::new().event("Ship")).await.unwrap();
//! assert!(order.in_transition().await.unwrap());
//!
//! order.end_transition(EndTransition::new("Shipped")).await.unwrap();
//! order.transition(TransitionRequest::new("Delivered")).await.unwrap();
//!
//! assert_eq!(order.len().await.unwrap(), 2);
//! assert_eq!(order.current_state().await.unwrap().unwrap().name, "Delivered");
//! # });
//! ```

mod handle;
mod history;
mod request;
pub mod scoped;

pub use handle::SystemHandle;
pub use request::{EndTransition, StartTransition, TransitionRequest};
pub use scoped::{ScopeError, ScopedTransition};

use std::sync::Arc;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::core::{SubjectRef, System, Transition};
use crate::error::{Result, StsError};
use crate::registry::Registry;
use crate::store::{StoreError, TransitionStore};
use crate::subject::SubjectRegistry;

/// Entry point: owns the store, the vocabulary registry and configuration.
///
/// Cloning is cheap and clones share everything, including the cached
/// reserved state.
pub struct Tracker<S: TransitionStore> {
    store: Arc<S>,
    registry: Arc<Registry<S>>,
    config: Arc<TrackerConfig>,
    subjects: Arc<SubjectRegistry>,
}

impl<S: TransitionStore> Clone for Tracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            subjects: Arc::clone(&self.subjects),
        }
    }
}

impl<S: TransitionStore> Tracker<S> {
    pub fn new(store: S) -> Self {
        Self::build(store, TrackerConfig::default())
    }

    pub fn with_config(store: S, config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: S, config: TrackerConfig) -> Self {
        let store = Arc::new(store);
        let registry = Registry::new(Arc::clone(&store), config.transition_state.clone());
        Self {
            store,
            registry: Arc::new(registry),
            config: Arc::new(config),
            subjects: Arc::new(SubjectRegistry::new()),
        }
    }

    /// Use these resolvers for subject labels and orphan detection.
    pub fn with_subjects(mut self, subjects: SubjectRegistry) -> Self {
        self.subjects = Arc::new(subjects);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn shared_store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn subjects(&self) -> &SubjectRegistry {
        &self.subjects
    }

    /// The system tracking `subject`, created on first reference.
    pub async fn for_subject(&self, subject: SubjectRef) -> Result<SystemHandle<S>> {
        if let Some(system) = self.store.find_system_by_subject(&subject).await? {
            return Ok(self.handle(system));
        }

        match self.store.insert_system(None, Some(&subject)).await {
            Ok(system) => {
                debug!(system_id = system.id, subject = %subject, "created system");
                Ok(self.handle(system))
            }
            Err(conflict @ StoreError::UniqueViolation { .. }) => {
                debug!(subject = %subject, "lost system insert race, re-fetching");
                self.store
                    .find_system_by_subject(&subject)
                    .await?
                    .map(|system| self.handle(system))
                    .ok_or_else(|| conflict.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The free-standing system with this name, created on first reference.
    pub async fn named(&self, name: &str) -> Result<SystemHandle<S>> {
        if let Some(system) = self.store.find_system_by_name(name).await? {
            return Ok(self.handle(system));
        }

        match self.store.insert_system(Some(name), None).await {
            Ok(system) => {
                debug!(system_id = system.id, name, "created system");
                Ok(self.handle(system))
            }
            Err(conflict @ StoreError::UniqueViolation { .. }) => {
                debug!(name, "lost system insert race, re-fetching");
                self.store
                    .find_system_by_name(name)
                    .await?
                    .map(|system| self.handle(system))
                    .ok_or_else(|| conflict.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// An existing system by identifier.
    pub async fn system(&self, id: i64) -> Result<SystemHandle<S>> {
        match self.store.get_system(id).await {
            Ok(system) => Ok(self.handle(system)),
            Err(StoreError::NotFound { .. }) => Err(StsError::NotFound {
                kind: "system",
                key: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Every system, most recently modified first.
    pub async fn systems(&self) -> Result<Vec<SystemHandle<S>>> {
        let systems = self.store.list_systems().await?;
        Ok(systems.into_iter().map(|system| self.handle(system)).collect())
    }

    pub async fn transition(
        &self,
        subject: SubjectRef,
        request: TransitionRequest,
    ) -> Result<Transition> {
        self.for_subject(subject).await?.transition(request).await
    }

    pub async fn start_transition(
        &self,
        subject: SubjectRef,
        request: StartTransition,
    ) -> Result<Transition> {
        self.for_subject(subject).await?.start_transition(request).await
    }

    pub async fn end_transition(
        &self,
        subject: SubjectRef,
        request: EndTransition,
    ) -> Result<Transition> {
        self.for_subject(subject).await?.end_transition(request).await
    }

    fn handle(&self, system: System) -> SystemHandle<S> {
        SystemHandle::new(self.clone(), system)
    }
}
