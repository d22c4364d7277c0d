//! Vocabulary registry: resolves states and events against the store.
//!
//! Names are fetched or created atomically from the caller's point of view:
//! when two callers race to create the same name, the loser's insert hits the
//! catalog's uniqueness constraint and it re-fetches the winner's row.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::core::{Event, Lookup, State, Vocabulary, TRANSITION_STATE_ID};
use crate::error::{Result, StsError};
use crate::store::{StoreError, TransitionStore};

/// Catalog resolver bound to one store, owning the cached reserved state.
pub struct Registry<S: TransitionStore> {
    store: Arc<S>,
    transition_state_name: String,
    sentinel: RwLock<Option<State>>,
}

impl<S: TransitionStore> Registry<S> {
    pub fn new(store: Arc<S>, transition_state_name: impl Into<String>) -> Self {
        Self {
            store,
            transition_state_name: transition_state_name.into(),
            sentinel: RwLock::new(None),
        }
    }

    /// Resolve an optional lookup. `None` in gives `None` out.
    pub async fn get<T: Vocabulary>(&self, lookup: Option<Lookup<T>>) -> Result<Option<T>> {
        let Some(lookup) = lookup else {
            return Ok(None);
        };

        let resolved = match lookup {
            Lookup::Record(record) => record,
            Lookup::Id(id) => self.by_id(id).await?,
            Lookup::Name(name) => self.get_or_create(&name).await?,
        };
        Ok(Some(resolved))
    }

    pub async fn state(&self, lookup: impl Into<Lookup<State>>) -> Result<State> {
        self.require(lookup.into()).await
    }

    pub async fn event(&self, lookup: impl Into<Lookup<Event>>) -> Result<Event> {
        self.require(lookup.into()).await
    }

    /// Fetch an entry by identifier; a missing identifier is NotFound.
    pub async fn by_id<T: Vocabulary>(&self, id: i64) -> Result<T> {
        match self.store.get_entry(T::KIND, id).await {
            Ok(entry) => Ok(T::from_entry(entry)),
            Err(StoreError::NotFound { .. }) => Err(StsError::NotFound {
                kind: T::KIND.label(),
                key: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the entry with this name, creating it if needed.
    pub async fn get_or_create<T: Vocabulary>(&self, name: &str) -> Result<T> {
        if let Some(entry) = self.store.find_entry(T::KIND, name).await? {
            return Ok(T::from_entry(entry));
        }

        match self.store.insert_entry(T::KIND, name).await {
            Ok(entry) => {
                debug!(kind = %T::KIND, id = entry.id, name, "created catalog entry");
                Ok(T::from_entry(entry))
            }
            Err(conflict @ StoreError::UniqueViolation { .. }) => {
                debug!(kind = %T::KIND, name, "lost catalog insert race, re-fetching");
                match self.store.find_entry(T::KIND, name).await? {
                    Some(entry) => Ok(T::from_entry(entry)),
                    None => Err(conflict.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The reserved "currently transitioning" state.
    ///
    /// Looked up once (the seeded row, else fetched or created by name) and
    /// cached until [`Registry::reset_sentinel`].
    pub async fn transition_state(&self) -> Result<State> {
        let cached = self.sentinel.read().clone();
        if let Some(sentinel) = cached {
            return Ok(sentinel);
        }

        let seeded = match self.by_id::<State>(TRANSITION_STATE_ID).await {
            Ok(state) if state.name == self.transition_state_name => Some(state),
            Ok(_) | Err(StsError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let sentinel = match seeded {
            Some(state) => state,
            None => {
                self.get_or_create::<State>(&self.transition_state_name)
                    .await?
            }
        };

        debug!(id = sentinel.id, name = %sentinel.name, "resolved transition state");
        *self.sentinel.write() = Some(sentinel.clone());
        Ok(sentinel)
    }

    /// Forget the cached reserved state.
    pub fn reset_sentinel(&self) {
        *self.sentinel.write() = None;
    }

    async fn require<T: Vocabulary>(&self, lookup: Lookup<T>) -> Result<T> {
        self.get(Some(lookup))
            .await?
            .ok_or_else(|| StsError::NotFound {
                kind: T::KIND.label(),
                key: "<none>".to_string(),
            })
    }
}
