//! In-process reference backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::{
    CatalogEntry, CatalogKind, NewTransition, Order, SubjectRef, System, Transition,
    TRANSITION_STATE_ID, TRANSITION_STATE_NAME,
};
use crate::store::error::StoreError;
use crate::store::traits::TransitionStore;

/// Table contents of a [`MemoryStore`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Tables {
    pub(crate) states: Vec<CatalogEntry>,
    pub(crate) events: Vec<CatalogEntry>,
    pub(crate) systems: BTreeMap<i64, System>,
    /// Per system, ascending by start time, ties in insertion order
    pub(crate) transitions: BTreeMap<i64, Vec<Transition>>,
    next_entry_id: BTreeMap<CatalogKind, i64>,
    next_system_id: i64,
    next_transition_id: i64,
}

impl Tables {
    pub(crate) fn from_parts(
        states: Vec<CatalogEntry>,
        events: Vec<CatalogEntry>,
        systems: Vec<System>,
        transitions: Vec<Transition>,
    ) -> Self {
        let mut tables = Self {
            next_system_id: systems.iter().map(|s| s.id).max().unwrap_or(0) + 1,
            next_transition_id: transitions.iter().map(|t| t.id).max().unwrap_or(0) + 1,
            systems: systems.into_iter().map(|s| (s.id, s)).collect(),
            ..Self::default()
        };
        for (kind, entries) in [(CatalogKind::State, states), (CatalogKind::Event, events)] {
            let next = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
            tables.next_entry_id.insert(kind, next);
            *tables.catalog_mut(kind) = entries;
        }
        for transition in transitions {
            tables.place_transition(transition);
        }
        tables
    }

    fn catalog(&self, kind: CatalogKind) -> &Vec<CatalogEntry> {
        match kind {
            CatalogKind::State => &self.states,
            CatalogKind::Event => &self.events,
        }
    }

    fn catalog_mut(&mut self, kind: CatalogKind) -> &mut Vec<CatalogEntry> {
        match kind {
            CatalogKind::State => &mut self.states,
            CatalogKind::Event => &mut self.events,
        }
    }

    fn insert_entry(&mut self, kind: CatalogKind, name: &str) -> Result<CatalogEntry, StoreError> {
        if self.catalog(kind).iter().any(|entry| entry.name == name) {
            return Err(StoreError::UniqueViolation {
                entity: kind.label(),
                key: name.to_string(),
            });
        }
        let next = self.next_entry_id.entry(kind).or_insert(1);
        let entry = CatalogEntry {
            id: *next,
            name: name.to_string(),
        };
        *next += 1;
        self.catalog_mut(kind).push(entry.clone());
        Ok(entry)
    }

    fn system_history(&self, system_id: i64) -> &[Transition] {
        self.transitions
            .get(&system_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn place_transition(&mut self, transition: Transition) {
        let history = self.transitions.entry(transition.system_id).or_default();
        let at = history.partition_point(|t| t.start_time <= transition.start_time);
        history.insert(at, transition);
    }

    fn system_mut(&mut self, system_id: i64) -> Result<&mut System, StoreError> {
        self.systems
            .get_mut(&system_id)
            .ok_or_else(|| system_not_found(system_id))
    }
}

enum Undo {
    Inserted { system_id: i64, transition_id: i64 },
    Replaced(Transition),
    Touched { system_id: i64, modified: DateTime<Utc> },
}

/// An open [`MemoryStore`] transaction.
///
/// Holds the store's exclusive lock until committed or dropped, so every
/// snapshot is serializable. Writes apply in place and are undone on abort
/// or drop.
pub struct MemorySnapshot {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
}

impl MemorySnapshot {
    fn rollback(&mut self) {
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Inserted {
                    system_id,
                    transition_id,
                } => {
                    if let Some(history) = self.tables.transitions.get_mut(&system_id) {
                        history.retain(|t| t.id != transition_id);
                    }
                }
                Undo::Replaced(previous) => {
                    if let Some(slot) = self
                        .tables
                        .transitions
                        .get_mut(&previous.system_id)
                        .and_then(|history| history.iter_mut().find(|t| t.id == previous.id))
                    {
                        *slot = previous;
                    }
                }
                Undo::Touched {
                    system_id,
                    modified,
                } => {
                    if let Some(system) = self.tables.systems.get_mut(&system_id) {
                        system.modified = modified;
                    }
                }
            }
        }
    }
}

impl Drop for MemorySnapshot {
    fn drop(&mut self) {
        self.rollback();
    }
}

/// A [`TransitionStore`] kept entirely in process memory.
///
/// Cloning shares the same tables. Snapshots take an exclusive lock, so
/// queries issued while a snapshot is open wait for it to end; never hold a
/// snapshot across a query on the same store.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store with the reserved transitioning state seeded as the first state.
    pub fn new() -> Self {
        Self::seeded(TRANSITION_STATE_NAME)
    }

    /// Create a store seeding the reserved state under a custom name.
    pub fn seeded(transition_state: &str) -> Self {
        let mut tables = Tables::default();
        tables.states.push(CatalogEntry {
            id: TRANSITION_STATE_ID,
            name: transition_state.to_string(),
        });
        tables
            .next_entry_id
            .insert(CatalogKind::State, TRANSITION_STATE_ID + 1);
        Self::from_tables(tables)
    }

    /// Create a store with empty catalogs; the reserved state is created on first use.
    pub fn unseeded() -> Self {
        Self::from_tables(Tables::default())
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    pub(crate) async fn read_tables(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl TransitionStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StoreError> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(MemorySnapshot {
            tables,
            undo: Vec::new(),
        })
    }

    async fn commit_snapshot(&self, mut snapshot: MemorySnapshot) -> Result<(), StoreError> {
        snapshot.undo.clear();
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StoreError> {
        drop(snapshot);
        Ok(())
    }

    async fn get_entry(&self, kind: CatalogKind, id: i64) -> Result<CatalogEntry, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .catalog(kind)
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: kind.label(),
                key: id.to_string(),
            })
    }

    async fn find_entry(
        &self,
        kind: CatalogKind,
        name: &str,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .catalog(kind)
            .iter()
            .find(|entry| entry.name == name)
            .cloned())
    }

    async fn insert_entry(
        &self,
        kind: CatalogKind,
        name: &str,
    ) -> Result<CatalogEntry, StoreError> {
        self.tables.lock().await.insert_entry(kind, name)
    }

    async fn get_system(&self, id: i64) -> Result<System, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .systems
            .get(&id)
            .cloned()
            .ok_or_else(|| system_not_found(id))
    }

    async fn find_system_by_subject(
        &self,
        subject: &SubjectRef,
    ) -> Result<Option<System>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .systems
            .values()
            .find(|system| system.subject.as_ref() == Some(subject))
            .cloned())
    }

    async fn find_system_by_name(&self, name: &str) -> Result<Option<System>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .systems
            .values()
            .find(|system| system.subject.is_none() && system.name.as_deref() == Some(name))
            .cloned())
    }

    async fn insert_system(
        &self,
        name: Option<&str>,
        subject: Option<&SubjectRef>,
    ) -> Result<System, StoreError> {
        let mut tables = self.tables.lock().await;
        let taken = match (subject, name) {
            (Some(subject), _) => tables
                .systems
                .values()
                .any(|system| system.subject.as_ref() == Some(subject))
                .then(|| subject.to_string()),
            (None, Some(name)) => tables
                .systems
                .values()
                .any(|system| system.subject.is_none() && system.name.as_deref() == Some(name))
                .then(|| name.to_string()),
            (None, None) => None,
        };
        if let Some(key) = taken {
            return Err(StoreError::UniqueViolation {
                entity: "system",
                key,
            });
        }

        let now = Utc::now();
        let id = tables.next_system_id.max(1);
        tables.next_system_id = id + 1;
        let system = System {
            id,
            name: name.map(str::to_string),
            subject: subject.cloned(),
            created: now,
            modified: now,
        };
        tables.systems.insert(id, system.clone());
        Ok(system)
    }

    async fn list_systems(&self) -> Result<Vec<System>, StoreError> {
        let tables = self.tables.lock().await;
        let mut systems: Vec<System> = tables.systems.values().cloned().collect();
        systems.sort_by(|a, b| b.modified.cmp(&a.modified).then(b.id.cmp(&a.id)));
        Ok(systems)
    }

    async fn lock_system(
        &self,
        snapshot: &mut MemorySnapshot,
        system_id: i64,
    ) -> Result<System, StoreError> {
        // The snapshot already holds the exclusive table lock.
        snapshot
            .tables
            .systems
            .get(&system_id)
            .cloned()
            .ok_or_else(|| system_not_found(system_id))
    }

    async fn find_open_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        system_id: i64,
        state_id: i64,
    ) -> Result<Option<Transition>, StoreError> {
        Ok(snapshot
            .tables
            .system_history(system_id)
            .iter()
            .rev()
            .find(|t| t.state.id == state_id && t.is_open())
            .cloned())
    }

    async fn insert_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        transition: NewTransition,
    ) -> Result<Transition, StoreError> {
        let tables = &mut snapshot.tables;
        tables.system_mut(transition.system_id)?;

        let id = tables.next_transition_id.max(1);
        tables.next_transition_id = id + 1;
        let record = transition.into_transition(id);
        tables.place_transition(record.clone());

        snapshot.undo.push(Undo::Inserted {
            system_id: record.system_id,
            transition_id: id,
        });
        Ok(record)
    }

    async fn update_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        transition: &Transition,
    ) -> Result<(), StoreError> {
        let slot = snapshot
            .tables
            .transitions
            .get_mut(&transition.system_id)
            .and_then(|history| history.iter_mut().find(|t| t.id == transition.id))
            .ok_or_else(|| StoreError::NotFound {
                entity: "transition",
                key: transition.id.to_string(),
            })?;

        let previous = std::mem::replace(slot, transition.clone());
        let moved = previous.start_time != transition.start_time;
        snapshot.undo.push(Undo::Replaced(previous));

        if moved {
            if let Some(history) = snapshot.tables.transitions.get_mut(&transition.system_id) {
                history.sort_by_key(|t| t.start_time);
            }
        }
        Ok(())
    }

    async fn touch_system(
        &self,
        snapshot: &mut MemorySnapshot,
        system_id: i64,
        modified: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let system = snapshot.tables.system_mut(system_id)?;
        let previous = std::mem::replace(&mut system.modified, modified);
        snapshot.undo.push(Undo::Touched {
            system_id,
            modified: previous,
        });
        Ok(())
    }

    async fn count_transitions(&self, system_id: i64) -> Result<usize, StoreError> {
        Ok(self.tables.lock().await.system_history(system_id).len())
    }

    async fn latest_transition(&self, system_id: i64) -> Result<Option<Transition>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .system_history(system_id)
            .last()
            .cloned())
    }

    async fn has_open_transition(
        &self,
        system_id: i64,
        state_id: i64,
    ) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .system_history(system_id)
            .iter()
            .any(|t| t.state.id == state_id && t.is_open()))
    }

    async fn fetch_transitions(
        &self,
        system_id: i64,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Transition>, StoreError> {
        let tables = self.tables.lock().await;
        let history = tables.system_history(system_id);
        let limit = limit.unwrap_or(usize::MAX);
        let rows = match order {
            Order::Ascending => history.iter().skip(offset).take(limit).cloned().collect(),
            Order::Descending => history.iter().rev().skip(offset).take(limit).cloned().collect(),
        };
        Ok(rows)
    }
}

fn system_not_found(id: i64) -> StoreError {
    StoreError::NotFound {
        entity: "system",
        key: id.to_string(),
    }
}
