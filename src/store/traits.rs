use async_trait::async_trait;

use crate::core::{CatalogEntry, CatalogKind, NewTransition, Order, SubjectRef, System, Transition};
use crate::store::error::StoreError;

/// The persistence trait behind the transition tracker.
///
/// A `TransitionStore` provides transactional storage for catalog entries
/// (states and events), systems and their transitions.
///
/// ## Snapshot Semantics
///
/// The protocol writes take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. `lock_system()`: lock the system row for the rest of the transaction
/// 3. Check for an open transition and write, all with `&mut snapshot`
/// 4. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back.
///
/// The check-then-write inside one snapshot must be indivisible with respect
/// to other snapshots on the same system (serializable isolation or a row
/// lock). Backends that detect a conflict instead of blocking return
/// `StoreError::SerializationFailure`.
///
/// ## Uniqueness
///
/// Catalog names are unique per catalog, subject references are unique
/// across systems, and so are the names of free-standing systems. Violations
/// return `StoreError::UniqueViolation`.
///
/// ## Ordering
///
/// Transitions of a system are ordered by `start_time` ascending; ties keep
/// insertion order.
#[async_trait]
pub trait TransitionStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StoreError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StoreError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StoreError>;

    // ── Catalog ───────────────────────────────────────────────────────────────

    /// Fetch a catalog entry by identifier.
    ///
    /// Returns `Err(StoreError::NotFound)` if it does not exist.
    async fn get_entry(&self, kind: CatalogKind, id: i64) -> Result<CatalogEntry, StoreError>;

    async fn find_entry(
        &self,
        kind: CatalogKind,
        name: &str,
    ) -> Result<Option<CatalogEntry>, StoreError>;

    /// Insert a new catalog entry.
    ///
    /// Returns `Err(StoreError::UniqueViolation)` if the name is taken.
    async fn insert_entry(&self, kind: CatalogKind, name: &str)
        -> Result<CatalogEntry, StoreError>;

    // ── Systems ───────────────────────────────────────────────────────────────

    async fn get_system(&self, id: i64) -> Result<System, StoreError>;

    async fn find_system_by_subject(
        &self,
        subject: &SubjectRef,
    ) -> Result<Option<System>, StoreError>;

    /// Free-standing systems only (no subject).
    async fn find_system_by_name(&self, name: &str) -> Result<Option<System>, StoreError>;

    /// Insert a new system.
    ///
    /// Returns `Err(StoreError::UniqueViolation)` if the subject already has
    /// one, or if a free-standing system already uses the name.
    async fn insert_system(
        &self,
        name: Option<&str>,
        subject: Option<&SubjectRef>,
    ) -> Result<System, StoreError>;

    /// All systems, most recently modified first.
    async fn list_systems(&self) -> Result<Vec<System>, StoreError>;

    // ── Transition writes (within snapshot) ───────────────────────────────────

    /// Lock a system row until the snapshot ends (`SELECT ... FOR UPDATE`).
    ///
    /// Returns `Err(StoreError::NotFound)` if the system does not exist.
    async fn lock_system(
        &self,
        snapshot: &mut Self::Snapshot,
        system_id: i64,
    ) -> Result<System, StoreError>;

    /// The most recently started transition of a system that is in the given
    /// state and has no end time.
    async fn find_open_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        system_id: i64,
        state_id: i64,
    ) -> Result<Option<Transition>, StoreError>;

    async fn insert_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        transition: NewTransition,
    ) -> Result<Transition, StoreError>;

    /// Overwrite a stored transition, matched by id.
    async fn update_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        transition: &Transition,
    ) -> Result<(), StoreError>;

    /// Set a system's last-modified timestamp.
    async fn touch_system(
        &self,
        snapshot: &mut Self::Snapshot,
        system_id: i64,
        modified: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError>;

    // ── Queries (outside snapshot) ────────────────────────────────────────────

    async fn count_transitions(&self, system_id: i64) -> Result<usize, StoreError>;

    /// Most recent transition by start time; ties resolve to the last inserted.
    async fn latest_transition(&self, system_id: i64) -> Result<Option<Transition>, StoreError>;

    /// Whether a transition in the given state is still open (no end time).
    async fn has_open_transition(
        &self,
        system_id: i64,
        state_id: i64,
    ) -> Result<bool, StoreError>;

    /// Ordered range fetch.
    ///
    /// - `order`: by start time, ascending or descending
    /// - `offset`: rows to skip in that order
    /// - `limit`: maximum number of rows (`None` = no limit)
    async fn fetch_transitions(
        &self,
        system_id: i64,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Transition>, StoreError>;
}
