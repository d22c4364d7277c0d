/// All errors that can be returned by a TransitionStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given key.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness constraint rejected an insert. Callers racing to create
    /// the same row re-fetch instead of failing.
    #[error("unique constraint violated on {entity}: {key}")]
    UniqueViolation { entity: &'static str, key: String },

    /// The transaction could not be serialized against a concurrent one.
    /// Not retried by the tracker; the caller may retry the whole operation.
    #[error("transaction serialization failure: {0}")]
    SerializationFailure(String),

    /// A backend-specific storage error (connection, encoding, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
