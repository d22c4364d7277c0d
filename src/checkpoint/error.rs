use thiserror::Error;

/// Failures while exporting or restoring a store checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("could not encode store checkpoint: {0}")]
    SerializationFailed(String),

    #[error("could not decode store checkpoint: {0}")]
    DeserializationFailed(String),

    /// Written by a newer (or older) checkpoint format
    #[error("checkpoint format v{found} is not readable, expected v{supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The data breaks one or more store invariants; every problem is listed
    #[error("checkpoint is inconsistent: {}", .problems.join("; "))]
    ValidationFailed { problems: Vec<String> },
}
