// error.rs — Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit log operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an entry to the log.
    #[error("failed to append entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize an entry (malformed JSON).
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The audit log has been tampered with — hash chain is broken.
    #[error("integrity check failed at seq {seq}: {reason}")]
    IntegrityViolation { seq: u64, reason: String },

    /// The exclusive append lock could not be acquired within the timeout.
    #[error("audit lock timeout after {timeout_secs}s at {path}")]
    LockTimeout { path: PathBuf, timeout_secs: u64 },

    /// `append` was called on a log whose last line failed to parse as an entry.
    #[error("corrupt trailing entry in {path}: {reason}")]
    CorruptTail { path: PathBuf, reason: String },
}
