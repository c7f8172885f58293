// error.rs — Error types for the path/session resolver.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by [`crate::SessionResolver`] and [`crate::Session`].
#[derive(Debug, Error)]
pub enum ResolverError {
    /// A resolver call was made before `begin_session`.
    #[error("session not initialized")]
    SessionNotInitialized,

    /// `begin_session` was called twice on the same resolver.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// The declared workspace root does not exist or is not a directory.
    #[error("workspace root is not a directory: {path}")]
    WorkspaceNotADirectory { path: PathBuf },

    /// The declared workspace root exists but could not be canonicalized.
    #[error("workspace root unreadable at {path}: {source}")]
    WorkspaceUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Path input was empty, contained a null byte, or was otherwise malformed.
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    /// Path resolved outside the session's workspace root.
    #[error("path escapes workspace root: {path}")]
    PathTraversal { path: String },

    /// An operation requiring a specific role was attempted under the wrong one.
    #[error("role mismatch: expected {expected}, got {actual}")]
    RoleMismatch { expected: String, actual: String },

    /// Failed to create the canonical plans directory.
    #[error("failed to create plans directory at {path}: {source}")]
    PlansDirUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}
