//! # gate-audit
//!
//! Append-only, hash-chained audit log for the governance gateway.
//!
//! Every tool invocation — successful or refused — is recorded as an
//! [`AuditEntry`] in a JSONL (JSON Lines) file. Each entry's `entry_hash`
//! is chained from the previous entry's `entry_hash` via `prev_hash`, so
//! any insertion, deletion, or modification of a past entry is detectable
//! by [`AuditLog::verify`].
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use gate_audit::{AuditLog, AuditEntryDraft, AuditResult};
//!
//! let mut log = AuditLog::open("/tmp/audit.log").unwrap();
//! let draft = AuditEntryDraft::new("sess-1", "EXECUTOR", "/tmp", "write_file")
//!     .with_result(AuditResult::Ok);
//! log.append(draft).unwrap();
//! ```

pub mod entry;
pub mod error;
pub mod hasher;
pub mod log;
pub mod redact;

pub use entry::{AuditEntry, AuditEntryDraft, AuditResult};
pub use error::AuditError;
pub use hasher::{hash_bytes, hash_str};
pub use log::AuditLog;
pub use redact::redact_value;

/// Sentinel written as `prev_hash` for the first entry in a log.
pub const GENESIS: &str = "GENESIS";
