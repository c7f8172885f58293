// log.rs — Append-only JSONL audit log with a hash chain and a cooperative
// file lock.
//
// Each entry is linked to the previous one via `prev_hash == prev.entry_hash`
// (GENESIS for the first). `entry_hash` is the SHA-256 of the canonical JSON
// of every other field, so verifying the chain also verifies each entry's
// own content. Appends are additionally serialized by a sidecar `.lock`
// file so two processes (or two sessions in one process) sharing a
// workspace never interleave writes.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::entry::{AuditEntry, AuditEntryDraft};
use crate::error::AuditError;
use crate::hasher::{canonical_json, hash_str};
use crate::redact::redact_value;
use crate::GENESIS;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(25);

/// Fields hashed to produce `entry_hash`. Mirrors [`AuditEntry`] minus the
/// `entry_hash` field itself, which cannot hash over its own value.
#[derive(Serialize)]
struct Hashable<'a> {
    ts: &'a chrono::DateTime<chrono::Utc>,
    seq: u64,
    prev_hash: &'a str,
    session_id: &'a str,
    role: &'a str,
    workspace_root: &'a str,
    tool: &'a str,
    intent: &'a Option<String>,
    plan_hash: &'a Option<String>,
    phase_id: &'a Option<String>,
    args_hash: &'a str,
    result: crate::entry::AuditResult,
    error_code: &'a Option<String>,
    invariant_id: &'a Option<String>,
    result_hash: &'a Option<String>,
    notes: &'a Option<String>,
    buffered: bool,
}

/// An exclusive, bounded-timeout lock on the audit file, released on drop.
struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(log_path: &Path, timeout: Duration) -> Result<Self, AuditError> {
        let lock_path = log_path.with_extension("log.lock");
        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(_) => return Ok(Self { lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if start.elapsed() >= timeout {
                        return Err(AuditError::LockTimeout {
                            path: log_path.to_path_buf(),
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => return Err(AuditError::WriteFailed(e)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

/// An append-only, hash-chained audit log backed by a JSONL file.
pub struct AuditLog {
    path: PathBuf,
    last_seq: u64,
    last_hash: String,
    lock_timeout: Duration,
    /// Entries recorded before `begin_session`; flushed (marked `buffered:
    /// true`) the moment a session starts.
    pending: Vec<AuditEntryDraft>,
}

impl AuditLog {
    /// Open (or create) an audit log, recovering chain state from any
    /// existing content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        }

        let (last_seq, last_hash) = if path.exists() {
            Self::read_tail(&path)?
        } else {
            (0, GENESIS.to_string())
        };

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            last_seq,
            last_hash,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            pending: Vec::new(),
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer an entry before a session has begun. Flushed by
    /// [`AuditLog::flush_buffer`].
    pub fn buffer(&mut self, draft: AuditEntryDraft) {
        self.pending.push(draft);
    }

    /// Flush any buffered pre-session entries, marking each `buffered: true`,
    /// in the order they were recorded. Must complete before the first
    /// ordinary entry is appended.
    pub fn flush_buffer(&mut self) -> Result<Vec<AuditEntry>, AuditError> {
        let drafts = std::mem::take(&mut self.pending);
        let mut flushed = Vec::with_capacity(drafts.len());
        for draft in drafts {
            flushed.push(self.append_inner(draft, true)?);
        }
        Ok(flushed)
    }

    /// Append one ordinary entry, assigning `seq`, `prev_hash`, and
    /// `entry_hash`, redacting arguments, and durably flushing to disk.
    pub fn append(&mut self, draft: AuditEntryDraft) -> Result<AuditEntry, AuditError> {
        self.append_inner(draft, false)
    }

    fn append_inner(&mut self, draft: AuditEntryDraft, buffered: bool) -> Result<AuditEntry, AuditError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;

        // Re-read the tail under lock in case another process appended
        // concurrently since this handle's in-memory state was cached.
        let (seq_on_disk, hash_on_disk) = if self.path.exists() {
            Self::read_tail(&self.path)?
        } else {
            (0, GENESIS.to_string())
        };
        self.last_seq = self.last_seq.max(seq_on_disk);
        if seq_on_disk > 0 {
            self.last_hash = hash_on_disk;
        }

        let mut args = draft.args;
        redact_value(&mut args);
        let args_hash = hash_str(&canonical_json(&args)?);

        let seq = self.last_seq + 1;
        let prev_hash = self.last_hash.clone();

        let hashable = Hashable {
            ts: &chrono::Utc::now(),
            seq,
            prev_hash: &prev_hash,
            session_id: &draft.session_id,
            role: &draft.role,
            workspace_root: &draft.workspace_root,
            tool: &draft.tool,
            intent: &draft.intent,
            plan_hash: &draft.plan_hash,
            phase_id: &draft.phase_id,
            args_hash: &args_hash,
            result: draft.result,
            error_code: &draft.error_code,
            invariant_id: &draft.invariant_id,
            result_hash: &draft.result_hash,
            notes: &draft.notes,
            buffered,
        };
        let entry_hash = hash_str(&canonical_json(&hashable)?);

        let entry = AuditEntry {
            ts: *hashable.ts,
            seq,
            prev_hash,
            entry_hash: entry_hash.clone(),
            session_id: draft.session_id,
            role: draft.role,
            workspace_root: draft.workspace_root,
            tool: draft.tool,
            intent: draft.intent,
            plan_hash: draft.plan_hash,
            phase_id: draft.phase_id,
            args_hash,
            result: draft.result,
            error_code: draft.error_code,
            invariant_id: draft.invariant_id,
            result_hash: draft.result_hash,
            notes: draft.notes,
            buffered,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::OpenFailed {
                path: self.path.clone(),
                source,
            })?;
        let mut writer = BufWriter::new(file);
        let line = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;

        self.last_seq = seq;
        self.last_hash = entry_hash;

        tracing::info!(tool = %entry.tool, seq = entry.seq, result = ?entry.result, "audit entry appended");

        Ok(entry)
    }

    /// Read every entry from the log, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Re-verify the full hash chain. Returns every mismatched `seq`, not
    /// just the first — a single break is fatal to integrity, but the
    /// caller gets the complete picture.
    pub fn verify(path: impl AsRef<Path>) -> Result<VerifyReport, AuditError> {
        let entries = Self::read_all(path)?;
        let mut failures = Vec::new();
        let mut expected_prev = GENESIS.to_string();
        let mut expected_seq = 1u64;

        for entry in &entries {
            if entry.seq != expected_seq {
                failures.push(format!(
                    "seq {}: expected seq {}",
                    entry.seq, expected_seq
                ));
            }
            if entry.prev_hash != expected_prev {
                failures.push(format!(
                    "seq {}: prev_hash mismatch (expected {}, got {})",
                    entry.seq, expected_prev, entry.prev_hash
                ));
            }

            let hashable = Hashable {
                ts: &entry.ts,
                seq: entry.seq,
                prev_hash: &entry.prev_hash,
                session_id: &entry.session_id,
                role: &entry.role,
                workspace_root: &entry.workspace_root,
                tool: &entry.tool,
                intent: &entry.intent,
                plan_hash: &entry.plan_hash,
                phase_id: &entry.phase_id,
                args_hash: &entry.args_hash,
                result: entry.result,
                error_code: &entry.error_code,
                invariant_id: &entry.invariant_id,
                result_hash: &entry.result_hash,
                notes: &entry.notes,
                buffered: entry.buffered,
            };
            let recomputed = hash_str(&canonical_json(&hashable)?);
            if recomputed != entry.entry_hash {
                failures.push(format!("seq {}: entry_hash mismatch", entry.seq));
            }

            expected_seq = entry.seq + 1;
            expected_prev = entry.entry_hash.clone();
        }

        Ok(VerifyReport {
            valid: failures.is_empty(),
            failures,
        })
    }

    fn read_tail(path: &Path) -> Result<(u64, String), AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut last: Option<AuditEntry> = None;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| AuditError::CorruptTail {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            last = Some(entry);
        }
        match last {
            Some(e) => Ok((e.seq, e.entry_hash)),
            None => Ok((0, GENESIS.to_string())),
        }
    }
}

/// Result of [`AuditLog::verify`].
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub valid: bool,
    pub failures: Vec<String>,
}
