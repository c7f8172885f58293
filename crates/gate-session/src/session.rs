// session.rs — Session record and path resolution.
//
// A Session fixes a workspace root and a role for its entire lifetime.
// `resolve` rejects anything that could escape that root: empty input,
// `..` in any of its raw, backslash, Unicode-slash, or (single/double)
// percent-encoded forms, embedded control characters, and — for paths
// that already exist on disk — symlink escapes, caught by canonicalizing
// the target and re-checking containment.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ResolverError;

/// The two cooperating agent roles this gateway serves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Planner,
    Executor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Planner => write!(f, "PLANNER"),
            Role::Executor => write!(f, "EXECUTOR"),
        }
    }
}

/// Whether a resolved path is being read or written — reserved for future
/// read/write-specific containment rules; both kinds share the same
/// containment check today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Read,
    Write,
}

/// A live session: a fixed workspace root, a fixed role, and the small
/// amount of mutable state the dispatcher needs (sequence counter,
/// prompt-gate flag).
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub role: Role,
    pub workspace_root: PathBuf,
    pub prompt_read: bool,
    seq: u64,
}

impl Session {
    /// Canonicalize `workspace_root` and fix `role` for this session's
    /// lifetime. This is the one-shot `UNINITIALIZED -> INITIALIZED`
    /// transition.
    pub fn begin(workspace_root: impl AsRef<Path>, role: Role) -> Result<Self, ResolverError> {
        let raw = workspace_root.as_ref();
        if !raw.is_dir() {
            return Err(ResolverError::WorkspaceNotADirectory {
                path: raw.to_path_buf(),
            });
        }
        let canonical = raw
            .canonicalize()
            .map_err(|source| ResolverError::WorkspaceUnreadable {
                path: raw.to_path_buf(),
                source,
            })?;

        tracing::info!(root = %canonical.display(), role = %role, "session begun");

        Ok(Self {
            session_id: Uuid::new_v4(),
            role,
            workspace_root: canonical,
            prompt_read: false,
            seq: 0,
        })
    }

    /// Increment and return this session's monotonic sequence counter.
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn require_role(&self, expected: Role) -> Result<(), ResolverError> {
        if self.role != expected {
            return Err(ResolverError::RoleMismatch {
                expected: expected.to_string(),
                actual: self.role.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve a workspace-relative (or absolute-within-root) path string
    /// to an absolute path guaranteed to be a descendant of the root.
    pub fn resolve(&self, path: &str, _kind: PathKind) -> Result<PathBuf, ResolverError> {
        if path.is_empty() {
            return Err(ResolverError::InvalidPath {
                reason: "path is empty".to_string(),
            });
        }
        if contains_traversal_patterns(path) {
            return Err(ResolverError::PathTraversal {
                path: path.to_string(),
            });
        }

        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace_root.join(candidate)
        };

        let lexically_normalized = normalize_lexically(&joined);
        if !lexically_normalized.starts_with(&self.workspace_root) {
            return Err(ResolverError::PathTraversal {
                path: path.to_string(),
            });
        }

        // If the target already exists, canonicalize it to dereference any
        // symlink and re-check containment — a symlink can point outside
        // the root even when the lexical path does not.
        if lexically_normalized.exists() {
            let real = lexically_normalized
                .canonicalize()
                .map_err(|source| ResolverError::WorkspaceUnreadable {
                    path: lexically_normalized.clone(),
                    source,
                })?;
            if !real.starts_with(&self.workspace_root) {
                return Err(ResolverError::PathTraversal {
                    path: path.to_string(),
                });
            }
            return Ok(real);
        }

        Ok(lexically_normalized)
    }

    /// The canonical plans directory, created if missing.
    pub fn plans_dir(&self) -> Result<PathBuf, ResolverError> {
        let dir = self.workspace_root.join("docs").join("plans");
        std::fs::create_dir_all(&dir).map_err(|source| ResolverError::PlansDirUnavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }
}

/// Defense-in-depth traversal detection: literal `..`, backslash and
/// Unicode-slash variants, single/double percent-encoding, null bytes and
/// other control characters, layered the way mature path-sanitizing code
/// checks them rather than relying on a single substring test.
fn contains_traversal_patterns(path_str: &str) -> bool {
    const BASIC_TRAVERSALS: &[&str] = &["../", "..\\", "/..", "\\.."];
    if path_str.starts_with("..") || BASIC_TRAVERSALS.iter().any(|p| path_str.contains(p)) {
        return true;
    }

    const UNICODE_SLASHES: &[char] = &['\u{FF0F}', '\u{2044}', '\u{2215}'];
    if UNICODE_SLASHES.iter().any(|&c| {
        path_str.contains(&format!("..{c}")) || path_str.contains(&format!("{c}.."))
    }) {
        return true;
    }

    const URL_ENCODED: &[&str] = &["%2e%2e", "%2E%2E", "%252e%252e", "%252E%252E"];
    if URL_ENCODED.iter().any(|p| path_str.contains(p)) {
        return true;
    }

    const CONTROL_CHARS: &[char] = &['\0', '\n', '\r', '\t'];
    if CONTROL_CHARS.iter().any(|&c| path_str.contains(c)) {
        return true;
    }

    path_str.contains("..")
}

/// Normalize `.`/`..` components lexically (no filesystem access), used
/// before containment is checked for paths that may not yet exist.
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn begin_canonicalizes_root() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        assert_eq!(session.workspace_root, dir.path().canonicalize().unwrap());
        assert_eq!(session.role, Role::Executor);
        assert!(!session.prompt_read);
    }

    #[test]
    fn begin_rejects_non_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("x.txt");
        std::fs::write(&file, "x").unwrap();
        let err = Session::begin(&file, Role::Executor).unwrap_err();
        assert!(matches!(err, ResolverError::WorkspaceNotADirectory { .. }));
    }

    #[test]
    fn resolve_accepts_relative_path_within_root() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let resolved = session.resolve("src/main.rs", PathKind::Write).unwrap();
        assert!(resolved.starts_with(&session.workspace_root));
        assert_eq!(resolved, session.workspace_root.join("src/main.rs"));
    }

    #[test]
    fn resolve_rejects_empty_path() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let err = session.resolve("", PathKind::Read).unwrap_err();
        assert!(matches!(err, ResolverError::InvalidPath { .. }));
    }

    #[test]
    fn resolve_rejects_dotdot_traversal() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let err = session.resolve("../etc/passwd", PathKind::Write).unwrap_err();
        assert!(matches!(err, ResolverError::PathTraversal { .. }));
    }

    #[test]
    fn resolve_rejects_percent_encoded_traversal() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let err = session.resolve("src/%2e%2e/secret", PathKind::Read).unwrap_err();
        assert!(matches!(err, ResolverError::PathTraversal { .. }));
    }

    #[test]
    fn resolve_rejects_double_encoded_traversal() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let err = session.resolve("%252e%252e/secret", PathKind::Read).unwrap_err();
        assert!(matches!(err, ResolverError::PathTraversal { .. }));
    }

    #[test]
    fn resolve_rejects_absolute_path_outside_root() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let err = session.resolve("/etc/passwd", PathKind::Read).unwrap_err();
        assert!(matches!(err, ResolverError::PathTraversal { .. }));
    }

    #[test]
    fn resolve_dereferences_symlink_escaping_root() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "s").unwrap();

        let link = dir.path().join("link.txt");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        #[cfg(unix)]
        {
            let err = session.resolve("link.txt", PathKind::Read).unwrap_err();
            assert!(matches!(err, ResolverError::PathTraversal { .. }));
        }
    }

    #[test]
    fn require_role_rejects_mismatch() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Planner).unwrap();
        let err = session.require_role(Role::Executor).unwrap_err();
        assert!(matches!(err, ResolverError::RoleMismatch { .. }));
    }

    #[test]
    fn next_seq_is_monotone() {
        let dir = tempdir().unwrap();
        let mut session = Session::begin(dir.path(), Role::Executor).unwrap();
        assert_eq!(session.next_seq(), 1);
        assert_eq!(session.next_seq(), 2);
        assert_eq!(session.next_seq(), 3);
    }

    #[test]
    fn plans_dir_is_created_under_docs_plans() {
        let dir = tempdir().unwrap();
        let session = Session::begin(dir.path(), Role::Executor).unwrap();
        let plans = session.plans_dir().unwrap();
        assert_eq!(plans, session.workspace_root.join("docs").join("plans"));
        assert!(plans.is_dir());
    }
}
