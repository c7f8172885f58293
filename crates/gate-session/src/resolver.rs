// resolver.rs — The UNINITIALIZED -> INITIALIZED state machine around a
// Session. Every call before `begin` fails with `SessionNotInitialized`;
// `begin` is one-shot per resolver instance.

use std::path::{Path, PathBuf};

use crate::error::ResolverError;
use crate::session::{PathKind, Role, Session};

/// Owns at most one [`Session`] and enforces the one-shot initialization
/// contract around it.
#[derive(Debug, Default)]
pub struct SessionResolver {
    session: Option<Session>,
}

impl SessionResolver {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Initialize the session. Fails if already initialized.
    pub fn begin(&mut self, workspace_root: impl AsRef<Path>, role: Role) -> Result<uuid::Uuid, ResolverError> {
        if self.session.is_some() {
            return Err(ResolverError::AlreadyInitialized);
        }
        let session = Session::begin(workspace_root, role)?;
        let id = session.session_id;
        self.session = Some(session);
        Ok(id)
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Result<&Session, ResolverError> {
        self.session.as_ref().ok_or(ResolverError::SessionNotInitialized)
    }

    pub fn session_mut(&mut self) -> Result<&mut Session, ResolverError> {
        self.session.as_mut().ok_or(ResolverError::SessionNotInitialized)
    }

    pub fn resolve(&self, path: &str, kind: PathKind) -> Result<PathBuf, ResolverError> {
        self.session()?.resolve(path, kind)
    }

    pub fn plans_dir(&self) -> Result<PathBuf, ResolverError> {
        self.session()?.plans_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn calls_before_begin_fail_session_not_initialized() {
        let resolver = SessionResolver::new();
        let err = resolver.resolve("a.txt", PathKind::Read).unwrap_err();
        assert!(matches!(err, ResolverError::SessionNotInitialized));
    }

    #[test]
    fn begin_is_one_shot() {
        let dir = tempdir().unwrap();
        let mut resolver = SessionResolver::new();
        resolver.begin(dir.path(), Role::Executor).unwrap();
        let err = resolver.begin(dir.path(), Role::Planner).unwrap_err();
        assert!(matches!(err, ResolverError::AlreadyInitialized));
    }

    #[test]
    fn resolve_after_begin_succeeds() {
        let dir = tempdir().unwrap();
        let mut resolver = SessionResolver::new();
        resolver.begin(dir.path(), Role::Executor).unwrap();
        let resolved = resolver.resolve("src/main.rs", PathKind::Write).unwrap();
        assert!(resolved.ends_with("src/main.rs"));
    }
}
