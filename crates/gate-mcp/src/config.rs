// config.rs — Gateway configuration: compiled-in defaults, an optional
// `atlas-gate.toml`, and environment overrides, in that order of precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Static settings read from `atlas-gate.toml`, all optional — every field
/// has a compiled-in default applied before the file is read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub bootstrap_secret: Option<String>,
    pub audit_backend: Option<String>,
    pub session_backend: Option<String>,
    pub preflight_timeout_secs: Option<u64>,
    pub lock_timeout_secs: Option<u64>,
}

/// Configuration for the governance gateway MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Default workspace root at startup; `gate_begin_session` may override it.
    pub workspace_root: PathBuf,
    /// Path to the append-only audit log, relative to the workspace root.
    pub audit_log: PathBuf,
    /// Path to the intent-exemption allowlist, relative to the workspace root.
    pub intent_exempt: PathBuf,
    /// HMAC-SHA256 secret for `gate_bootstrap_plan`. Absent disables bootstrap.
    pub bootstrap_secret: Option<String>,
    /// `file` (default) | `postgres` | `s3` — only `file` is implemented here;
    /// other values are accepted and logged but fall back to `file`.
    pub audit_backend: String,
    /// `memory` (default) | `redis` — only `memory` is implemented here.
    pub session_backend: String,
    pub preflight_timeout: Duration,
    pub lock_timeout: Duration,
    pub run_preflight: bool,
}

impl GatewayConfig {
    /// Compiled-in defaults, rooted at `root`.
    pub fn for_project(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let gate_dir = root.join(".atlas-gate");
        Self {
            workspace_root: root,
            audit_log: gate_dir.join("audit.log"),
            intent_exempt: gate_dir.join("intent-exempt"),
            bootstrap_secret: None,
            audit_backend: "file".to_string(),
            session_backend: "memory".to_string(),
            preflight_timeout: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(25),
            run_preflight: false,
        }
    }

    /// Layer (2) `atlas-gate.toml` over the defaults, then (3) environment
    /// variables over the result. `root` is the project directory the
    /// optional `atlas-gate.toml` is read from.
    pub fn load(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let mut config = Self::for_project(root);

        let toml_path = root.join("atlas-gate.toml");
        if let Ok(raw) = std::fs::read_to_string(&toml_path) {
            match toml::from_str::<FileConfig>(&raw) {
                Ok(file) => config.apply_file(file),
                Err(e) => tracing::warn!(path = %toml_path.display(), error = %e, "ignoring malformed atlas-gate.toml"),
            }
        }

        config.apply_env();
        config
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(secret) = file.bootstrap_secret {
            self.bootstrap_secret = Some(secret);
        }
        if let Some(backend) = file.audit_backend {
            self.audit_backend = backend;
        }
        if let Some(backend) = file.session_backend {
            self.session_backend = backend;
        }
        if let Some(secs) = file.preflight_timeout_secs {
            self.preflight_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.lock_timeout_secs {
            self.lock_timeout = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("ATLAS_BOOTSTRAP_SECRET") {
            self.bootstrap_secret = Some(secret);
        }
        if let Ok(root) = std::env::var("WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Ok(backend) = std::env::var("AUDIT_BACKEND") {
            self.audit_backend = backend;
        }
        if let Ok(backend) = std::env::var("SESSION_BACKEND") {
            self.session_backend = backend;
        }
        if let Ok(secs) = std::env::var("ATLAS_PREFLIGHT_TIMEOUT_SECS") {
            if let Ok(n) = secs.parse() {
                self.preflight_timeout = Duration::from_secs(n);
            }
        }
        if let Ok(secs) = std::env::var("ATLAS_LOCK_TIMEOUT_SECS") {
            if let Ok(n) = secs.parse() {
                self.lock_timeout = Duration::from_secs(n);
            }
        }
    }
}
