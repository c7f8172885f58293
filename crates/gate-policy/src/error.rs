// error.rs — Error types for the plan registry, construct detector, intent
// validator, and the write-time policy engine that orchestrates them.

use thiserror::Error;

/// Errors from linting, loading, or transitioning plan documents.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan not found: {hash}")]
    NotFound { hash: String },

    #[error("plan {hash} is not APPROVED (status: {status})")]
    NotApproved { hash: String, status: String },

    #[error("plan {hash} declares plan_id {declared:?}, expected {required}")]
    IdMismatch {
        hash: String,
        declared: Option<String>,
        required: String,
    },

    #[error("plan file {path} does not hash to its own filename (expected {expected}, got {actual})")]
    Tampered {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("plan lint failed: {0:?}")]
    LintFailed(Vec<String>),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("path {path} is outside plan {plan_hash}'s declared path allowlist")]
    PathNotAllowed { path: String, plan_hash: String },

    #[error("failed to read plan store at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the forbidden-construct scanner.
#[derive(Debug, Error)]
pub enum ConstructError {
    #[error("hard block: construct {id} at {location}: {detail}")]
    HardBlock {
        id: &'static str,
        location: String,
        detail: String,
    },

    #[error("content in a structurally-analyzable target failed to parse: {reason}")]
    AstAnalysisFailed { reason: String },

    #[error("construct {id} at {location} requires an AUTHORIZED_{id} entry in the executing plan")]
    AuthorizationRequired { id: &'static str, location: String },
}

/// Errors from validating an intent artifact against its target write.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("no intent artifact found for write target {path}")]
    MandatoryIntentLaw { path: String },

    #[error("intent artifact at {path} is missing or malformed sections: {detail}")]
    SchemaStructure { path: String, detail: String },

    #[error("intent title path '{declared}' does not match write target '{actual}'")]
    PathConsistency { declared: String, actual: String },

    #[error("intent authority (plan {declared_plan}, phase {declared_phase}) does not match executing plan {expected_plan}, phase {expected_phase}")]
    PlanBinding {
        declared_plan: String,
        declared_phase: String,
        expected_plan: String,
        expected_phase: String,
    },

    #[error("intent artifact at {path} contains forbidden content: {detail}")]
    ForbiddenContent { path: String, detail: String },
}

/// The single refusal shape the write-time policy engine returns: a stable
/// `code`, the invariant it enforces, and a human-readable `message`. This is
/// what the dispatcher turns into both a client-visible error and an audit
/// entry's `error_code`/`invariant_id`/`notes`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PolicyRefusal {
    pub code: &'static str,
    pub invariant_id: &'static str,
    pub message: String,
}

/// Errors from the write-time policy engine — the orchestration point for
/// every component in this crate plus the session resolver and audit log.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("session not initialized")]
    SessionNotInitialized,

    #[error("role mismatch: expected {expected}, got {actual}")]
    RoleMismatch { expected: String, actual: String },

    #[error("prompt gate locked: read_prompt must be called before any write")]
    PromptGateLocked,

    #[error(transparent)]
    Path(#[from] gate_session::ResolverError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Construct(#[from] ConstructError),

    #[error("concurrent modification: previousHash did not match current content hash")]
    ConcurrentModification,

    #[error("failed to apply patch: {reason}")]
    PatchApplyFailed { reason: String },

    #[error("preflight command exited non-zero: {command} (status {status})")]
    PreflightFailed { command: String, status: i32 },

    #[error("preflight command exceeded its wall-clock budget: {command}")]
    PreflightTimeout { command: String },

    #[error("audit append failed")]
    AuditAppendFailed(#[source] gate_audit::AuditError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Written by hand rather than `#[from]`: gate_audit::AuditError already owns
// its own `#[from] std::io::Error` conversion (WriteFailed), and deriving a
// second blanket `#[from]` here would give PolicyError two independent paths
// from io::Error, leaving `?` resolution ambiguous at call sites that touch
// both audit and plain I/O. The gateway's own top-level error type makes the
// same call for the same reason.
impl From<gate_audit::AuditError> for PolicyError {
    fn from(source: gate_audit::AuditError) -> Self {
        PolicyError::AuditAppendFailed(source)
    }
}

impl PolicyError {
    /// Flatten this error into the `{code, invariant_id, message}` shape the
    /// dispatcher records in the audit log and returns to the caller.
    pub fn refusal(&self) -> PolicyRefusal {
        let message = self.to_string();
        let (code, invariant_id) = self.code_and_invariant();
        PolicyRefusal {
            code,
            invariant_id,
            message,
        }
    }

    fn code_and_invariant(&self) -> (&'static str, &'static str) {
        use gate_session::ResolverError as RE;
        match self {
            PolicyError::SessionNotInitialized => {
                ("SESSION_NOT_INITIALIZED", "SESSION_NOT_INITIALIZED")
            }
            PolicyError::RoleMismatch { .. } => ("ROLE_MISMATCH", "ROLE_MISMATCH"),
            PolicyError::PromptGateLocked => ("PROMPT_GATE_LOCKED", "PROMPT_GATE_LOCKED"),
            PolicyError::Path(re) => match re {
                RE::SessionNotInitialized => {
                    ("SESSION_NOT_INITIALIZED", "SESSION_NOT_INITIALIZED")
                }
                RE::AlreadyInitialized => ("INVALID_PATH", "INVALID_PATH"),
                RE::WorkspaceNotADirectory { .. } | RE::WorkspaceUnreadable { .. } => {
                    ("INVALID_PATH", "INVALID_PATH")
                }
                RE::InvalidPath { .. } => ("INVALID_PATH", "INVALID_PATH"),
                RE::PathTraversal { .. } => ("PATH_TRAVERSAL", "INV_PATH_WITHIN_REPO"),
                RE::RoleMismatch { .. } => ("ROLE_MISMATCH", "ROLE_MISMATCH"),
                RE::PlansDirUnavailable { .. } => ("INVALID_PATH", "INVALID_PATH"),
            },
            PolicyError::Plan(pe) => match pe {
                PlanError::NotFound { .. } => ("PLAN_NOT_FOUND", "PLAN_NOT_FOUND"),
                PlanError::NotApproved { .. } => ("PLAN_NOT_APPROVED", "PLAN_NOT_APPROVED"),
                PlanError::IdMismatch { .. } => ("PLAN_ID_MISMATCH", "PLAN_ID_MISMATCH"),
                PlanError::Tampered { .. } => ("PLAN_TAMPERED", "PLAN_TAMPERED"),
                PlanError::LintFailed(_) => ("PLAN_LINT_FAILED", "PLAN_LINT_FAILED"),
                PlanError::InvalidTransition { .. } => ("PLAN_LINT_FAILED", "PLAN_LINT_FAILED"),
                PlanError::PathNotAllowed { .. } => ("INV_PATH_WITHIN_REPO", "INV_PATH_WITHIN_REPO"),
                PlanError::Io { .. } => ("PLAN_NOT_FOUND", "PLAN_NOT_FOUND"),
            },
            PolicyError::Intent(ie) => match ie {
                IntentError::MandatoryIntentLaw { .. } => {
                    ("MANDATORY_INTENT_LAW", "MANDATORY_INTENT_LAW")
                }
                IntentError::SchemaStructure { .. } => {
                    ("INTENT_SCHEMA_STRUCTURE", "INTENT_SCHEMA_STRUCTURE")
                }
                IntentError::PathConsistency { .. } => {
                    ("INTENT_PATH_CONSISTENCY", "INTENT_PATH_CONSISTENCY")
                }
                IntentError::PlanBinding { .. } => {
                    ("INTENT_PLAN_BINDING", "INTENT_PLAN_BINDING")
                }
                IntentError::ForbiddenContent { .. } => (
                    "INTENT_SCHEMA_FORBIDDEN_CONTENT",
                    "INTENT_SCHEMA_FORBIDDEN_CONTENT",
                ),
            },
            PolicyError::Construct(ce) => match ce {
                ConstructError::HardBlock { .. } => {
                    ("HARD_BLOCK_VIOLATION", "HARD_BLOCK_VIOLATION")
                }
                ConstructError::AstAnalysisFailed { .. } => {
                    ("AST_ANALYSIS_FAILED", "AST_ANALYSIS_FAILED")
                }
                ConstructError::AuthorizationRequired { .. } => {
                    ("AUTHORIZATION_REQUIRED", "AUTHORIZATION_REQUIRED")
                }
            },
            PolicyError::ConcurrentModification => {
                ("CONCURRENT_MODIFICATION", "CONCURRENT_MODIFICATION")
            }
            PolicyError::PatchApplyFailed { .. } => {
                ("PATCH_APPLY_FAILED", "PATCH_APPLY_FAILED")
            }
            PolicyError::PreflightFailed { .. } => ("PREFLIGHT_FAILED", "PREFLIGHT_FAILED"),
            PolicyError::PreflightTimeout { .. } => {
                ("PREFLIGHT_TIMEOUT", "PREFLIGHT_TIMEOUT")
            }
            PolicyError::AuditAppendFailed(ae) => match ae {
                gate_audit::AuditError::LockTimeout { .. } => {
                    ("AUDIT_LOCK_TIMEOUT", "AUDIT_LOCK_TIMEOUT")
                }
                gate_audit::AuditError::IntegrityViolation { .. }
                | gate_audit::AuditError::CorruptTail { .. } => {
                    ("AUDIT_INTEGRITY_BROKEN", "AUDIT_INTEGRITY_BROKEN")
                }
                gate_audit::AuditError::OpenFailed { .. }
                | gate_audit::AuditError::WriteFailed(_)
                | gate_audit::AuditError::SerializationError(_) => {
                    ("AUDIT_APPEND_FAILED", "AUDIT_APPEND_FAILED")
                }
            },
            PolicyError::Io(_) => ("AUDIT_APPEND_FAILED", "AUDIT_APPEND_FAILED"),
        }
    }
}
