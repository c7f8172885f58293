// error.rs — Error types for the gateway dispatcher: composes every
// component error plus the bootstrap-proof failures that belong to this
// crate alone.

use thiserror::Error;

/// Errors raised verifying a `gate_bootstrap_plan` proof.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap signature does not match the configured secret")]
    SignatureInvalid,

    #[error("bootstrap nonce '{nonce}' has already been consumed for this workspace")]
    NonceReused { nonce: String },

    #[error("bootstrap timestamp is more than 5 minutes from server time")]
    TimestampSkew,

    #[error("no bootstrap secret is configured")]
    NotConfigured,

    #[error(transparent)]
    Plan(#[from] gate_policy::PlanError),

    #[error("I/O error reading or writing nonce store: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for the gateway dispatcher.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Policy(#[from] gate_policy::PolicyError),

    #[error(transparent)]
    Session(#[from] gate_session::ResolverError),

    #[error(transparent)]
    Plan(#[from] gate_policy::PlanError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("audit operation failed")]
    Audit(#[source] gate_audit::AuditError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

// Written by hand rather than `#[from]`, matching the same call made in
// gate-policy's own error module: gate_audit::AuditError already owns a
// `#[from] std::io::Error` conversion (WriteFailed), so a second blanket
// `#[from]` here would collide with GatewayError's own `Io` variant.
impl From<gate_audit::AuditError> for GatewayError {
    fn from(source: gate_audit::AuditError) -> Self {
        GatewayError::Audit(source)
    }
}

impl GatewayError {
    /// Flatten to the same `{code, invariant_id, message}` shape
    /// `PolicyError::refusal` produces, so every refusal — whether it
    /// originated in the policy engine or in this crate's own bootstrap
    /// check — reaches the client and the audit log in one shape.
    pub fn refusal(&self) -> gate_policy::PolicyRefusal {
        if let GatewayError::Policy(pe) = self {
            return pe.refusal();
        }
        let message = self.to_string();
        let (code, invariant_id) = match self {
            GatewayError::Policy(_) => unreachable!("handled above"),
            GatewayError::Session(_) => ("INVALID_PATH", "INVALID_PATH"),
            GatewayError::Plan(pe) => plan_code(pe),
            GatewayError::Bootstrap(be) => bootstrap_code(be),
            GatewayError::Audit(_) => ("AUDIT_APPEND_FAILED", "AUDIT_APPEND_FAILED"),
            GatewayError::Io(_) => ("AUDIT_APPEND_FAILED", "AUDIT_APPEND_FAILED"),
            GatewayError::Other(_) => ("GATEWAY_ERROR", "GATEWAY_ERROR"),
        };
        gate_policy::PolicyRefusal {
            code,
            invariant_id,
            message,
        }
    }
}

fn plan_code(pe: &gate_policy::PlanError) -> (&'static str, &'static str) {
    use gate_policy::PlanError::*;
    match pe {
        NotFound { .. } => ("PLAN_NOT_FOUND", "PLAN_NOT_FOUND"),
        NotApproved { .. } => ("PLAN_NOT_APPROVED", "PLAN_NOT_APPROVED"),
        IdMismatch { .. } => ("PLAN_ID_MISMATCH", "PLAN_ID_MISMATCH"),
        Tampered { .. } => ("PLAN_TAMPERED", "PLAN_TAMPERED"),
        LintFailed(_) => ("PLAN_LINT_FAILED", "PLAN_LINT_FAILED"),
        InvalidTransition { .. } => ("PLAN_LINT_FAILED", "PLAN_LINT_FAILED"),
        PathNotAllowed { .. } => ("INV_PATH_WITHIN_REPO", "INV_PATH_WITHIN_REPO"),
        Io { .. } => ("PLAN_NOT_FOUND", "PLAN_NOT_FOUND"),
    }
}

fn bootstrap_code(be: &BootstrapError) -> (&'static str, &'static str) {
    match be {
        BootstrapError::SignatureInvalid => (
            "BOOTSTRAP_SIGNATURE_INVALID",
            "BOOTSTRAP_SIGNATURE_INVALID",
        ),
        BootstrapError::NonceReused { .. } => {
            ("BOOTSTRAP_NONCE_REUSED", "BOOTSTRAP_NONCE_REUSED")
        }
        BootstrapError::TimestampSkew => {
            ("BOOTSTRAP_TIMESTAMP_SKEW", "BOOTSTRAP_TIMESTAMP_SKEW")
        }
        BootstrapError::NotConfigured => (
            "BOOTSTRAP_SIGNATURE_INVALID",
            "BOOTSTRAP_SIGNATURE_INVALID",
        ),
        BootstrapError::Plan(pe) => plan_code(pe),
        BootstrapError::Io(_) => ("AUDIT_APPEND_FAILED", "AUDIT_APPEND_FAILED"),
    }
}
