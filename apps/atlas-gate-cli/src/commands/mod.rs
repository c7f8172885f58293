pub mod audit;
pub mod plan;
pub mod serve;
pub mod session;

use std::fmt;

/// Marks an error as a sandbox/audit integrity violation rather than an
/// ordinary startup or usage failure, so `main` can map it to exit code 2
/// per the CLI's documented exit-code contract.
#[derive(Debug)]
pub struct SandboxIntegrityFailure;

impl fmt::Display for SandboxIntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sandbox integrity failed")
    }
}

impl std::error::Error for SandboxIntegrityFailure {}

/// True if `err` (or anything in its source chain) is a
/// [`SandboxIntegrityFailure`].
pub fn is_integrity_failure(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<SandboxIntegrityFailure>().is_some())
}
