//! # gate-policy
//!
//! Plan registry, construct detector, intent artifact validator, and the
//! write-time policy engine that orchestrates them — the governance
//! gateway's authorization core.
//!
//! A mutation only lands once it clears, in order: the session/role gate,
//! the prompt gate, path resolution, plan binding against an `APPROVED`
//! plan, that plan's path allowlist, optimistic concurrency, intent
//! artifact validation, and a forbidden-construct scan. Any failure is
//! fail-closed and recorded in the audit log by [`engine::WritePolicyEngine`].

pub mod construct;
pub mod engine;
pub mod error;
pub mod exemption;
pub mod intent;
pub mod linter;
pub mod plan;
pub mod registry;

pub use engine::{PolicyEngineConfig, WriteBody, WriteOutcome, WritePolicyEngine, WriteRequest};
pub use error::{ConstructError, IntentError, PlanError, PolicyError, PolicyRefusal};
pub use exemption::ExemptPaths;
pub use linter::LintReport;
pub use plan::{AuthorizedConstruct, PhaseDefinition, Plan, PlanStatus};
pub use registry::PlanRegistry;
