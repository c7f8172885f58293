// registry.rs — the Plan Registry: filesystem storage under
// `<workspace>/docs/plans/<hash>.md`, the approval-status store, and the
// approval-gated lookup surface (`list_plans`, `load`, `enforce`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::linter::{self, LintReport};
use crate::plan::{Plan, PlanStatus};

/// On-disk status record, one per plan hash, tracked separately from the
/// plan's hashed content so a status transition never mints a new hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRecord {
    status: PlanStatus,
    plan_id: Option<String>,
}

/// Discovers, validates, hashes, and approval-gates plan documents under a
/// workspace's `docs/plans/` directory.
pub struct PlanRegistry {
    plans_dir: PathBuf,
}

impl PlanRegistry {
    pub fn new(plans_dir: PathBuf) -> Self {
        Self { plans_dir }
    }

    fn status_store_path(&self) -> PathBuf {
        self.plans_dir.join(".status.json")
    }

    fn read_status_store(&self) -> Result<HashMap<String, StatusRecord>, PlanError> {
        let path = self.status_store_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    fn write_status_store(&self, store: &HashMap<String, StatusRecord>) -> Result<(), PlanError> {
        std::fs::create_dir_all(&self.plans_dir).map_err(|source| PlanError::Io {
            path: self.plans_dir.display().to_string(),
            source,
        })?;
        let path = self.status_store_path();
        let raw = serde_json::to_string_pretty(store).expect("status store is serializable");
        std::fs::write(&path, raw).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Pure lint, no filesystem access (§4.2 public contract).
    pub fn lint(&self, content: &str) -> LintReport {
        linter::lint(content)
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.plans_dir.join(format!("{hash}.md"))
    }

    /// Lint `content`; on success, persist it as `<hash>.md` with status
    /// DRAFT and return the parsed plan. On lint failure, nothing is
    /// written.
    pub fn submit(&self, content: &str) -> Result<Plan, PlanError> {
        let report = self.lint(content);
        if !report.passed {
            return Err(PlanError::LintFailed(report.errors));
        }
        let stripped = linter::strip_header(content);
        std::fs::create_dir_all(&self.plans_dir).map_err(|source| PlanError::Io {
            path: self.plans_dir.display().to_string(),
            source,
        })?;
        let path = self.path_for(&report.hash);
        std::fs::write(&path, &stripped).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut store = self.read_status_store()?;
        let plan = linter::parse(&stripped, report.hash.clone());
        store.entry(report.hash.clone()).or_insert(StatusRecord {
            status: PlanStatus::Draft,
            plan_id: plan.plan_id.clone(),
        });
        self.write_status_store(&store)?;

        self.load(&report.hash)
    }

    /// Load a plan by hash, verifying the filename matches the content hash
    /// and attaching its tracked status.
    pub fn load(&self, hash: &str) -> Result<Plan, PlanError> {
        let path = self.path_for(hash);
        if !path.exists() {
            return Err(PlanError::NotFound {
                hash: hash.to_string(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let actual = gate_audit::hash_str(&content);
        if actual != hash {
            return Err(PlanError::Tampered {
                path: path.display().to_string(),
                expected: hash.to_string(),
                actual,
            });
        }

        let mut plan = linter::parse(&content, hash.to_string());
        let store = self.read_status_store()?;
        if let Some(record) = store.get(hash) {
            plan.status = record.status;
            if plan.plan_id.is_none() {
                plan.plan_id = record.plan_id.clone();
            }
        }
        Ok(plan)
    }

    /// Every plan hash currently tracked with status APPROVED.
    pub fn list_plans(&self) -> Result<Vec<String>, PlanError> {
        let store = self.read_status_store()?;
        let mut hashes: Vec<String> = store
            .iter()
            .filter(|(_, r)| r.status == PlanStatus::Approved)
            .map(|(h, _)| h.clone())
            .collect();
        hashes.sort();
        Ok(hashes)
    }

    /// Return the plan iff APPROVED and, if `required_plan_id` is given, its
    /// declared `plan_id` matches exactly (§4.2, §4.6 step 4).
    pub fn enforce(&self, hash: &str, required_plan_id: Option<&str>) -> Result<Plan, PlanError> {
        let plan = self.load(hash)?;
        if plan.status != PlanStatus::Approved {
            return Err(PlanError::NotApproved {
                hash: hash.to_string(),
                status: plan.status.to_string(),
            });
        }
        if let Some(required) = required_plan_id {
            if plan.plan_id.as_deref() != Some(required) {
                return Err(PlanError::IdMismatch {
                    hash: hash.to_string(),
                    declared: plan.plan_id.clone(),
                    required: required.to_string(),
                });
            }
        }
        Ok(plan)
    }

    /// Transition a plan's tracked status. Refuses transitions the taxonomy
    /// does not allow rather than silently coercing them.
    pub fn set_status(&self, hash: &str, to: PlanStatus) -> Result<(), PlanError> {
        let current = self.load(hash)?;
        if !current.status.can_transition_to(to) {
            return Err(PlanError::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }
        let mut store = self.read_status_store()?;
        store.insert(
            hash.to_string(),
            StatusRecord {
                status: to,
                plan_id: current.plan_id.clone(),
            },
        );
        self.write_status_store(&store)
    }

    pub fn plans_dir(&self) -> &Path {
        &self.plans_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_plan_text() -> String {
        r#"## Plan Metadata
plan_id: PLAN-1
role_owner: EXECUTOR

## Scope & Constraints
- touches only src/
- no network access

## Phase Definitions
### PHASE_ONE
Description: add the summary enforcement check
Verification: cargo test

## Path Allowlist
- src/**

## Verification Gates
- cargo test

## Forbidden Actions
- MUST NOT write outside src/

## Rollback/Failure Policy
Triggers: test failure
Procedure: revert the change
Recovery: restore from git
"#
        .to_string()
    }

    #[test]
    fn submit_writes_file_named_by_hash() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let plan = registry.submit(&valid_plan_text()).unwrap();
        assert!(dir.path().join(format!("{}.md", plan.hash)).exists());
        assert_eq!(plan.status, PlanStatus::Draft);
    }

    #[test]
    fn submit_rejects_failing_lint() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let err = registry.submit("## Plan Metadata\n").unwrap_err();
        assert!(matches!(err, PlanError::LintFailed(_)));
    }

    #[test]
    fn load_detects_tampered_filename() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let plan = registry.submit(&valid_plan_text()).unwrap();

        let real_path = dir.path().join(format!("{}.md", plan.hash));
        std::fs::write(&real_path, "tampered content").unwrap();

        let err = registry.load(&plan.hash).unwrap_err();
        assert!(matches!(err, PlanError::Tampered { .. }));
    }

    #[test]
    fn list_plans_only_returns_approved() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let plan = registry.submit(&valid_plan_text()).unwrap();
        assert!(registry.list_plans().unwrap().is_empty());

        registry.set_status(&plan.hash, PlanStatus::Proposed).unwrap();
        registry.set_status(&plan.hash, PlanStatus::Approved).unwrap();
        assert_eq!(registry.list_plans().unwrap(), vec![plan.hash]);
    }

    #[test]
    fn enforce_rejects_unapproved_plan() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let plan = registry.submit(&valid_plan_text()).unwrap();
        let err = registry.enforce(&plan.hash, None).unwrap_err();
        assert!(matches!(err, PlanError::NotApproved { .. }));
    }

    #[test]
    fn enforce_rejects_plan_id_mismatch() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let plan = registry.submit(&valid_plan_text()).unwrap();
        registry.set_status(&plan.hash, PlanStatus::Proposed).unwrap();
        registry.set_status(&plan.hash, PlanStatus::Approved).unwrap();

        let err = registry.enforce(&plan.hash, Some("OTHER-ID")).unwrap_err();
        assert!(matches!(err, PlanError::IdMismatch { .. }));
    }

    #[test]
    fn set_status_rejects_invalid_transition() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let plan = registry.submit(&valid_plan_text()).unwrap();
        let err = registry
            .set_status(&plan.hash, PlanStatus::Deprecated)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));
    }

    #[test]
    fn load_missing_plan_is_not_found() {
        let dir = tempdir().unwrap();
        let registry = PlanRegistry::new(dir.path().to_path_buf());
        let err = registry.load(&"0".repeat(64)).unwrap_err();
        assert!(matches!(err, PlanError::NotFound { .. }));
    }
}
