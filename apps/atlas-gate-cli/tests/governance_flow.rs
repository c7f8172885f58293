// governance_flow.rs — End-to-end integration test for the governance
// gateway: proves the whole stack this CLI ships (gate-session,
// gate-policy, gate-audit) cooperates correctly end to end, not just in
// isolation inside each crate's own unit tests.
//
// Flow:
//   1. begin an EXECUTOR session against a fresh workspace
//   2. submit a plan, approve it
//   3. write its intent artifact, then write the governed file
//   4. verify the audit log's hash chain is intact
//   5. confirm a write outside the approved path allowlist is refused and
//      still produces an audit entry

use std::fs;

use gate_audit::AuditLog;
use gate_policy::{
    ExemptPaths, PlanRegistry, PlanStatus, PolicyEngineConfig, PolicyError, WriteBody,
    WritePolicyEngine, WriteRequest,
};
use gate_session::{Role, SessionResolver};

fn approved_plan_text() -> String {
    r#"## Plan Metadata
plan_id: PLAN-GATEWAY-1
role_owner: EXECUTOR

## Scope & Constraints
- touches only src/
- no network access

## Phase Definitions
### PHASE_ONE
Description: add the greeting helper
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

fn intent_artifact_for(target: &str, plan_hash: &str, phase: &str) -> String {
    format!(
        "# {target}\n\n\
         ## Purpose\n- greet a caller by name\n\n\
         ## Authority\nplan: {plan_hash}\nphase: {phase}\n\n\
         ## Inputs\n- a name string\n\n\
         ## Outputs\n- a formatted greeting\n\n\
         ## Invariants\n- never panics on empty input\n\n\
         ## Failure Modes\n- none expected\n\n\
         ## Debug Signals\n- none\n\n\
         ## Out of Scope\n- localization\n"
    )
}

#[test]
fn full_write_flow_from_plan_submission_to_audit_verification() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let mut resolver = SessionResolver::new();
    resolver.begin(root, Role::Executor).unwrap();

    let plans_dir = resolver.plans_dir().unwrap();
    let registry = PlanRegistry::new(plans_dir);
    let plan = registry.submit(&approved_plan_text()).unwrap();
    assert_eq!(plan.status, PlanStatus::Draft);
    registry.set_status(&plan.hash, PlanStatus::Proposed).unwrap();
    registry.set_status(&plan.hash, PlanStatus::Approved).unwrap();

    let intent_content = intent_artifact_for("src/greet.rs", &plan.hash, "PHASE_ONE");
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/greet.intent.md"), &intent_content).unwrap();

    let exempt = ExemptPaths::empty();
    let engine = WritePolicyEngine::new(registry, exempt, PolicyEngineConfig::default());

    let audit_path = root.join(".atlas-gate").join("audit.log");
    let mut audit = AuditLog::open(&audit_path).unwrap();

    let request = WriteRequest {
        path: "src/greet.rs".to_string(),
        plan_hash: plan.hash.clone(),
        plan_id: Some("PLAN-GATEWAY-1".to_string()),
        phase_id: "PHASE_ONE".to_string(),
        body: WriteBody::Content("pub fn greet(name: &str) -> String {\n    format!(\"hello, {name}\")\n}\n".to_string()),
        previous_hash: None,
    };
    let outcome = engine
        .execute_write(&resolver, true, &mut audit, request)
        .unwrap();

    let written = fs::read_to_string(root.join("src/greet.rs")).unwrap();
    assert_eq!(outcome.result_hash, gate_audit::hash_str(&written));
    assert!(written.contains("hello, {name}"));

    let report = AuditLog::verify(&audit_path).unwrap();
    assert!(report.valid, "audit chain should verify: {:?}", report.failures);

    let entries = AuditLog::read_all(&audit_path).unwrap();
    let write_entry = entries
        .iter()
        .find(|e| e.tool == "write_file")
        .expect("a write_file entry should be recorded");
    assert_eq!(write_entry.result_hash.as_deref(), Some(outcome.result_hash.as_str()));

    let second_request = WriteRequest {
        path: "config/settings.toml".to_string(),
        plan_hash: plan.hash.clone(),
        plan_id: Some("PLAN-GATEWAY-1".to_string()),
        phase_id: "PHASE_ONE".to_string(),
        body: WriteBody::Content("[settings]\n".to_string()),
        previous_hash: None,
    };
    let err = engine
        .execute_write(&resolver, true, &mut audit, second_request)
        .unwrap_err();
    assert!(matches!(
        err,
        PolicyError::Plan(gate_policy::PlanError::PathNotAllowed { .. })
    ));
    assert!(!root.join("config/settings.toml").exists());

    let entries_after_refusal = AuditLog::read_all(&audit_path).unwrap();
    assert_eq!(entries_after_refusal.len(), entries.len() + 1);
    let refused_entry = entries_after_refusal.last().unwrap();
    assert_eq!(refused_entry.result, gate_audit::AuditResult::Error);

    let final_report = AuditLog::verify(&audit_path).unwrap();
    assert!(final_report.valid, "a refusal entry must not break the hash chain");
}
