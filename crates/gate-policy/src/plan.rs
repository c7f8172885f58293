// plan.rs — the Plan entity: content-addressed identity, the approval
// status taxonomy, and the declared scope a write must fall within.

use serde::{Deserialize, Serialize};

/// A plan's position in the approval lifecycle. Only `Approved` plans are
/// executable; every other status is either pre-approval or terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanStatus {
    Draft,
    Proposed,
    Approved,
    Deprecated,
    Rejected,
    Superseded,
}

impl PlanStatus {
    /// Whether `self -> to` is a transition the taxonomy allows. Not in this
    /// table means refused, never silently coerced.
    pub fn can_transition_to(self, to: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, to),
            (Draft, Proposed)
                | (Draft, Approved)
                | (Proposed, Approved)
                | (Proposed, Rejected)
                | (Approved, Deprecated)
                | (Approved, Rejected)
                | (Deprecated, Superseded)
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanStatus::Draft => "DRAFT",
            PlanStatus::Proposed => "PROPOSED",
            PlanStatus::Approved => "APPROVED",
            PlanStatus::Deprecated => "DEPRECATED",
            PlanStatus::Rejected => "REJECTED",
            PlanStatus::Superseded => "SUPERSEDED",
        };
        write!(f, "{s}")
    }
}

/// A single `PHASE_ID` block under "Phase Definitions".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub id: String,
    pub description: String,
    pub verification_commands: Vec<String>,
}

/// A plan-declared exemption for one construct-detector finding — requires
/// naming the construct, its location, the reason, mitigating controls, a
/// removal date, and a test witness (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedConstruct {
    pub id: String,
    pub location: String,
    pub reason: String,
    pub controls: String,
    pub removal_date: String,
    pub test_witness: String,
}

/// A parsed, linted plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// SHA-256 hex of the stripped content; also the on-disk filename stem.
    pub hash: String,
    pub plan_id: Option<String>,
    pub status: PlanStatus,
    pub path_allowlist: Vec<String>,
    pub forbidden_actions: Vec<String>,
    pub phases: Vec<PhaseDefinition>,
    pub authorized_constructs: Vec<AuthorizedConstruct>,
    /// The header-stripped source content this plan was linted from.
    pub content: String,
}

impl Plan {
    /// Whether `resolved_relative_path` matches one of this plan's declared
    /// path-allowlist globs (§4.6 step 5).
    pub fn allows_path(&self, workspace_relative_path: &str) -> bool {
        self.path_allowlist.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(workspace_relative_path))
                .unwrap_or(false)
        })
    }

    /// Find a plan-declared authorization for `construct_id` at `location`,
    /// if one exists (§4.3 exemption for MEDIUM-severity findings).
    pub fn authorization_for(&self, construct_id: &str, location: &str) -> Option<&AuthorizedConstruct> {
        self.authorized_constructs
            .iter()
            .find(|a| a.id == construct_id && a.location == location)
    }

    pub fn phase(&self, id: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_go_to_proposed_or_approved() {
        assert!(PlanStatus::Draft.can_transition_to(PlanStatus::Proposed));
        assert!(PlanStatus::Draft.can_transition_to(PlanStatus::Approved));
        assert!(!PlanStatus::Draft.can_transition_to(PlanStatus::Deprecated));
    }

    #[test]
    fn approved_is_not_reachable_from_deprecated() {
        assert!(!PlanStatus::Approved.can_transition_to(PlanStatus::Draft));
        assert!(!PlanStatus::Deprecated.can_transition_to(PlanStatus::Approved));
    }

    #[test]
    fn deprecated_can_only_reach_superseded() {
        assert!(PlanStatus::Deprecated.can_transition_to(PlanStatus::Superseded));
        assert!(!PlanStatus::Deprecated.can_transition_to(PlanStatus::Rejected));
    }

    #[test]
    fn rejected_and_superseded_are_terminal() {
        for to in [
            PlanStatus::Draft,
            PlanStatus::Proposed,
            PlanStatus::Approved,
            PlanStatus::Deprecated,
            PlanStatus::Rejected,
            PlanStatus::Superseded,
        ] {
            assert!(!PlanStatus::Rejected.can_transition_to(to));
            assert!(!PlanStatus::Superseded.can_transition_to(to));
        }
    }

    fn sample_plan() -> Plan {
        Plan {
            hash: "abc".to_string(),
            plan_id: None,
            status: PlanStatus::Approved,
            path_allowlist: vec!["src/**".to_string()],
            forbidden_actions: vec![],
            phases: vec![PhaseDefinition {
                id: "PHASE_ONE".to_string(),
                description: "do the thing".to_string(),
                verification_commands: vec!["cargo test".to_string()],
            }],
            authorized_constructs: vec![AuthorizedConstruct {
                id: "C3".to_string(),
                location: "src/lib.rs:10".to_string(),
                reason: "tracked follow-up".to_string(),
                controls: "reviewed".to_string(),
                removal_date: "2026-09-01".to_string(),
                test_witness: "tests::todo_is_tracked".to_string(),
            }],
            content: String::new(),
        }
    }

    #[test]
    fn allows_path_matches_glob() {
        let plan = sample_plan();
        assert!(plan.allows_path("src/main.rs"));
        assert!(!plan.allows_path("docs/plans/x.md"));
    }

    #[test]
    fn authorization_for_finds_matching_entry() {
        let plan = sample_plan();
        assert!(plan.authorization_for("C3", "src/lib.rs:10").is_some());
        assert!(plan.authorization_for("C3", "src/lib.rs:99").is_none());
        assert!(plan.authorization_for("C5", "src/lib.rs:10").is_none());
    }

    #[test]
    fn phase_lookup_by_id() {
        let plan = sample_plan();
        assert!(plan.phase("PHASE_ONE").is_some());
        assert!(plan.phase("PHASE_TWO").is_none());
    }
}
