// intent.rs — the Intent Artifact Validator (§4.4): ensures every non-exempt
// write carries a companion document binding it to the executing plan and
// phase, before the write-time policy engine lets the mutation land.

use crate::error::IntentError;
use crate::exemption::ExemptPaths;

const REQUIRED_SECTIONS: &[&str] = &[
    "Purpose",
    "Authority",
    "Inputs",
    "Outputs",
    "Invariants",
    "Failure Modes",
    "Debug Signals",
    "Out of Scope",
];

const WIP_MARKERS: &[&str] = &["TODO", "FIXME", "WIP", "work in progress"];

/// The outcome of a successful validation: the canonical hash of the intent
/// content, recorded on the audit entry for the write it authorizes.
pub struct IntentValidation {
    pub hash: String,
}

/// Convention: an intent document for `<dir>/<name>.<ext>` lives alongside
/// it as `<dir>/<name>.intent.md`.
pub fn intent_path_for(target_path: &str) -> String {
    match target_path.rsplit_once('.') {
        Some((stem, _ext)) => format!("{stem}.intent.md"),
        None => format!("{target_path}.intent.md"),
    }
}

fn tokenize_sections(content: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_body = String::new();

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(h) = current_heading.take() {
                sections.push((h, std::mem::take(&mut current_body)));
            }
            current_heading = Some(heading.trim().to_string());
        } else if current_heading.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(h) = current_heading {
        sections.push((h, current_body));
    }
    sections
}

fn title_path(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|l| l.trim_start().strip_prefix("# "))
        .map(|s| s.trim().to_string())
}

fn section_body<'a>(sections: &'a [(String, String)], name: &str) -> Option<&'a str> {
    sections
        .iter()
        .find(|(h, _)| h == name)
        .map(|(_, b)| b.as_str())
}

fn non_empty_bullets(body: &str) -> bool {
    body.lines().any(|l| {
        let t = l.trim_start();
        t.starts_with("- ") && !t.trim_start_matches("- ").trim().is_empty()
    })
}

fn field_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    let prefix = format!("{key}:");
    body.lines().find_map(|l| {
        let trimmed = l.trim_start();
        trimmed.strip_prefix(prefix.as_str()).map(str::trim)
    })
}

fn check_schema_structure(content: &str, sections: &[(String, String)]) -> Result<(), String> {
    let headings: Vec<&str> = sections.iter().map(|(h, _)| h.as_str()).collect();
    let present: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|s| headings.contains(s))
        .collect();

    let missing: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|s| !headings.contains(s))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing required sections: {}", missing.join(", ")));
    }

    let expected_order: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|s| present.contains(s))
        .collect();
    if present != expected_order {
        return Err("required sections are present but out of order".to_string());
    }

    for name in [
        "Purpose",
        "Inputs",
        "Outputs",
        "Invariants",
        "Failure Modes",
        "Debug Signals",
        "Out of Scope",
    ] {
        if let Some(body) = section_body(sections, name) {
            if !non_empty_bullets(body) {
                return Err(format!("section '{name}' must contain at least one non-empty bullet"));
            }
        }
    }

    if title_path(content).is_none() {
        return Err("missing title line ('# <path>')".to_string());
    }

    Ok(())
}

fn check_forbidden_content(content: &str) -> Option<String> {
    if content.contains("```") {
        return Some("fenced code blocks are not permitted in intent artifacts".to_string());
    }
    if content.lines().any(|l| l.trim_start().starts_with("Author:")) {
        return Some("author attribution is not permitted".to_string());
    }
    for marker in WIP_MARKERS {
        if content.to_uppercase().contains(&marker.to_uppercase()) {
            return Some(format!("work-in-progress marker found: '{marker}'"));
        }
    }
    let has_iso_timestamp = content.lines().any(|l| {
        l.len() >= 20
            && l.as_bytes()[4] == b'-'
            && l.as_bytes()[7] == b'-'
            && l.contains('T')
            && l.contains(':')
    });
    if has_iso_timestamp {
        return Some("embedded absolute timestamp is not permitted".to_string());
    }
    None
}

/// Validate the intent artifact for `target_path`. `is_exempt` comes from
/// the caller's `ExemptPaths` lookup and short-circuits validation entirely
/// when true (§4.4 rule 1).
pub fn validate(
    target_path: &str,
    read_intent: impl FnOnce(&str) -> Option<String>,
    executing_plan_hash: &str,
    executing_phase_id: &str,
    exempt_paths: &ExemptPaths,
) -> Result<IntentValidation, IntentError> {
    if exempt_paths.is_exempt(target_path) {
        return Ok(IntentValidation {
            hash: gate_audit::hash_str(""),
        });
    }

    let intent_path = intent_path_for(target_path);
    let Some(content) = read_intent(&intent_path) else {
        return Err(IntentError::MandatoryIntentLaw {
            path: intent_path,
        });
    };

    let sections = tokenize_sections(&content);
    if let Err(detail) = check_schema_structure(&content, &sections) {
        return Err(IntentError::SchemaStructure {
            path: intent_path,
            detail,
        });
    }

    let declared_title = title_path(&content).expect("checked present above");
    if declared_title != target_path {
        return Err(IntentError::PathConsistency {
            declared: declared_title,
            actual: target_path.to_string(),
        });
    }

    let authority = section_body(&sections, "Authority").expect("checked present above");
    let declared_plan = field_value(authority, "plan").unwrap_or_default();
    let declared_phase = field_value(authority, "phase").unwrap_or_default();
    if declared_plan != executing_plan_hash || declared_phase != executing_phase_id {
        return Err(IntentError::PlanBinding {
            declared_plan: declared_plan.to_string(),
            declared_phase: declared_phase.to_string(),
            expected_plan: executing_plan_hash.to_string(),
            expected_phase: executing_phase_id.to_string(),
        });
    }

    if let Some(detail) = check_forbidden_content(&content) {
        return Err(IntentError::ForbiddenContent {
            path: intent_path,
            detail,
        });
    }

    Ok(IntentValidation {
        hash: gate_audit::hash_str(&content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_intent(target: &str, plan_hash: &str, phase: &str) -> String {
        format!(
            "# {target}\n\n## Purpose\n- add integer addition helper\n\n## Authority\nplan: {plan_hash}\nphase: {phase}\n\n## Inputs\n- two integers\n\n## Outputs\n- their sum\n\n## Invariants\n- no overflow panics in debug builds\n\n## Failure Modes\n- none expected\n\n## Debug Signals\n- none\n\n## Out of Scope\n- floating point\n"
        )
    }

    #[test]
    fn intent_path_follows_convention() {
        assert_eq!(intent_path_for("src/math.rs"), "src/math.intent.md");
    }

    #[test]
    fn missing_intent_is_mandatory_intent_law() {
        let exempt = ExemptPaths::empty();
        let err = validate("src/math.rs", |_| None, "h", "PHASE_ONE", &exempt).unwrap_err();
        assert!(matches!(err, IntentError::MandatoryIntentLaw { .. }));
    }

    #[test]
    fn exempt_target_skips_validation() {
        let exempt = ExemptPaths::parse_content("docs/reports/**\n");
        let result = validate("docs/reports/failure.md", |_| None, "h", "PHASE_ONE", &exempt).unwrap();
        assert!(!result.hash.is_empty());
    }

    #[test]
    fn well_formed_intent_passes() {
        let exempt = ExemptPaths::empty();
        let content = valid_intent("src/math.rs", "deadbeef", "PHASE_ONE");
        let result = validate(
            "src/math.rs",
            |_| Some(content.clone()),
            "deadbeef",
            "PHASE_ONE",
            &exempt,
        )
        .unwrap();
        assert_eq!(result.hash, gate_audit::hash_str(&content));
    }

    #[test]
    fn title_path_mismatch_is_rejected() {
        let exempt = ExemptPaths::empty();
        let content = valid_intent("src/other.rs", "deadbeef", "PHASE_ONE");
        let err = validate(
            "src/math.rs",
            |_| Some(content.clone()),
            "deadbeef",
            "PHASE_ONE",
            &exempt,
        )
        .unwrap_err();
        assert!(matches!(err, IntentError::PathConsistency { .. }));
    }

    #[test]
    fn plan_binding_drift_is_rejected() {
        let exempt = ExemptPaths::empty();
        let content = valid_intent("src/math.rs", "deadbeef", "PHASE_ONE");
        let err = validate(
            "src/math.rs",
            |_| Some(content.clone()),
            "different-hash",
            "PHASE_ONE",
            &exempt,
        )
        .unwrap_err();
        assert!(matches!(err, IntentError::PlanBinding { .. }));
    }

    #[test]
    fn fenced_code_block_is_forbidden_content() {
        let exempt = ExemptPaths::empty();
        let mut content = valid_intent("src/math.rs", "deadbeef", "PHASE_ONE");
        content.push_str("\n```rust\nfn add() {}\n```\n");
        let err = validate(
            "src/math.rs",
            |_| Some(content.clone()),
            "deadbeef",
            "PHASE_ONE",
            &exempt,
        )
        .unwrap_err();
        assert!(matches!(err, IntentError::ForbiddenContent { .. }));
    }

    #[test]
    fn missing_section_is_schema_structure_error() {
        let exempt = ExemptPaths::empty();
        let content = valid_intent("src/math.rs", "deadbeef", "PHASE_ONE")
            .replace("## Out of Scope\n- floating point\n", "");
        let err = validate(
            "src/math.rs",
            |_| Some(content.clone()),
            "deadbeef",
            "PHASE_ONE",
            &exempt,
        )
        .unwrap_err();
        assert!(matches!(err, IntentError::SchemaStructure { .. }));
    }
}
