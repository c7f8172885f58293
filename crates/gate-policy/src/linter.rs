// linter.rs — the Plan Linter (§4.2). Pure and deterministic: the same
// input content always yields the same hash and the same error set.

use crate::plan::{AuthorizedConstruct, PhaseDefinition, Plan, PlanStatus};

const REQUIRED_SECTIONS: &[&str] = &[
    "Plan Metadata",
    "Scope & Constraints",
    "Phase Definitions",
    "Path Allowlist",
    "Verification Gates",
    "Forbidden Actions",
    "Rollback/Failure Policy",
];

const AMBIGUOUS_MODALS: &[&str] = &["may", "should", "optional", "try to", "attempt to"];
const STUB_MARKERS: &[&str] = &["TODO", "FIXME", "XXX", "mock", "stub", "placeholder"];

/// Result of `lint()`: whether the document passed, its errors/warnings, and
/// the content hash (the plan's identity regardless of pass/fail).
#[derive(Debug, Clone)]
pub struct LintReport {
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub hash: String,
}

/// Strip the leading HTML-comment header block, if present. The stripped
/// content — not the raw file — is what gets hashed, so a plan's identity
/// does not depend on cosmetic tool-generated header noise.
pub fn strip_header(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with("<!--") {
        return raw.to_string();
    }
    match trimmed.find("-->") {
        Some(end) => trimmed[end + 3..].trim_start_matches('\n').to_string(),
        None => raw.to_string(),
    }
}

/// Tokenize the document into `(heading, body)` pairs split on top-level
/// `## ` headings, preserving source order.
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

fn section_body<'a>(sections: &'a [(String, String)], name: &str) -> Option<&'a str> {
    sections
        .iter()
        .find(|(h, _)| h == name)
        .map(|(_, b)| b.as_str())
}

fn check_section_order(sections: &[(String, String)], errors: &mut Vec<String>) {
    let headings: Vec<&str> = sections.iter().map(|(h, _)| h.as_str()).collect();
    let present: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|s| headings.contains(s))
        .collect();

    for required in REQUIRED_SECTIONS {
        if !headings.contains(required) {
            errors.push(format!("missing required section: {required}"));
        }
    }

    let expected_order: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|s| present.contains(s))
        .collect();
    if present != expected_order {
        errors.push("required sections are present but out of order".to_string());
    }
}

fn check_metadata(body: &str, errors: &mut Vec<String>) {
    let has_field = |key: &str| {
        body.lines()
            .any(|l| l.trim_start().to_lowercase().starts_with(&format!("{key}:")))
    };
    if !has_field("plan_id") {
        errors.push("Plan Metadata: missing required field 'plan_id'".to_string());
    }
    if !has_field("role_owner") {
        errors.push("Plan Metadata: missing required field 'role_owner'".to_string());
    }
}

fn check_scope(body: &str, errors: &mut Vec<String>) {
    let bullets = body.lines().filter(|l| l.trim_start().starts_with("- ")).count();
    if bullets < 2 {
        errors.push("Scope & Constraints: requires at least 2 constraint bullets".to_string());
    }
}

fn check_path_allowlist(body: &str, errors: &mut Vec<String>) {
    for line in body.lines() {
        let Some(pattern) = line.trim_start().strip_prefix("- ") else {
            continue;
        };
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        if pattern.starts_with('/') {
            errors.push(format!("Path Allowlist: entry '{pattern}' must not start with '/'"));
        }
        if pattern.contains("..") {
            errors.push(format!("Path Allowlist: entry '{pattern}' must not contain '..'"));
        }
    }
}

fn check_forbidden_actions(body: &str, errors: &mut Vec<String>) {
    let bullets: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("- "))
        .collect();
    if bullets.is_empty() {
        errors.push("Forbidden Actions: requires at least one normative entry".to_string());
        return;
    }
    if !bullets.iter().any(|l| l.to_uppercase().contains("MUST NOT")) {
        errors.push("Forbidden Actions: at least one entry must use normative 'MUST NOT'".to_string());
    }
}

fn check_phases(body: &str, errors: &mut Vec<String>) {
    let ids: Vec<&str> = body
        .lines()
        .filter_map(|l| l.trim_start().strip_prefix("### "))
        .collect();
    if ids.is_empty() {
        errors.push("Phase Definitions: requires at least one PHASE_<ID> subsection".to_string());
        return;
    }
    for id in ids {
        let id = id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()) {
            errors.push(format!("Phase Definitions: '{id}' is not an UPPER_SNAKE phase id"));
        }
    }
}

fn check_rollback(body: &str, errors: &mut Vec<String>) {
    for label in ["Triggers:", "Procedure:", "Recovery:"] {
        if !body.lines().any(|l| l.trim_start().starts_with(label)) {
            errors.push(format!("Rollback/Failure Policy: missing '{label}' field"));
        }
    }
}

fn check_modal_vocabulary(content: &str, errors: &mut Vec<String>) {
    let lower = content.to_lowercase();
    for word in AMBIGUOUS_MODALS {
        if contains_word(&lower, word) {
            errors.push(format!("ambiguous modal vocabulary found: '{word}'"));
        }
    }
}

fn check_stub_markers(content: &str, errors: &mut Vec<String>) {
    let lower = content.to_lowercase();
    for marker in STUB_MARKERS {
        if contains_word(&lower, &marker.to_lowercase()) {
            errors.push(format!("stub marker found: '{marker}'"));
        }
    }
}

/// Case-folded, word-boundary-respecting substring search (both `haystack`
/// and `needle` are expected already lowercased).
fn contains_word(haystack: &str, needle: &str) -> bool {
    let is_boundary = |c: Option<char>| c.map(|c| !c.is_alphanumeric()).unwrap_or(true);
    let bytes = haystack.as_bytes();
    let needle_len = needle.len();
    if needle_len == 0 || needle_len > bytes.len() {
        return false;
    }
    for start in 0..=(bytes.len() - needle_len) {
        if &haystack[start..start + needle_len] == needle {
            let before = haystack[..start].chars().next_back();
            let after = haystack[start + needle_len..].chars().next();
            if is_boundary(before) && is_boundary(after) {
                return true;
            }
        }
    }
    false
}

/// Pure structural + vocabulary lint. Does not consult the filesystem.
pub fn lint(raw: &str) -> LintReport {
    let stripped = strip_header(raw);
    let hash = gate_audit::hash_str(&stripped);
    let mut errors = Vec::new();
    let warnings = Vec::new();

    let sections = tokenize_sections(&stripped);
    check_section_order(&sections, &mut errors);

    if let Some(body) = section_body(&sections, "Plan Metadata") {
        check_metadata(body, &mut errors);
    }
    if let Some(body) = section_body(&sections, "Scope & Constraints") {
        check_scope(body, &mut errors);
    }
    if let Some(body) = section_body(&sections, "Phase Definitions") {
        check_phases(body, &mut errors);
    }
    if let Some(body) = section_body(&sections, "Path Allowlist") {
        check_path_allowlist(body, &mut errors);
    }
    if let Some(body) = section_body(&sections, "Forbidden Actions") {
        check_forbidden_actions(body, &mut errors);
    }
    if let Some(body) = section_body(&sections, "Rollback/Failure Policy") {
        check_rollback(body, &mut errors);
    }

    check_modal_vocabulary(&stripped, &mut errors);
    check_stub_markers(&stripped, &mut errors);

    LintReport {
        passed: errors.is_empty(),
        errors,
        warnings,
        hash,
    }
}

/// Parse a header-stripped, lint-passed document into a [`Plan`] record.
/// Callers should `lint()` first and refuse to parse a failing document.
pub fn parse(stripped_content: &str, hash: String) -> Plan {
    let sections = tokenize_sections(stripped_content);

    let plan_id = section_body(&sections, "Plan Metadata").and_then(field_value("plan_id"));
    let plan_id = plan_id.filter(|v| !v.eq_ignore_ascii_case("none"));

    // Status is deliberately not part of the hashed content: it is tracked
    // by the plan registry's own status store (see registry.rs), so that
    // a status transition never changes a plan's content-addressed identity.
    let status = PlanStatus::Draft;

    let path_allowlist = section_body(&sections, "Path Allowlist")
        .map(parse_bullets)
        .unwrap_or_default();

    let forbidden_actions = section_body(&sections, "Forbidden Actions")
        .map(parse_bullets)
        .unwrap_or_default();

    let phases = section_body(&sections, "Phase Definitions")
        .map(parse_phases)
        .unwrap_or_default();

    let authorized_constructs = parse_authorized_constructs(stripped_content);

    Plan {
        hash,
        plan_id,
        status,
        path_allowlist,
        forbidden_actions,
        phases,
        authorized_constructs,
        content: stripped_content.to_string(),
    }
}

fn field_value(key: &'static str) -> impl Fn(&str) -> Option<String> {
    move |body: &str| {
        body.lines().find_map(|l| {
            let trimmed = l.trim_start();
            let lower = trimmed.to_lowercase();
            let prefix = format!("{key}:");
            if lower.starts_with(&prefix) {
                Some(trimmed[prefix.len()..].trim().to_string())
            } else {
                None
            }
        })
    }
}

fn parse_bullets(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|l| l.trim_start().strip_prefix("- "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_phases(body: &str) -> Vec<PhaseDefinition> {
    let mut phases = Vec::new();
    let mut current_id: Option<String> = None;
    let mut description = String::new();
    let mut commands = Vec::new();

    let flush = |id: &Option<String>, description: &str, commands: &[String], out: &mut Vec<PhaseDefinition>| {
        if let Some(id) = id {
            out.push(PhaseDefinition {
                id: id.clone(),
                description: description.trim().to_string(),
                verification_commands: commands.to_vec(),
            });
        }
    };

    for line in body.lines() {
        if let Some(id) = line.trim_start().strip_prefix("### ") {
            flush(&current_id, &description, &commands, &mut phases);
            current_id = Some(id.trim().to_string());
            description.clear();
            commands.clear();
            continue;
        }
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("Description:") {
            description.push_str(rest.trim());
        } else if let Some(rest) = trimmed.strip_prefix("Verification:") {
            let cmd = rest.trim();
            if !cmd.is_empty() {
                commands.push(cmd.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("- ") {
            commands.push(rest.trim().to_string());
        }
    }
    flush(&current_id, &description, &commands, &mut phases);
    phases
}

fn parse_authorized_constructs(content: &str) -> Vec<AuthorizedConstruct> {
    let mut out = Vec::new();
    let lines: Vec<&str> = content.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if let Some(id) = trimmed
            .strip_prefix("AUTHORIZED_")
            .and_then(|s| s.strip_suffix(':'))
        {
            let mut fields = std::collections::HashMap::new();
            let mut j = i + 1;
            while j < lines.len() {
                let l = lines[j].trim();
                if l.is_empty() || !lines[j].starts_with(char::is_whitespace) {
                    break;
                }
                if let Some((key, value)) = l.split_once(':') {
                    fields.insert(key.trim().to_string(), value.trim().to_string());
                }
                j += 1;
            }
            out.push(AuthorizedConstruct {
                id: id.to_string(),
                location: fields.get("location").cloned().unwrap_or_default(),
                reason: fields.get("reason").cloned().unwrap_or_default(),
                controls: fields.get("controls").cloned().unwrap_or_default(),
                removal_date: fields.get("removal_date").cloned().unwrap_or_default(),
                test_witness: fields.get("test_witness").cloned().unwrap_or_default(),
            });
            i = j;
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_plan_text() -> String {
        r#"<!--
tool: atlas-gate
-->
## Plan Metadata
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
    fn strip_header_removes_html_comment_block() {
        let text = "<!--\nheader\n-->\nbody";
        assert_eq!(strip_header(text), "body");
    }

    #[test]
    fn strip_header_is_noop_without_comment() {
        let text = "## Plan Metadata\nbody";
        assert_eq!(strip_header(text), text);
    }

    #[test]
    fn lint_passes_on_well_formed_plan() {
        let report = lint(&valid_plan_text());
        assert!(report.passed, "errors: {:?}", report.errors);
        assert_eq!(report.hash.len(), 64);
    }

    #[test]
    fn lint_is_deterministic() {
        let text = valid_plan_text();
        let a = lint(&text);
        let b = lint(&text);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.errors, b.errors);
    }

    #[test]
    fn lint_rejects_missing_section() {
        let text = valid_plan_text().replace("## Forbidden Actions\n- MUST NOT write outside src/\n\n", "");
        let report = lint(&text);
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("Forbidden Actions")));
    }

    #[test]
    fn lint_rejects_ambiguous_modal_vocabulary() {
        let text = valid_plan_text().replace("no network access", "should avoid network access");
        let report = lint(&text);
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("should")));
    }

    #[test]
    fn lint_rejects_stub_markers() {
        let text = valid_plan_text().replace("add the summary enforcement check", "TODO implement this");
        let report = lint(&text);
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("stub marker")));
    }

    #[test]
    fn lint_rejects_path_allowlist_traversal() {
        let text = valid_plan_text().replace("- src/**", "- ../escape/**");
        let report = lint(&text);
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("Path Allowlist")));
    }

    #[test]
    fn parse_extracts_metadata_and_scope() {
        let report = lint(&valid_plan_text());
        let stripped = strip_header(&valid_plan_text());
        let plan = parse(&stripped, report.hash);
        assert_eq!(plan.plan_id.as_deref(), Some("PLAN-1"));
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.path_allowlist, vec!["src/**".to_string()]);
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].id, "PHASE_ONE");
    }

    #[test]
    fn parse_reads_authorized_construct_blocks() {
        let text = format!(
            "{}\nAUTHORIZED_C3:\n  location: src/lib.rs:10\n  reason: tracked follow-up\n  controls: reviewed\n  removal_date: 2026-09-01\n  test_witness: tests::todo_is_tracked\n",
            valid_plan_text()
        );
        let stripped = strip_header(&text);
        let plan = parse(&stripped, "hash".to_string());
        assert_eq!(plan.authorized_constructs.len(), 1);
        assert_eq!(plan.authorized_constructs[0].id, "C3");
        assert_eq!(plan.authorized_constructs[0].location, "src/lib.rs:10");
    }
}
