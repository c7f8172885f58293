// construct.rs — the Construct Detector (§4.3): scans proposed mutation
// content for forbidden non-real-code constructs (stubs, mocks, bypassed
// policy checks, simulated outcomes) before a write is allowed to land.

use regex::Regex;

use crate::error::ConstructError;
use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Hard,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub id: &'static str,
    pub severity: Severity,
    pub location: String,
    pub detail: String,
}

/// A registered structural family. Adding a new language means adding a
/// table entry below, not touching the scanning logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    EcmaBrace,
    RustBrace,
}

const FAMILY_TABLE: &[(&str, Family)] = &[
    ("js", Family::EcmaBrace),
    ("jsx", Family::EcmaBrace),
    ("ts", Family::EcmaBrace),
    ("tsx", Family::EcmaBrace),
    ("rs", Family::RustBrace),
];

fn family_for(path: &str) -> Option<Family> {
    let ext = path.rsplit('.').next()?;
    FAMILY_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, f)| *f)
}

/// (marker, construct id). Word-boundary-anchored, case-insensitive.
/// C3 markers are scanned against the *raw*, comment-inclusive content:
/// TODO/FIXME/HACK live in comments by definition, so excluding comments
/// would blind the detector to the exact construct it targets.
const COMMENT_MARKERS: &[(&str, &str)] = &[("todo", "C3"), ("fixme", "C3"), ("hack", "C3")];

/// Markers scanned against comment-stripped content, since flagging them
/// inside an explanatory comment (e.g. "this mocks upstream behavior")
/// would be a false positive.
const TEXTUAL_MARKERS: &[(&str, &str)] = &[
    ("mock", "C2"),
    ("fake", "C2"),
    ("stub", "C1"),
    ("placeholder", "C1"),
    ("simulate", "C8"),
    ("dry_run", "C8"),
    ("bypass", "C5"),
];

/// Injection-style heuristics checked regardless of comment/string context.
/// A hit inside a string literal is downgraded to MEDIUM per §4.3.
const INJECTION_PATTERNS: &[&str] = &["1=1", "or 1=1", "drop table", "rm -rf"];

/// Strip line and block comments for the given family so marker words
/// inside comments don't trigger a finding. Best-effort: does not attempt
/// full tokenization of string literals.
fn strip_comments(content: &str, family: Family) -> String {
    let (line_prefix, block) = match family {
        Family::EcmaBrace | Family::RustBrace => ("//", Some(("/*", "*/"))),
    };

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    loop {
        let line_at = rest.find(line_prefix);
        let block_at = block.and_then(|(open, _)| rest.find(open));

        match (line_at, block_at) {
            (None, None) => {
                out.push_str(rest);
                break;
            }
            (Some(l), None) => {
                out.push_str(&rest[..l]);
                match rest[l..].find('\n') {
                    Some(nl) => rest = &rest[l + nl..],
                    None => break,
                }
            }
            (None, Some(b)) => {
                let (open, close) = block.unwrap();
                out.push_str(&rest[..b]);
                match rest[b + open.len()..].find(close) {
                    Some(end) => rest = &rest[b + open.len() + end + close.len()..],
                    None => break,
                }
            }
            (Some(l), Some(b)) => {
                if l <= b {
                    out.push_str(&rest[..l]);
                    match rest[l..].find('\n') {
                        Some(nl) => rest = &rest[l + nl..],
                        None => break,
                    }
                } else {
                    let (open, close) = block.unwrap();
                    out.push_str(&rest[..b]);
                    match rest[b + open.len()..].find(close) {
                        Some(end) => rest = &rest[b + open.len() + end + close.len()..],
                        None => break,
                    }
                }
            }
        }
    }
    out
}

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

fn scan_textual(path: &str, content: &str, family: Option<Family>) -> Vec<Finding> {
    let searchable = match family {
        Some(f) => strip_comments(content, f),
        None => content.to_string(),
    };
    let lower = searchable.to_lowercase();
    let raw_lower = content.to_lowercase();

    let mut findings = Vec::new();
    for (marker, id) in TEXTUAL_MARKERS {
        if contains_word(&lower, marker) {
            findings.push(Finding {
                id,
                severity: Severity::Medium,
                location: path.to_string(),
                detail: format!("marker word '{marker}' found"),
            });
        }
    }
    for (marker, id) in COMMENT_MARKERS {
        if contains_word(&raw_lower, marker) {
            findings.push(Finding {
                id,
                severity: Severity::Medium,
                location: path.to_string(),
                detail: format!("marker word '{marker}' found"),
            });
        }
    }

    for pattern in INJECTION_PATTERNS {
        if raw_lower.contains(pattern) {
            findings.push(Finding {
                id: "C5",
                severity: Severity::Medium,
                location: path.to_string(),
                detail: format!("injection-pattern heuristic matched: '{pattern}'"),
            });
        }
    }

    findings
}

fn empty_fn_regex(family: Family) -> Regex {
    match family {
        Family::EcmaBrace => {
            Regex::new(r"(?:function\s+(\w+)|(\w+)\s*(?:=|:)\s*(?:async\s*)?\([^)]*\)\s*=>)\s*\([^)]*\)?\s*\{\s*\}").unwrap()
        }
        Family::RustBrace => Regex::new(r"fn\s+(\w+)\s*\([^)]*\)[^{;]*\{\s*\}").unwrap(),
    }
}

fn single_return_regex(family: Family) -> Regex {
    match family {
        Family::EcmaBrace => Regex::new(
            r"function\s+(\w+)\s*\(([^)]+)\)\s*\{\s*return\s+(null|undefined|true|false|0|""|\{\}|\[\])\s*;?\s*\}",
        )
        .unwrap(),
        Family::RustBrace => Regex::new(
            r"fn\s+(\w+)\s*\(([^)]+)\)[^{]*\{\s*(true|false|0|""|\{\}|\[\])\s*\}",
        )
        .unwrap(),
    }
}

fn empty_handler_regex(family: Family) -> Regex {
    match family {
        Family::EcmaBrace => Regex::new(r"catch\s*\([^)]*\)\s*\{\s*\}").unwrap(),
        Family::RustBrace => Regex::new(r"Err\([^)]*\)\s*=>\s*\{\s*\}").unwrap(),
    }
}

fn brace_balanced(content: &str) -> bool {
    let mut depth: i64 = 0;
    for c in content.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

fn scan_structural(path: &str, content: &str, family: Family) -> Result<Vec<Finding>, ConstructError> {
    if !brace_balanced(content) {
        return Err(ConstructError::AstAnalysisFailed {
            reason: format!("{path}: unbalanced braces, cannot structurally analyze"),
        });
    }

    let mut findings = Vec::new();

    for cap in empty_handler_regex(family).captures_iter(content) {
        let location = format!("{path}@{}", cap.get(0).map(|m| m.start()).unwrap_or(0));
        findings.push(Finding {
            id: "C2",
            severity: Severity::Hard,
            location,
            detail: "empty exception/error handler".to_string(),
        });
    }

    for cap in empty_fn_regex(family).captures_iter(content) {
        let name = cap
            .iter()
            .skip(1)
            .find_map(|g| g.map(|m| m.as_str()))
            .unwrap_or("<anonymous>");
        findings.push(Finding {
            id: "C1",
            severity: Severity::Hard,
            location: format!("{path}:{name}"),
            detail: "empty function body".to_string(),
        });
    }

    for cap in single_return_regex(family).captures_iter(content) {
        let name = cap.get(1).map(|m| m.as_str()).unwrap_or("<anonymous>");
        let params = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        let returned = cap.get(3).map(|m| m.as_str()).unwrap_or("");
        if !params.trim().is_empty() {
            if is_boolean_literal(returned) && is_auth_context(path, name) {
                findings.push(Finding {
                    id: "C5",
                    severity: Severity::Hard,
                    location: format!("{path}:{name}"),
                    detail: "unconditional boolean return in auth/policy context ignores its parameters"
                        .to_string(),
                });
            } else {
                findings.push(Finding {
                    id: "C4",
                    severity: Severity::Medium,
                    location: format!("{path}:{name}"),
                    detail: "function ignores its parameters and returns a constant".to_string(),
                });
            }
        }
    }

    Ok(findings)
}

fn is_boolean_literal(s: &str) -> bool {
    s == "true" || s == "false"
}

/// Heuristic for "auth/policy context" per §4.3's C5 rule: the function
/// name or its target path names authorization/access-control concerns.
fn is_auth_context(path: &str, name: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "auth", "policy", "permission", "access", "allow", "grant", "authoriz", "acl",
    ];
    let path_lower = path.to_lowercase();
    let name_lower = name.to_lowercase();
    KEYWORDS
        .iter()
        .any(|k| path_lower.contains(k) || name_lower.contains(k))
}

/// Scan `content` destined for `path`. `plan` is consulted for
/// `AUTHORIZED_C<N>` exemptions on MEDIUM findings. HARD findings are never
/// exemptible.
pub fn scan(path: &str, content: &str, plan: &Plan) -> Result<(), ConstructError> {
    let family = family_for(path);

    let mut findings = scan_textual(path, content, family);
    if let Some(family) = family {
        findings.extend(scan_structural(path, content, family)?);
    }

    for finding in findings {
        match finding.severity {
            Severity::Hard => {
                return Err(ConstructError::HardBlock {
                    id: finding.id,
                    location: finding.location,
                    detail: finding.detail,
                });
            }
            Severity::Medium => {
                if plan.authorization_for(finding.id, &finding.location).is_none() {
                    return Err(ConstructError::AuthorizationRequired {
                        id: finding.id,
                        location: finding.location,
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{AuthorizedConstruct, PlanStatus};

    fn empty_plan() -> Plan {
        Plan {
            hash: "h".to_string(),
            plan_id: Some("PLAN-1".to_string()),
            status: PlanStatus::Approved,
            path_allowlist: vec!["src/**".to_string()],
            forbidden_actions: vec![],
            phases: vec![],
            authorized_constructs: vec![],
            content: String::new(),
        }
    }

    #[test]
    fn clean_rust_file_passes() {
        let plan = empty_plan();
        let content = "pub fn add(a: i32, b: i32) -> i32 { a + b }\n";
        assert!(scan("src/math.rs", content, &plan).is_ok());
    }

    #[test]
    fn todo_marker_requires_authorization() {
        let plan = empty_plan();
        let content = "// TODO: finish this\npub fn add(a: i32, b: i32) -> i32 { a + b }\n";
        let err = scan("src/math.rs", content, &plan).unwrap_err();
        assert!(matches!(err, ConstructError::AuthorizationRequired { id: "C3", .. }));
    }

    #[test]
    fn todo_in_comment_is_authorizable() {
        let mut plan = empty_plan();
        plan.authorized_constructs.push(AuthorizedConstruct {
            id: "C3".to_string(),
            location: "src/math.rs".to_string(),
            reason: "tracked follow-up".to_string(),
            controls: "reviewed".to_string(),
            removal_date: "2026-09-01".to_string(),
            test_witness: "tests::math_todo".to_string(),
        });
        let content = "// TODO: finish this\npub fn add(a: i32, b: i32) -> i32 { a + b }\n";
        assert!(scan("src/math.rs", content, &plan).is_ok());
    }

    #[test]
    fn empty_rust_error_handler_is_hard_block() {
        let plan = empty_plan();
        let content = "match result {\n    Ok(v) => v,\n    Err(_) => {}\n}\n";
        let err = scan("src/handler.rs", content, &plan).unwrap_err();
        assert!(matches!(err, ConstructError::HardBlock { id: "C2", .. }));
    }

    #[test]
    fn hardcoded_return_with_params_is_flagged() {
        let plan = empty_plan();
        let content = "fn total(count: i32, price: i32) -> i32 { 0 }\n";
        let err = scan("src/billing.rs", content, &plan).unwrap_err();
        assert!(matches!(err, ConstructError::AuthorizationRequired { id: "C4", .. }));
    }

    #[test]
    fn empty_function_body_is_hard_block() {
        let plan = empty_plan();
        let content = "fn add(a: i32, b: i32) -> i32 {}\n";
        let err = scan("src/math.rs", content, &plan).unwrap_err();
        assert!(matches!(err, ConstructError::HardBlock { id: "C1", .. }));
    }

    #[test]
    fn auth_bypass_return_is_hard_block_c5() {
        let plan = empty_plan();
        let content = "function check(u){ return true; }\n";
        let err = scan("src/auth.js", content, &plan).unwrap_err();
        assert!(matches!(err, ConstructError::HardBlock { id: "C5", .. }));
    }

    #[test]
    fn unbalanced_braces_fail_ast_analysis() {
        let plan = empty_plan();
        let content = "fn broken( {\n";
        let err = scan("src/broken.rs", content, &plan).unwrap_err();
        assert!(matches!(err, ConstructError::AstAnalysisFailed { .. }));
    }

    #[test]
    fn unregistered_extension_skips_structural_layer() {
        let plan = empty_plan();
        let content = "fn broken( {\n";
        assert!(scan("docs/notes.md", content, &plan).is_ok());
    }
}
