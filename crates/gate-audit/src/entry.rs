// entry.rs — The audit entry data model.
//
// An AuditEntry is one line in the append-only log. Entries form a chain:
// `prev_hash` links each entry to the `entry_hash` of the one before it
// (GENESIS for the first), so tampering with any entry breaks every
// entry_hash/prev_hash pair downstream of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of the tool invocation an entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Ok,
    Error,
}

/// An immutable, hash-chained audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub seq: u64,
    pub prev_hash: String,
    pub entry_hash: String,
    pub session_id: String,
    pub role: String,
    pub workspace_root: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    pub args_hash: String,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invariant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// True iff this entry was held in the pre-session buffer before being
    /// flushed on `begin_session`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub buffered: bool,
}

/// An entry awaiting assignment of `seq`/`prev_hash`/`entry_hash` by
/// [`crate::AuditLog::append`]. Everything the caller knows before the
/// chain position is decided lives here.
#[derive(Debug, Clone)]
pub struct AuditEntryDraft {
    pub session_id: String,
    pub role: String,
    pub workspace_root: String,
    pub tool: String,
    pub intent: Option<String>,
    pub plan_hash: Option<String>,
    pub phase_id: Option<String>,
    /// Raw (unredacted) arguments; redacted and hashed inside `append`.
    pub args: Value,
    pub result: AuditResult,
    pub error_code: Option<String>,
    pub invariant_id: Option<String>,
    pub result_hash: Option<String>,
    pub notes: Option<String>,
}

impl AuditEntryDraft {
    pub fn new(
        session_id: impl Into<String>,
        role: impl Into<String>,
        workspace_root: impl Into<String>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: role.into(),
            workspace_root: workspace_root.into(),
            tool: tool.into(),
            intent: None,
            plan_hash: None,
            phase_id: None,
            args: Value::Null,
            result: AuditResult::Ok,
            error_code: None,
            invariant_id: None,
            result_hash: None,
            notes: None,
        }
    }

    pub fn with_result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_plan(mut self, plan_hash: impl Into<String>, phase_id: impl Into<String>) -> Self {
        self.plan_hash = Some(plan_hash.into());
        self.phase_id = Some(phase_id.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_error(mut self, error_code: impl Into<String>, invariant_id: impl Into<String>) -> Self {
        self.result = AuditResult::Error;
        self.error_code = Some(error_code.into());
        self.invariant_id = Some(invariant_id.into());
        self
    }

    pub fn with_result_hash(mut self, hash: impl Into<String>) -> Self {
        self.result_hash = Some(hash.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_builder_sets_error_fields_and_flips_result() {
        let draft = AuditEntryDraft::new("s1", "EXECUTOR", "/w", "write_file")
            .with_error("INV_PATH_WITHIN_REPO", "INV_PATH_WITHIN_REPO");
        assert_eq!(draft.result, AuditResult::Error);
        assert_eq!(draft.error_code.as_deref(), Some("INV_PATH_WITHIN_REPO"));
    }

    #[test]
    fn result_serializes_as_snake_case() {
        let json = serde_json::to_string(&AuditResult::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }
}
