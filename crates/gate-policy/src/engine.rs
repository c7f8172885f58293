// engine.rs — the Write-Time Policy Engine (§4.6): the gauntlet every
// write request passes through, in order, fail-closed at every step.

use std::process::Command;
use std::time::{Duration, Instant};

use gate_audit::{AuditEntry, AuditEntryDraft, AuditLog, AuditResult};
use gate_session::{PathKind, Role, SessionResolver};
use serde_json::json;

use crate::construct;
use crate::error::{PlanError, PolicyError};
use crate::exemption::ExemptPaths;
use crate::intent;
use crate::registry::PlanRegistry;

/// Optional, plan-declared preflight verification. Disabled by default in
/// tests/embedded use; the dispatcher turns it on for real executor writes.
#[derive(Debug, Clone)]
pub struct PolicyEngineConfig {
    pub run_preflight: bool,
    pub preflight_timeout: Duration,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            run_preflight: false,
            preflight_timeout: Duration::from_secs(120),
        }
    }
}

/// The body of a proposed write: either full replacement content or a
/// unified diff to apply against the current file.
#[derive(Debug, Clone)]
pub enum WriteBody {
    Content(String),
    Patch(String),
}

/// A single write request as it arrives at the policy engine, after the
/// dispatcher has already checked session/prompt gates at the tool-surface
/// level (the engine re-checks them — fail-closed never trusts the caller).
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub path: String,
    pub plan_hash: String,
    pub plan_id: Option<String>,
    pub phase_id: String,
    pub body: WriteBody,
    /// Optimistic concurrency token: if set, must match the current file's
    /// content hash or the write is refused.
    pub previous_hash: Option<String>,
}

pub struct WriteOutcome {
    pub result_hash: String,
    pub audit_entry: AuditEntry,
}

pub struct WritePolicyEngine {
    registry: PlanRegistry,
    exempt_paths: ExemptPaths,
    config: PolicyEngineConfig,
}

impl WritePolicyEngine {
    pub fn new(registry: PlanRegistry, exempt_paths: ExemptPaths, config: PolicyEngineConfig) -> Self {
        Self {
            registry,
            exempt_paths,
            config,
        }
    }

    pub fn registry(&self) -> &PlanRegistry {
        &self.registry
    }

    /// Run the full gauntlet for `request`. On any refusal, appends an
    /// error audit entry and returns the triggering [`PolicyError`]; the
    /// filesystem is left untouched. On success, appends an `ok` audit
    /// entry with the written content's hash as `result_hash`.
    pub fn execute_write(
        &self,
        resolver: &SessionResolver,
        prompt_read: bool,
        audit: &mut AuditLog,
        request: WriteRequest,
    ) -> Result<WriteOutcome, PolicyError> {
        match self.try_execute_write(resolver, prompt_read, &request) {
            Ok((absolute_path, content, plan_hash, phase_id)) => {
                let result_hash = gate_audit::hash_str(&content);
                let draft = AuditEntryDraft::new(
                    session_id_string(resolver),
                    role_string(resolver),
                    workspace_root_string(resolver),
                    "write_file",
                )
                .with_args(json!({ "path": request.path }))
                .with_plan(plan_hash, phase_id)
                .with_result(AuditResult::Ok)
                .with_result_hash(result_hash.clone());
                let entry = audit.append(draft)?;
                tracing::info!(path = %absolute_path.display(), "write applied");
                Ok(WriteOutcome {
                    result_hash,
                    audit_entry: entry,
                })
            }
            Err(err) => {
                let refusal = err.refusal();
                let draft = AuditEntryDraft::new(
                    session_id_string(resolver),
                    role_string(resolver),
                    workspace_root_string(resolver),
                    "write_file",
                )
                .with_args(json!({ "path": request.path }))
                .with_error(refusal.code, refusal.invariant_id)
                .with_notes(refusal.message);
                audit.append(draft)?;
                Err(err)
            }
        }
    }

    /// The gauntlet steps that can fail before a write is durable. Returns
    /// the resolved path, final content, and binding info for the audit
    /// entry on success.
    fn try_execute_write(
        &self,
        resolver: &SessionResolver,
        prompt_read: bool,
        request: &WriteRequest,
    ) -> Result<(std::path::PathBuf, String, String, String), PolicyError> {
        // 1. Session gate.
        let session = resolver.session()?;
        session
            .require_role(Role::Executor)
            .map_err(|_| PolicyError::RoleMismatch {
                expected: "EXECUTOR".to_string(),
                actual: session.role.to_string(),
            })?;

        // 2. Prompt gate.
        if !prompt_read {
            return Err(PolicyError::PromptGateLocked);
        }

        // 3. Path resolution.
        let absolute = resolver.resolve(&request.path, PathKind::Write)?;
        let workspace_relative = absolute
            .strip_prefix(&session.workspace_root)
            .unwrap_or(&absolute)
            .to_string_lossy()
            .replace('\\', "/");

        // 4. Plan binding.
        let plan = self
            .registry
            .enforce(&request.plan_hash, request.plan_id.as_deref())?;

        // 5. Path allowlist.
        if !plan.allows_path(&workspace_relative) {
            return Err(PolicyError::Plan(PlanError::PathNotAllowed {
                path: workspace_relative.clone(),
                plan_hash: plan.hash.clone(),
            }));
        }

        // 6. Optimistic concurrency.
        let current_content = std::fs::read_to_string(&absolute).unwrap_or_default();
        if let Some(expected) = &request.previous_hash {
            let current_hash = gate_audit::hash_str(&current_content);
            if &current_hash != expected {
                return Err(PolicyError::ConcurrentModification);
            }
        }

        // 9. Patch materialization happens before intent/construct scans
        // since those evaluate the *resulting* content (§4.6 step 8 reads
        // "content (or patch result)").
        let final_content = match &request.body {
            WriteBody::Content(c) => c.clone(),
            WriteBody::Patch(patch) => apply_unified_diff(&current_content, patch)
                .map_err(|reason| PolicyError::PatchApplyFailed { reason })?,
        };

        // 7. Intent validation.
        let resolver_ref = resolver;
        intent::validate(
            &workspace_relative,
            |intent_path| {
                resolver_ref
                    .resolve(intent_path, PathKind::Read)
                    .ok()
                    .and_then(|p| std::fs::read_to_string(p).ok())
            },
            &plan.hash,
            &request.phase_id,
            &self.exempt_paths,
        )?;

        // 8. Construct scan.
        construct::scan(&workspace_relative, &final_content, &plan)?;

        // 10. Preflight.
        if self.config.run_preflight {
            if let Some(phase) = plan.phase(&request.phase_id) {
                for command in &phase.verification_commands {
                    run_preflight(command, self.config.preflight_timeout)?;
                }
            }
        }

        // 11. Write: temp-then-rename, inside the workspace root.
        write_atomic(&absolute, &final_content).map_err(PolicyError::Io)?;

        Ok((absolute, final_content, plan.hash.clone(), request.phase_id.clone()))
    }
}

fn session_id_string(resolver: &SessionResolver) -> String {
    resolver
        .session()
        .map(|s| s.session_id.to_string())
        .unwrap_or_default()
}

fn role_string(resolver: &SessionResolver) -> String {
    resolver
        .session()
        .map(|s| s.role.to_string())
        .unwrap_or_default()
}

fn workspace_root_string(resolver: &SessionResolver) -> String {
    resolver
        .session()
        .map(|s| s.workspace_root.display().to_string())
        .unwrap_or_default()
}

/// Write `content` to `path` by writing to a sibling temp file and
/// renaming it into place, so a crash mid-write never leaves a partial
/// file at `path`.
fn write_atomic(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp_name = std::ffi::OsString::from(path.file_name().unwrap_or_default());
    tmp_name.push(".atlas-gate.tmp");
    let tmp_path = parent.join(tmp_name);
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Apply a minimal unified diff (one or more `@@ -a,b +c,d @@` hunks) to
/// `original`. Rejects on any context-line mismatch ("fuzz").
fn apply_unified_diff(original: &str, patch: &str) -> Result<String, String> {
    let original_lines: Vec<&str> = original.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    let mut lines = patch.lines().peekable();
    while let Some(line) = lines.next() {
        if !line.starts_with("@@") {
            continue;
        }
        let header = line
            .trim_start_matches("@@")
            .trim_end_matches("@@")
            .trim();
        let old_start = header
            .split_whitespace()
            .find(|p| p.starts_with('-'))
            .and_then(|p| p.trim_start_matches('-').split(',').next())
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| format!("malformed hunk header: {line}"))?;

        let hunk_start = old_start.saturating_sub(1);
        if hunk_start < cursor {
            return Err(format!("overlapping or out-of-order hunk at {line}"));
        }
        out.extend(original_lines[cursor..hunk_start].iter().map(|s| s.to_string()));
        cursor = hunk_start;

        while let Some(&next) = lines.peek() {
            if next.starts_with("@@") {
                break;
            }
            let body_line = lines.next().unwrap();
            if let Some(rest) = body_line.strip_prefix(' ') {
                if original_lines.get(cursor) != Some(&rest) {
                    return Err(format!("context mismatch at line {}", cursor + 1));
                }
                out.push(rest.to_string());
                cursor += 1;
            } else if let Some(rest) = body_line.strip_prefix('-') {
                if original_lines.get(cursor) != Some(&rest) {
                    return Err(format!("deletion mismatch at line {}", cursor + 1));
                }
                cursor += 1;
            } else if let Some(rest) = body_line.strip_prefix('+') {
                out.push(rest.to_string());
            } else if body_line.starts_with('\\') {
                // "\ No newline at end of file" — no content effect.
            } else if body_line.trim().is_empty() {
                out.push(String::new());
                cursor += 1;
            } else {
                return Err(format!("unrecognized patch line: {body_line}"));
            }
        }
    }
    out.extend(original_lines[cursor..].iter().map(|s| s.to_string()));

    let mut result = out.join("\n");
    if original.ends_with('\n') || original.is_empty() {
        result.push('\n');
    }
    Ok(result)
}

fn run_preflight(command: &str, timeout: Duration) -> Result<(), PolicyError> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Ok(());
    };
    let mut child = Command::new(program)
        .args(parts)
        .spawn()
        .map_err(|e| PolicyError::PreflightFailed {
            command: command.to_string(),
            status: e.raw_os_error().unwrap_or(-1),
        })?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                if code != 0 {
                    return Err(PolicyError::PreflightFailed {
                        command: command.to_string(),
                        status: code,
                    });
                }
                return Ok(());
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    return Err(PolicyError::PreflightTimeout {
                        command: command.to_string(),
                    });
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => {
                return Err(PolicyError::PreflightFailed {
                    command: command.to_string(),
                    status: -1,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_unified_diff_replaces_single_line() {
        let original = "one\ntwo\nthree\n";
        let patch = "@@ -2,1 +2,1 @@\n-two\n+TWO\n";
        let result = apply_unified_diff(original, patch).unwrap();
        assert_eq!(result, "one\nTWO\nthree\n");
    }

    #[test]
    fn apply_unified_diff_rejects_context_mismatch() {
        let original = "one\ntwo\nthree\n";
        let patch = "@@ -2,1 +2,1 @@\n-WRONG\n+TWO\n";
        assert!(apply_unified_diff(original, patch).is_err());
    }

    #[test]
    fn apply_unified_diff_appends_line() {
        let original = "one\ntwo\n";
        let patch = "@@ -2,1 +2,2 @@\n two\n+three\n";
        let result = apply_unified_diff(original, patch).unwrap();
        assert_eq!(result, "one\ntwo\nthree\n");
    }
}
