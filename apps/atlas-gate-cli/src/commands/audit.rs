// audit.rs — Audit subcommands: verify, tail.

use clap::Subcommand;
use gate_audit::AuditLog;
use gate_mcp::GatewayConfig;

use super::SandboxIntegrityFailure;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log's hash chain integrity.
    Verify {
        /// Path to the audit log (defaults to .atlas-gate/audit.log).
        #[arg(long)]
        log: Option<String>,
    },
    /// Show recent audit entries.
    Tail {
        /// Path to the audit log (defaults to .atlas-gate/audit.log).
        #[arg(long)]
        log: Option<String>,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

fn resolve_log_path(log: &Option<String>, config: &GatewayConfig) -> std::path::PathBuf {
    log.as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| config.audit_log.clone())
}

pub fn execute(cmd: &AuditCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = resolve_log_path(log, config);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let report = AuditLog::verify(&path)?;
            if report.valid {
                let entries = AuditLog::read_all(&path)?;
                println!(
                    "Audit log verified: {} entr{} intact.",
                    entries.len(),
                    if entries.len() == 1 { "y" } else { "ies" }
                );
            } else {
                println!("INTEGRITY VIOLATION:");
                for failure in &report.failures {
                    println!("  {failure}");
                }
                return Err(anyhow::Error::new(SandboxIntegrityFailure)
                    .context("audit log failed chain verification"));
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = resolve_log_path(log, config);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let entries = AuditLog::read_all(&path)?;
            let start = entries.len().saturating_sub(*n);
            let recent = &entries[start..];

            if recent.is_empty() {
                println!("No audit entries.");
                return Ok(());
            }

            println!(
                "{:<26} {:<6} {:<9} {:<20} RESULT",
                "TIMESTAMP", "SEQ", "ROLE", "TOOL"
            );
            println!("{}", "-".repeat(80));
            for entry in recent {
                let result = match entry.result {
                    gate_audit::AuditResult::Ok => "ok".to_string(),
                    gate_audit::AuditResult::Error => format!(
                        "error ({})",
                        entry.error_code.as_deref().unwrap_or("?")
                    ),
                };
                println!(
                    "{:<26} {:<6} {:<9} {:<20} {}",
                    entry.ts.format("%Y-%m-%d %H:%M:%S"),
                    entry.seq,
                    entry.role,
                    entry.tool,
                    result,
                );
            }
        }
    }

    Ok(())
}
