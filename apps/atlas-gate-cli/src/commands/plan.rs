// plan.rs — Plan subcommands: lint a plan document, list APPROVED plans.

use std::path::PathBuf;

use clap::Subcommand;
use gate_mcp::GatewayConfig;
use gate_policy::{linter, PlanRegistry};

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Lint a plan document without writing it to the plan store.
    Lint {
        /// Path to the plan document.
        file: PathBuf,
    },
    /// List every APPROVED plan hash in the workspace's plan store.
    List,
}

pub fn execute(cmd: &PlanCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    match cmd {
        PlanCommands::Lint { file } => {
            let content = std::fs::read_to_string(file)?;
            let report = linter::lint(&content);

            println!("hash: {}", report.hash);
            println!("passed: {}", report.passed);
            if !report.warnings.is_empty() {
                println!("warnings:");
                for warning in &report.warnings {
                    println!("  - {warning}");
                }
            }
            if !report.errors.is_empty() {
                println!("errors:");
                for error in &report.errors {
                    println!("  - {error}");
                }
                anyhow::bail!("plan failed lint");
            }
        }

        PlanCommands::List => {
            let plans_dir = config.workspace_root.join("docs").join("plans");
            let registry = PlanRegistry::new(plans_dir);
            let hashes = registry.list_plans()?;
            if hashes.is_empty() {
                println!("No APPROVED plans.");
            } else {
                for hash in hashes {
                    println!("{hash}");
                }
            }
        }
    }

    Ok(())
}
