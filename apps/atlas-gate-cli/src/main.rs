//! # atlas-gate-cli
//!
//! Command-line interface for the governance gateway.
//!
//! - `atlas-gate serve` — start the MCP server on stdio
//! - `atlas-gate audit verify/tail` — inspect the tamper-evident audit trail
//! - `atlas-gate plan lint/list` — lint plan documents and list APPROVED plans
//! - `atlas-gate session begin` — smoke-test a workspace's session bootstrap

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gate_mcp::GatewayConfig;

/// Governance gateway CLI.
#[derive(Parser)]
#[command(name = "atlas-gate", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio.
    Serve,
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Lint and list plan documents.
    Plan {
        #[command(subcommand)]
        command: commands::plan::PlanCommands,
    },
    /// Begin a session against a workspace.
    Session {
        #[command(subcommand)]
        command: commands::session::SessionCommands,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = GatewayConfig::load(&project_root);

    let result = match &cli.command {
        Commands::Serve => commands::serve::execute(&project_root),
        Commands::Audit { command } => commands::audit::execute(command, &config),
        Commands::Plan { command } => commands::plan::execute(command, &config),
        Commands::Session { command } => commands::session::execute(command, &project_root),
    };

    match result {
        Ok(()) => std::process::ExitCode::from(0),
        Err(err) if commands::is_integrity_failure(&err) => {
            eprintln!("error: {err:?}");
            std::process::ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err:?}");
            std::process::ExitCode::from(1)
        }
    }
}
