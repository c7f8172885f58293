// session.rs — Session subcommands: smoke-test a workspace's session bootstrap.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use gate_session::{Role, SessionResolver};

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Begin a session against a workspace and print its session id.
    Begin {
        /// Workspace root (defaults to the CLI's --project-root).
        #[arg(long)]
        workspace_root: Option<PathBuf>,
        /// PLANNER or EXECUTOR.
        #[arg(long, default_value = "EXECUTOR")]
        role: String,
    },
}

pub fn execute(cmd: &SessionCommands, project_root: &Path) -> anyhow::Result<()> {
    match cmd {
        SessionCommands::Begin { workspace_root, role } => {
            let root = workspace_root.clone().unwrap_or_else(|| project_root.to_path_buf());
            let role = match role.to_ascii_uppercase().as_str() {
                "PLANNER" => Role::Planner,
                "EXECUTOR" => Role::Executor,
                other => anyhow::bail!("role must be PLANNER or EXECUTOR, got '{other}'"),
            };

            let mut resolver = SessionResolver::new();
            let session_id = resolver.begin(&root, role)?;
            println!("session_id: {session_id}");
            println!("role: {role}");
            println!("workspace_root: {}", resolver.session()?.workspace_root.display());
        }
    }

    Ok(())
}
