// serve.rs — Start the MCP server on stdio.

use std::path::Path;

use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use gate_mcp::{AtlasGateServer, GatewayConfig};

pub fn execute(project_root: &Path) -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with MCP on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gate_mcp=info".parse()?)
                .add_directive("gate_policy=info".parse()?)
                .add_directive("atlas_gate_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!(root = %project_root.display(), "starting governance gateway MCP server");

    let config = GatewayConfig::load(project_root);
    let server = AtlasGateServer::new(config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let service = server
            .serve(rmcp::transport::stdio())
            .await
            .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;
        service.waiting().await?;
        Ok::<(), anyhow::Error>(())
    })
}
