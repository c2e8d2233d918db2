//! MCP server binary entry point.

use anyhow::Result;
use odbc_mcp_server::{
    config::ServerConfig,
    protocol::McpServerBuilder,
    server::{McpHandler, ServerState},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config_path = config_path();
    let config = ServerConfig::load(&config_path)?;
    info!(
        path = %config_path,
        connections = config.profiles.len(),
        "Configuration loaded"
    );

    let state = Arc::new(
        ServerState::builder()
            .config(config)
            .driver(make_driver()?)
            .build()?,
    );

    info!("Server state initialized with {} tools", state.tools.len());

    let handler = McpHandler::new(Arc::clone(&state));
    let server = McpServerBuilder::new()
        .handler(handler)
        .name(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .with_tools()
        .build()?;

    info!("MCP server ready on stdio");
    server.run().await?;

    state.close_all_sessions().await;
    info!("Server shutdown complete");
    Ok(())
}

/// First CLI argument, then `ODBC_MCP_CONFIG`, then `connections.toml`.
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ODBC_MCP_CONFIG").ok())
        .unwrap_or_else(|| "connections.toml".to_string())
}

#[cfg(feature = "odbc")]
fn make_driver() -> Result<Arc<dyn odbc_mcp_server::database::Driver>> {
    Ok(Arc::new(odbc_mcp_server::database::odbc::OdbcDriver::new()))
}

#[cfg(not(feature = "odbc"))]
fn make_driver() -> Result<Arc<dyn odbc_mcp_server::database::Driver>> {
    anyhow::bail!("this binary was built without the 'odbc' feature; rebuild with --features odbc")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("odbc_mcp_server=info,warn"));

    // Structured logs go to stderr; stdout carries the MCP protocol.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
