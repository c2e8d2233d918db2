//! MCP server exposing named ODBC connections as tools.
//!
//! Connections are declared in a config file, each with a read-only flag,
//! row limit, and query timeout. A tool-calling client gets six tools:
//! list-connections, list-available-dsns, test-connection, list-tables,
//! get-table-schema, and execute-query.
//!
//! # Example
//!
//! ```no_run
//! use odbc_mcp_server::{
//!     config::ServerConfig,
//!     protocol::McpServerBuilder,
//!     server::{McpHandler, ServerState},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load("connections.toml")?;
//!
//!     # #[cfg(feature = "odbc")]
//!     let state = Arc::new(
//!         ServerState::builder()
//!             .config(config)
//!             .driver(Arc::new(odbc_mcp_server::database::odbc::OdbcDriver::new()))
//!             .build()?,
//!     );
//!
//!     # #[cfg(feature = "odbc")]
//!     # {
//!     let handler = McpHandler::new(state);
//!     let server = McpServerBuilder::new()
//!         .handler(handler)
//!         .with_tools()
//!         .build()?;
//!
//!     server.run().await?;
//!     # }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod protocol;
pub mod security;
pub mod server;
pub mod tools;

pub use config::{ConnectionProfile, DriverFamily, ServerConfig, ServerSettings};
pub use database::{
    CatalogIntrospector, Driver, DriverSession, ProfileRegistry, QueryExecutor, QueryRequest,
    QueryResult, SessionManager,
};
pub use error::{DatabaseError, McpError, Result};
pub use protocol::{McpServer, McpServerBuilder};
pub use security::ReadOnlyGuard;
pub use server::{McpHandler, ServerState, ServerStateBuilder};
