//! MCP protocol layer: wire types, dispatch, transport, server loop.

pub mod handler;
pub mod server;
pub mod transport;
pub mod types;

pub use handler::{Dispatcher, Handler};
pub use server::{Lifecycle, McpServer, McpServerBuilder};
pub use transport::{StdioTransport, Transport};
pub use types::*;
