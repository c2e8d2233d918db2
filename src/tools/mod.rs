//! MCP tool definitions and registry.

pub mod connection;
pub mod query;
pub mod registry;
pub mod schema;

pub use connection::{ListAvailableDsnsTool, ListConnectionsTool, TestConnectionTool};
pub use query::ExecuteQueryTool;
pub use registry::{ToolHandler, ToolRegistry};
pub use schema::{GetTableSchemaTool, ListTablesTool};

use crate::database::catalog::CatalogIntrospector;
use crate::database::executor::QueryExecutor;
use crate::database::registry::ProfileRegistry;
use crate::database::session::SessionManager;
use std::sync::Arc;

/// Create and register the full tool set.
pub fn create_registry(
    profiles: Arc<ProfileRegistry>,
    sessions: Arc<SessionManager>,
    executor: Arc<QueryExecutor>,
    catalog: Arc<CatalogIntrospector>,
) -> ToolRegistry {
    let registry = ToolRegistry::new();

    registry.register(ListConnectionsTool::new(Arc::clone(&profiles)));
    registry.register(ListAvailableDsnsTool::new(Arc::clone(&sessions)));
    registry.register(TestConnectionTool::new(Arc::clone(&profiles), sessions));

    registry.register(ExecuteQueryTool::new(Arc::clone(&profiles), executor));

    registry.register(ListTablesTool::new(Arc::clone(&profiles), Arc::clone(&catalog)));
    registry.register(GetTableSchemaTool::new(profiles, catalog));

    registry
}
