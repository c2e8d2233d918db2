//! Tools: list-connections, list-available-dsns, test-connection.

use crate::database::driver::ServerInfo;
use crate::database::registry::ProfileRegistry;
use crate::database::session::SessionManager;
use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};
use crate::tools::registry::{ToolHandler, argument_failure, db_failure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct ListConnectionsTool {
    profiles: Arc<ProfileRegistry>,
}

impl ListConnectionsTool {
    pub fn new(profiles: Arc<ProfileRegistry>) -> Self {
        Self { profiles }
    }
}

#[derive(Debug, Serialize)]
struct ConnectionsOutput {
    connections: Vec<crate::database::registry::ProfileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_connection: Option<String>,
}

#[async_trait]
impl ToolHandler for ListConnectionsTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "list-connections".into(),
            description: Some(
                "List the named database connections this server is configured with. \
                Use one of these names as the 'connection' argument of the other tools."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    #[instrument(skip(self, _arguments), fields(tool = "list-connections"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        let output = ConnectionsOutput {
            connections: self.profiles.list(),
            default_connection: self.profiles.default_connection_name().map(str::to_owned),
        };
        Ok(CallToolResult::json(&output))
    }
}

pub struct ListAvailableDsnsTool {
    sessions: Arc<SessionManager>,
}

impl ListAvailableDsnsTool {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl ToolHandler for ListAvailableDsnsTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "list-available-dsns".into(),
            description: Some(
                "List the ODBC data source names registered with the system driver \
                manager. These are candidates for new connection configuration, not \
                necessarily connections this server can use."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    #[instrument(skip(self, _arguments), fields(tool = "list-available-dsns"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        match self.sessions.driver().list_data_sources().await {
            Ok(sources) => Ok(CallToolResult::json(&serde_json::json!({
                "data_sources": sources,
            }))),
            Err(e) => Ok(db_failure(&e)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestConnectionArgs {
    #[serde(default)]
    connection: Option<String>,
}

#[derive(Debug, Serialize)]
struct TestConnectionOutput {
    connection: String,
    success: bool,
    driver_family: &'static str,
    readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_info: Option<ServerInfo>,
}

pub struct TestConnectionTool {
    profiles: Arc<ProfileRegistry>,
    sessions: Arc<SessionManager>,
}

impl TestConnectionTool {
    pub fn new(profiles: Arc<ProfileRegistry>, sessions: Arc<SessionManager>) -> Self {
        Self { profiles, sessions }
    }
}

#[async_trait]
impl ToolHandler for TestConnectionTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "test-connection".into(),
            description: Some(
                "Open a throwaway session against a named connection to verify it \
                works, report what the server identifies as, then close it. Safe to \
                call at any time; never touches the cached sessions the other tools use."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "connection": {
                        "type": "string",
                        "description": "Connection name from list-connections (default: the configured default connection)"
                    }
                }
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "test-connection"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: TestConnectionArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(argument_failure(e)),
        };

        let profile = match self.profiles.resolve_or_default(args.connection.as_deref()) {
            Ok(profile) => profile,
            Err(e) => return Ok(db_failure(&e)),
        };

        let handle = match self.sessions.open_ephemeral(&profile).await {
            Ok(handle) => handle,
            Err(e) => return Ok(db_failure(&e)),
        };

        // Identification is best effort; a driver that cannot answer still
        // counts as a working connection.
        let server_info = handle.session().server_info().await.ok();
        handle.close().await;

        info!(connection = %profile.name, "Connection test succeeded");
        Ok(CallToolResult::json(&TestConnectionOutput {
            connection: profile.name.clone(),
            success: true,
            driver_family: profile.driver_family.as_str(),
            readonly: profile.readonly,
            server_info,
        }))
    }
}
