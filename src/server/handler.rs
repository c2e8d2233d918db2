//! MCP request handler backed by the broker state.

use crate::error::{McpError, ProtocolResult, ToolError};
use crate::protocol::{
    CallToolParams, CallToolResult, Handler, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, MCP_VERSION, ServerCapabilities, ToolsCapability,
};
use crate::server::state::ServerState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct McpHandler {
    state: Arc<ServerState>,
}

impl McpHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    fn instructions(&self) -> String {
        let names: Vec<String> = self
            .state
            .profiles
            .list()
            .into_iter()
            .map(|p| p.name)
            .collect();
        format!(
            "ODBC MCP server exposing {} configured connection(s): {}. \
            Start with list-connections, then query with execute-query. \
            Inspect structure with list-tables and get-table-schema; \
            verify reachability with test-connection.",
            names.len(),
            names.join(", ")
        )
    }
}

#[async_trait]
impl Handler for McpHandler {
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult> {
        info!(
            "Initialize request from {} v{}",
            params.client_info.name, params.client_info.version
        );
        debug!("Client protocol version: {}", params.protocol_version);

        self.state.set_initialized(params.client_info);

        Ok(InitializeResult {
            protocol_version: MCP_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                logging: None,
            },
            server_info: Implementation {
                name: self.state.config.name.to_string(),
                version: self.state.config.version.to_string(),
            },
            instructions: Some(self.instructions()),
        })
    }

    async fn initialized(&self) -> ProtocolResult<()> {
        info!("Client confirmed initialization");
        Ok(())
    }

    async fn shutdown(&self) -> ProtocolResult<()> {
        info!("Shutdown request received, closing sessions");
        self.state.close_all_sessions().await;
        Ok(())
    }

    async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
        let tools = self.state.tools.list();
        debug!("Listing {} tools", tools.len());

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult> {
        debug!("Tool call: {}", params.name);

        match self.state.tools.execute(params).await {
            Ok(result) => Ok(result),
            Err(McpError::Tool(ToolError::NotFound(name))) => Err(
                crate::error::ProtocolError::InvalidParams(format!("Unknown tool: {name}").into()),
            ),
            Err(e) => {
                tracing::error!("Tool execution error: {}", e);
                Ok(CallToolResult::failure("internal_error", e.to_string()))
            }
        }
    }
}
