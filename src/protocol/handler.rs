//! Request handler seam and method dispatcher.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::*;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Handler trait the server-side implementation plugs into.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn initialize(&self, params: InitializeParams) -> ProtocolResult<InitializeResult>;

    async fn initialized(&self) -> ProtocolResult<()>;

    async fn shutdown(&self) -> ProtocolResult<()>;

    async fn list_tools(&self) -> ProtocolResult<ListToolsResult>;

    async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult>;

    async fn ping(&self) -> ProtocolResult<Value> {
        Ok(serde_json::json!({}))
    }
}

/// Routes requests by method name and converts results to responses.
pub struct Dispatcher<H: Handler> {
    handler: Arc<H>,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    #[instrument(skip(self, request), fields(method = %request.method))]
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Dispatching {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "initialized" | "notifications/initialized" => self.handle_initialized().await,
            "shutdown" => self.handle_shutdown().await,
            "ping" => self.handler.ping().await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            method => {
                warn!("Unknown method: {}", method);
                Err(ProtocolError::MethodNotFound(method.to_string()))
            }
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => {
                error!("Request failed: {}", e);
                JsonRpcResponse::error(request.id, JsonRpcError::new(e.code(), e.to_string()))
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> ProtocolResult<Value> {
        let params: InitializeParams = required_params(params)?;
        let result = self.handler.initialize(params).await?;
        to_value(result)
    }

    async fn handle_initialized(&self) -> ProtocolResult<Value> {
        self.handler.initialized().await?;
        Ok(Value::Null)
    }

    async fn handle_shutdown(&self) -> ProtocolResult<Value> {
        self.handler.shutdown().await?;
        Ok(Value::Null)
    }

    async fn handle_list_tools(&self) -> ProtocolResult<Value> {
        let result = self.handler.list_tools().await?;
        to_value(result)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> ProtocolResult<Value> {
        let params: CallToolParams = required_params(params)?;
        let result = self.handler.call_tool(params).await?;
        to_value(result)
    }
}

fn required_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> ProtocolResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?
        .ok_or_else(|| ProtocolError::InvalidParams("Missing params".into()))
}

fn to_value<T: serde::Serialize>(value: T) -> ProtocolResult<Value> {
    serde_json::to_value(value).map_err(|e| ProtocolError::InternalError(e.to_string().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockHandler {
        initialized: AtomicBool,
    }

    impl MockHandler {
        fn new() -> Self {
            Self {
                initialized: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Handler for MockHandler {
        async fn initialize(&self, _params: InitializeParams) -> ProtocolResult<InitializeResult> {
            Ok(InitializeResult {
                protocol_version: MCP_VERSION.into(),
                capabilities: ServerCapabilities::default(),
                server_info: Implementation {
                    name: "test".into(),
                    version: "1.0".into(),
                },
                instructions: None,
            })
        }

        async fn initialized(&self) -> ProtocolResult<()> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) -> ProtocolResult<()> {
            Ok(())
        }

        async fn list_tools(&self) -> ProtocolResult<ListToolsResult> {
            Ok(ListToolsResult {
                tools: vec![],
                next_cursor: None,
            })
        }

        async fn call_tool(&self, params: CallToolParams) -> ProtocolResult<CallToolResult> {
            Ok(CallToolResult::text(params.name))
        }
    }

    #[tokio::test]
    async fn test_dispatch_initialize() {
        let handler = Arc::new(MockHandler::new());
        let dispatcher = Dispatcher::new(handler);

        let request = JsonRpcRequest::new("initialize")
            .with_id(1)
            .with_params(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }));

        let response = dispatcher.dispatch(request).await;
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_initialized_notification_spelling() {
        let handler = Arc::new(MockHandler::new());
        let dispatcher = Dispatcher::new(handler.clone());

        let request = JsonRpcRequest::new("notifications/initialized");
        dispatcher.dispatch(request).await;
        assert!(handler.initialized.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let dispatcher = Dispatcher::new(Arc::new(MockHandler::new()));

        let request = JsonRpcRequest::new("resources/list").with_id(1);
        let response = dispatcher.dispatch(request).await;

        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_dispatch_call_tool_missing_params() {
        let dispatcher = Dispatcher::new(Arc::new(MockHandler::new()));

        let request = JsonRpcRequest::new("tools/call").with_id(2);
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }
}
