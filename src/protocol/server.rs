//! Server loop with lifecycle tracking.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::handler::{Dispatcher, Handler};
use crate::protocol::transport::{StdioTransport, Transport};
use crate::protocol::types::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Where the server is in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    /// Initialize received, awaiting the initialized notification.
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

pub struct McpServer<H: Handler> {
    info: Implementation,
    capabilities: ServerCapabilities,
    handler: Arc<H>,
    lifecycle: Arc<RwLock<Lifecycle>>,
    running: AtomicBool,
}

impl<H: Handler> McpServer<H> {
    pub fn new(handler: H, info: Implementation, capabilities: ServerCapabilities) -> Self {
        Self {
            info,
            capabilities,
            handler: Arc::new(handler),
            lifecycle: Arc::new(RwLock::new(Lifecycle::Created)),
            running: AtomicBool::new(false),
        }
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serve on stdin/stdout until EOF or shutdown.
    #[instrument(skip(self), fields(server = %self.info.name))]
    pub async fn run(self) -> Result<()> {
        let transport = Arc::new(StdioTransport::new());
        self.run_with_transport(transport).await
    }

    pub async fn run_with_transport<T: Transport + 'static>(self, transport: Arc<T>) -> Result<()> {
        info!("Starting {} v{}", self.info.name, self.info.version);
        self.running.store(true, Ordering::SeqCst);

        let dispatcher = Dispatcher::new(Arc::clone(&self.handler));

        while self.running.load(Ordering::SeqCst) {
            let request = match transport.read_request().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("EOF on stdin, shutting down");
                    break;
                }
                Err(McpError::Protocol(ProtocolError::ParseError)) => {
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    if let Err(e) = transport.write_response(&response).await {
                        error!("Failed to send parse error response: {}", e);
                    }
                    continue;
                }
                Err(e) => {
                    error!("Transport error: {}", e);
                    break;
                }
            };

            let is_notification = request.is_notification();
            let method = request.method.clone();
            self.advance_lifecycle(&method).await;

            let response = dispatcher.dispatch(request).await;

            if !is_notification {
                if let Err(e) = transport.write_response(&response).await {
                    error!("Failed to send response: {}", e);
                }
            } else if response.error.is_some() {
                warn!(method, "Notification handling failed");
            }

            if method == "shutdown" {
                info!("Shutdown requested");
                self.running.store(false, Ordering::SeqCst);
            }
        }

        *self.lifecycle.write().await = Lifecycle::Stopped;
        info!("Server stopped");
        Ok(())
    }

    async fn advance_lifecycle(&self, method: &str) {
        let mut lifecycle = self.lifecycle.write().await;
        match method {
            "initialize" => {
                if *lifecycle == Lifecycle::Created {
                    *lifecycle = Lifecycle::Initializing;
                }
            }
            "initialized" | "notifications/initialized" => {
                if *lifecycle == Lifecycle::Initializing {
                    *lifecycle = Lifecycle::Running;
                    info!("Server initialized");
                }
            }
            "shutdown" => {
                *lifecycle = Lifecycle::ShuttingDown;
            }
            _ => {}
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct McpServerBuilder<H: Handler> {
    handler: Option<H>,
    name: String,
    version: String,
    capabilities: ServerCapabilities,
}

impl<H: Handler> McpServerBuilder<H> {
    pub fn new() -> Self {
        Self {
            handler: None,
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            capabilities: ServerCapabilities::default(),
        }
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_tools(mut self) -> Self {
        self.capabilities.tools = Some(ToolsCapability {
            list_changed: Some(false),
        });
        self
    }

    pub fn build(self) -> Result<McpServer<H>> {
        let handler = self.handler.ok_or_else(|| McpError::Internal {
            message: "Handler is required".into(),
        })?;

        Ok(McpServer::new(
            handler,
            Implementation {
                name: self.name,
                version: self.version,
            },
            self.capabilities,
        ))
    }
}

impl<H: Handler> Default for McpServerBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}
