//! Line-delimited JSON-RPC transport over stdio.
//!
//! Stdout carries protocol frames only; all logging goes to stderr so a
//! stray log line can never corrupt the stream.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::types::{JsonRpcRequest, JsonRpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{error, trace};

/// Transport seam so the server loop can be driven from tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Next request, or `None` on end of stream.
    async fn read_request(&self) -> Result<Option<JsonRpcRequest>>;
    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()>;
}

pub struct StdioTransport {
    reader: Mutex<BufReader<Stdin>>,
    writer: Mutex<Stdout>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            writer: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn read_request(&self) -> Result<Option<JsonRpcRequest>> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    let line = line.trim();
                    // Blank lines between frames are tolerated.
                    if line.is_empty() {
                        continue;
                    }
                    trace!("Received frame: {}", line);
                    return match serde_json::from_str::<JsonRpcRequest>(line) {
                        Ok(request) => Ok(Some(request)),
                        Err(e) => {
                            error!("Unparseable frame: {}", e);
                            Err(McpError::Protocol(ProtocolError::ParseError))
                        }
                    };
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    return Err(McpError::Io(e));
                }
            }
        }
    }

    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()> {
        let json = serde_json::to_string(response)?;
        let mut writer = self.writer.lock().await;
        trace!("Sending frame: {}", json);
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}
