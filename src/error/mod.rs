//! Error types for the ODBC MCP server.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.

use std::borrow::Cow;
use thiserror::Error;

/// Main error type for the ODBC MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

/// JSON-RPC 2.0 and MCP protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: invalid JSON")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(Cow<'static, str>),

    #[error("Internal error: {0}")]
    InternalError(Cow<'static, str>),

    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),
}

impl ProtocolError {
    /// Returns the JSON-RPC 2.0 error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::InternalError(_) => -32603,
            Self::Transport(_) => -32000,
        }
    }
}

/// Broker errors: everything the connection/query core can fail with.
///
/// One variant per failure kind so callers match on shape rather than parse
/// messages. Driver-reported text is preserved in the cause payloads for
/// diagnostics; credentials never appear in it.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection '{0}' is not defined in the configuration")]
    UnknownConnection(String),

    #[error("No default connection is configured and more than one connection exists")]
    NoDefaultConnection,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Write operations are not allowed on a read-only connection: {0}")]
    WriteNotAllowed(String),

    #[error("Query timed out after {0}s")]
    Timeout(u64),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),
}

impl DatabaseError {
    /// Stable kind tag carried in structured tool-error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownConnection(_) => "unknown_connection",
            Self::NoDefaultConnection => "no_default_connection",
            Self::ConnectionFailed(_) => "connection_error",
            Self::WriteNotAllowed(_) => "write_not_allowed",
            Self::Timeout(_) => "query_timeout",
            Self::QueryFailed(_) => "syntax_or_driver_error",
            Self::TableNotFound(_) => "table_not_found",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(Cow<'static, str>),
}

/// Result type alias for McpError.
pub type Result<T> = std::result::Result<T, McpError>;

/// Result type alias for DatabaseError.
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Result type alias for ProtocolError.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
