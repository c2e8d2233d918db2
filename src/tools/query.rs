//! Read-only query execution tool.

use crate::database::executor::{QueryExecutor, QueryRequest};
use crate::database::registry::ProfileRegistry;
use crate::database::result::{CellValue, PortableType, QueryResult};
use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};
use crate::tools::registry::{ToolHandler, argument_failure, db_failure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct ExecuteQueryArgs {
    query: String,
    #[serde(default)]
    connection: Option<String>,
    #[serde(default)]
    max_rows: Option<usize>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ColumnOutput {
    name: String,
    #[serde(rename = "type")]
    portable_type: PortableType,
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    connection: String,
    columns: Vec<ColumnOutput>,
    rows: Vec<Vec<CellValue>>,
    row_count: usize,
    truncated: bool,
    elapsed_ms: u64,
}

impl QueryOutput {
    fn new(connection: String, result: QueryResult) -> Self {
        Self {
            connection,
            columns: result
                .columns
                .into_iter()
                .map(|c| ColumnOutput {
                    name: c.name,
                    portable_type: c.portable_type,
                })
                .collect(),
            rows: result.rows,
            row_count: result.row_count,
            truncated: result.truncated,
            elapsed_ms: result.elapsed_ms,
        }
    }
}

pub struct ExecuteQueryTool {
    profiles: Arc<ProfileRegistry>,
    executor: Arc<QueryExecutor>,
}

impl ExecuteQueryTool {
    pub fn new(profiles: Arc<ProfileRegistry>, executor: Arc<QueryExecutor>) -> Self {
        Self { profiles, executor }
    }
}

#[async_trait]
impl ToolHandler for ExecuteQueryTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "execute-query".into(),
            description: Some(
                "Execute a SQL statement against a named connection and return the \
                result set. On read-only connections only SELECT, WITH, EXPLAIN, SHOW, \
                DESCRIBE and PRAGMA statements are accepted. Results are capped at the \
                connection's row limit; a truncated=true response means more rows \
                exist, so narrow the query rather than retrying it."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The SQL statement to execute"
                    },
                    "connection": {
                        "type": "string",
                        "description": "Connection name from list-connections (default: the configured default connection)"
                    },
                    "max_rows": {
                        "type": "integer",
                        "description": "Row cap for this call; cannot exceed the connection's configured limit",
                        "minimum": 1
                    },
                    "timeout_seconds": {
                        "type": "integer",
                        "description": "Time budget for this call; cannot exceed the connection's configured timeout",
                        "minimum": 1
                    }
                },
                "required": ["query"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "execute-query"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ExecuteQueryArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(argument_failure(e)),
        };

        let profile = match self.profiles.resolve_or_default(args.connection.as_deref()) {
            Ok(profile) => profile,
            Err(e) => return Ok(db_failure(&e)),
        };

        let mut request = QueryRequest::new(args.query);
        if let Some(max_rows) = args.max_rows {
            request = request.with_max_rows(max_rows);
        }
        if let Some(secs) = args.timeout_seconds {
            request = request.with_timeout(Duration::from_secs(secs));
        }

        match self.executor.execute(&profile, request).await {
            Ok(result) => Ok(CallToolResult::json(&QueryOutput::new(
                profile.name.clone(),
                result,
            ))),
            Err(e) => Ok(db_failure(&e)),
        }
    }
}
