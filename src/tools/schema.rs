//! Schema inspection tools: list-tables, get-table-schema.

use crate::database::catalog::CatalogIntrospector;
use crate::database::registry::ProfileRegistry;
use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};
use crate::tools::registry::{ToolHandler, argument_failure, db_failure};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct ListTablesArgs {
    #[serde(default)]
    connection: Option<String>,
    #[serde(default)]
    filter: Option<String>,
}

pub struct ListTablesTool {
    profiles: Arc<ProfileRegistry>,
    catalog: Arc<CatalogIntrospector>,
}

impl ListTablesTool {
    pub fn new(profiles: Arc<ProfileRegistry>, catalog: Arc<CatalogIntrospector>) -> Self {
        Self { profiles, catalog }
    }
}

#[async_trait]
impl ToolHandler for ListTablesTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "list-tables".into(),
            description: Some(
                "List the tables and views visible through a named connection. \
                Optionally filter by a case-insensitive substring of the table name."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "connection": {
                        "type": "string",
                        "description": "Connection name from list-connections (default: the configured default connection)"
                    },
                    "filter": {
                        "type": "string",
                        "description": "Substring to match against table names (case-insensitive)"
                    }
                }
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "list-tables"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ListTablesArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(argument_failure(e)),
        };

        let profile = match self.profiles.resolve_or_default(args.connection.as_deref()) {
            Ok(profile) => profile,
            Err(e) => return Ok(db_failure(&e)),
        };

        let tables = match self.catalog.list_tables(&profile).await {
            Ok(tables) => tables,
            Err(e) => return Ok(db_failure(&e)),
        };

        let tables = match &args.filter {
            Some(filter) => {
                let needle = filter.to_lowercase();
                tables
                    .into_iter()
                    .filter(|t| t.name.to_lowercase().contains(&needle))
                    .collect()
            }
            None => tables,
        };

        Ok(CallToolResult::json(&serde_json::json!({
            "connection": profile.name,
            "tables": tables,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct GetTableSchemaArgs {
    table: String,
    #[serde(default)]
    connection: Option<String>,
}

pub struct GetTableSchemaTool {
    profiles: Arc<ProfileRegistry>,
    catalog: Arc<CatalogIntrospector>,
}

impl GetTableSchemaTool {
    pub fn new(profiles: Arc<ProfileRegistry>, catalog: Arc<CatalogIntrospector>) -> Self {
        Self { profiles, catalog }
    }
}

#[async_trait]
impl ToolHandler for GetTableSchemaTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "get-table-schema".into(),
            description: Some(
                "Describe the columns of a table: name, declared type, nullability \
                and position. Accepts schema-qualified names such as 'dbo.Customers'."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": "Table name, optionally schema-qualified"
                    },
                    "connection": {
                        "type": "string",
                        "description": "Connection name from list-connections (default: the configured default connection)"
                    }
                },
                "required": ["table"]
            }),
        }
    }

    #[instrument(skip(self, arguments), fields(tool = "get-table-schema"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: GetTableSchemaArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(argument_failure(e)),
        };

        let profile = match self.profiles.resolve_or_default(args.connection.as_deref()) {
            Ok(profile) => profile,
            Err(e) => return Ok(db_failure(&e)),
        };

        match self.catalog.table_schema(&profile, &args.table).await {
            Ok(columns) => Ok(CallToolResult::json(&serde_json::json!({
                "connection": profile.name,
                "table": args.table,
                "columns": columns,
            }))),
            Err(e) => Ok(db_failure(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::database::driver::Driver;
    use crate::database::fake::{FakeDriver, FakeTable};
    use crate::database::session::SessionManager;
    use crate::protocol::ToolContent;

    fn result_json(result: &CallToolResult) -> Value {
        let ToolContent::Text { text } = &result.content[0];
        serde_json::from_str(text).unwrap()
    }

    fn setup() -> (ListTablesTool, GetTableSchemaTool) {
        let config = ServerConfig::from_toml_str("[db]\ndsn = \"D\"").unwrap();
        let profiles = Arc::new(ProfileRegistry::from_config(&config));

        let driver = Arc::new(FakeDriver::new());
        driver.add_table(
            "db",
            FakeTable::new("customers", &[("id", "INTEGER"), ("name", "VARCHAR(64)")]),
        );
        driver.add_table("db", FakeTable::new("orders", &[("id", "INTEGER")]));
        let sessions = Arc::new(SessionManager::new(driver as Arc<dyn Driver>));
        let catalog = Arc::new(CatalogIntrospector::new(sessions));

        (
            ListTablesTool::new(Arc::clone(&profiles), Arc::clone(&catalog)),
            GetTableSchemaTool::new(profiles, catalog),
        )
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (tool, _) = setup();
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        let body = result_json(&result);
        assert_eq!(body["tables"].as_array().unwrap().len(), 2);
        assert_eq!(body["tables"][0]["name"], "customers");
    }

    #[tokio::test]
    async fn test_list_tables_filter() {
        let (tool, _) = setup();
        let result = tool
            .execute(serde_json::json!({"filter": "ORD"}))
            .await
            .unwrap();
        let body = result_json(&result);
        let tables = body["tables"].as_array().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0]["name"], "orders");
    }

    #[tokio::test]
    async fn test_get_table_schema() {
        let (_, tool) = setup();
        let result = tool
            .execute(serde_json::json!({"table": "customers"}))
            .await
            .unwrap();
        let body = result_json(&result);
        assert_eq!(body["columns"].as_array().unwrap().len(), 2);
        assert_eq!(body["columns"][1]["declared_type"], "VARCHAR(64)");
    }

    #[tokio::test]
    async fn test_get_table_schema_missing_table() {
        let (_, tool) = setup();
        let result = tool
            .execute(serde_json::json!({"table": "no_such"}))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result_json(&result)["error"], "table_not_found");
    }

    #[tokio::test]
    async fn test_get_table_schema_requires_table() {
        let (_, tool) = setup();
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result_json(&result)["error"], "invalid_arguments");
    }
}
