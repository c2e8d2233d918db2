//! In-memory driver used by the test suite.
//!
//! Understands just enough SQL for the code under test: bare
//! `SELECT * FROM <table>`, the zero-row probe (`WHERE 1=0`), and the
//! `INFORMATION_SCHEMA.TABLES` fallback. Counters and failure injection
//! knobs let tests observe caching, retry, and eviction behavior.

use crate::config::ConnectionProfile;
use crate::database::driver::{ConnectAttr, Driver, DriverSession, DsnInfo, ServerInfo};
use crate::database::result::{
    CellValue, Column, ColumnDescriptor, FetchOutcome, TableDescriptor,
};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct FakeTable {
    name: String,
    columns: Vec<(String, String)>,
    rows: Vec<Vec<CellValue>>,
}

impl FakeTable {
    pub(crate) fn new(name: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn with_rows(mut self, rows: Vec<Vec<CellValue>>) -> Self {
        self.rows = rows;
        self
    }
}

#[derive(Default)]
struct FakeState {
    tables: Mutex<HashMap<String, Vec<FakeTable>>>,
    data_sources: Mutex<Vec<DsnInfo>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    queries: AtomicUsize,
    catalog_calls: AtomicUsize,
    cancels: AtomicUsize,
    pings: AtomicUsize,
    fail_pings: AtomicUsize,
    fail_connects: AtomicUsize,
    run_delay: Mutex<Duration>,
    blocking_delay: Mutex<Duration>,
    catalog_supported: AtomicBool,
    last_attrs: Mutex<Vec<ConnectAttr>>,
}

pub(crate) struct FakeDriver {
    state: Arc<FakeState>,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        let state = FakeState {
            catalog_supported: AtomicBool::new(true),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub(crate) fn add_table(&self, connection: &str, table: FakeTable) {
        self.state
            .tables
            .lock()
            .entry(connection.to_string())
            .or_default()
            .push(table);
    }

    pub(crate) fn add_data_source(&self, name: &str, driver: &str) {
        self.state.data_sources.lock().push(DsnInfo {
            name: name.to_string(),
            driver: driver.to_string(),
        });
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn query_count(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn catalog_call_count(&self) -> usize {
        self.state.catalog_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_count(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_pings(&self, n: usize) {
        self.state.fail_pings.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    pub(crate) fn set_run_delay(&self, delay: Duration) {
        *self.state.run_delay.lock() = delay;
    }

    /// Make `run` occupy a blocking-pool thread for `delay`, the way a real
    /// synchronous driver call does.
    pub(crate) fn set_blocking_delay(&self, delay: Duration) {
        *self.state.blocking_delay.lock() = delay;
    }

    pub(crate) fn set_catalog_supported(&self, supported: bool) {
        self.state
            .catalog_supported
            .store(supported, Ordering::SeqCst);
    }

    pub(crate) fn last_connect_attrs(&self) -> Vec<ConnectAttr> {
        self.state.last_attrs.lock().clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        attrs: &[ConnectAttr],
    ) -> DbResult<Box<dyn DriverSession>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.last_attrs.lock() = attrs.to_vec();

        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(DatabaseError::ConnectionFailed(format!(
                "simulated connect failure for '{}'",
                profile.name
            )));
        }

        Ok(Box::new(FakeSession {
            connection: profile.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn list_data_sources(&self) -> DbResult<Vec<DsnInfo>> {
        Ok(self.state.data_sources.lock().clone())
    }
}

struct FakeSession {
    connection: String,
    state: Arc<FakeState>,
}

impl FakeSession {
    fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&FakeTable) -> T,
    ) -> DbResult<T> {
        let tables = self.state.tables.lock();
        tables
            .get(&self.connection)
            .and_then(|v| v.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
            .map(f)
            .ok_or_else(|| DatabaseError::QueryFailed(format!("no such table: {name}")))
    }

    fn information_schema_outcome(&self) -> FetchOutcome {
        let columns = vec![
            Column::new("TABLE_CATALOG", "VARCHAR"),
            Column::new("TABLE_SCHEMA", "VARCHAR"),
            Column::new("TABLE_NAME", "VARCHAR"),
            Column::new("TABLE_TYPE", "VARCHAR"),
        ];
        let tables = self.state.tables.lock();
        let rows = tables
            .get(&self.connection)
            .map(|v| {
                v.iter()
                    .map(|t| {
                        vec![
                            CellValue::Text("main".to_string()),
                            CellValue::Text("dbo".to_string()),
                            CellValue::Text(t.name.clone()),
                            CellValue::Text("TABLE".to_string()),
                        ]
                    })
                    .collect()
            })
            .unwrap_or_default();
        FetchOutcome {
            columns,
            rows,
            more_rows: false,
        }
    }
}

/// The token following `FROM`, with trailing punctuation trimmed.
fn from_target(sql: &str) -> Option<String> {
    let mut words = sql.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("from") {
            return words
                .next()
                .map(|t| t.trim_end_matches([';', ',']).to_string());
        }
    }
    None
}

#[async_trait]
impl DriverSession for FakeSession {
    async fn ping(&self) -> DbResult<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        let remaining = self.state.fail_pings.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_pings.store(remaining - 1, Ordering::SeqCst);
            return Err(DatabaseError::ConnectionFailed(
                "simulated ping failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn run(&self, sql: &str, fetch_limit: usize) -> DbResult<FetchOutcome> {
        let delay = *self.state.run_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let blocking = *self.state.blocking_delay.lock();
        if !blocking.is_zero() {
            tokio::task::spawn_blocking(move || std::thread::sleep(blocking))
                .await
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }
        self.state.queries.fetch_add(1, Ordering::SeqCst);

        let upper = sql.to_uppercase();
        if upper.contains("INFORMATION_SCHEMA.TABLES") {
            return Ok(self.information_schema_outcome());
        }

        let target = from_target(sql)
            .ok_or_else(|| DatabaseError::QueryFailed(format!("cannot parse: {sql}")))?;
        self.with_table(&target, |table| {
            let columns: Vec<Column> = table
                .columns
                .iter()
                .map(|(n, t)| Column::new(n.clone(), t.clone()))
                .collect();
            if upper.contains("WHERE 1=0") {
                return FetchOutcome {
                    columns,
                    rows: Vec::new(),
                    more_rows: false,
                };
            }
            let more_rows = table.rows.len() > fetch_limit;
            FetchOutcome {
                columns,
                rows: table.rows.iter().take(fetch_limit).cloned().collect(),
                more_rows,
            }
        })
    }

    async fn tables(&self) -> DbResult<Vec<TableDescriptor>> {
        self.state.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.catalog_supported.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed(
                "catalog functions not supported".to_string(),
            ));
        }
        let tables = self.state.tables.lock();
        Ok(tables
            .get(&self.connection)
            .map(|v| {
                v.iter()
                    .map(|t| TableDescriptor {
                        catalog: "main".to_string(),
                        schema: "dbo".to_string(),
                        name: t.name.clone(),
                        table_type: "TABLE".to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDescriptor>> {
        self.state.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.catalog_supported.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed(
                "catalog functions not supported".to_string(),
            ));
        }
        self.with_table(table, |t| {
            t.columns
                .iter()
                .enumerate()
                .map(|(i, (name, declared))| ColumnDescriptor {
                    name: name.clone(),
                    declared_type: declared.clone(),
                    nullable: true,
                    ordinal: i + 1,
                })
                .collect()
        })
    }

    async fn server_info(&self) -> DbResult<ServerInfo> {
        Ok(ServerInfo {
            dbms_name: Some("FakeDB".to_string()),
            dbms_version: Some("1.0".to_string()),
            driver_name: Some("fake".to_string()),
            database_name: Some(self.connection.clone()),
        })
    }

    fn supports_cancel(&self) -> bool {
        true
    }

    async fn cancel(&self) -> DbResult<()> {
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_target_parses_simple_select() {
        assert_eq!(
            from_target("SELECT * FROM customers WHERE id = 1"),
            Some("customers".to_string())
        );
        assert_eq!(
            from_target("select a, b from Orders;"),
            Some("Orders".to_string())
        );
        assert_eq!(from_target("SELECT 1"), None);
    }
}
