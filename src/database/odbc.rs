//! Real ODBC adapter over `odbc-api`, enabled by the `odbc` feature.
//!
//! ODBC handles are synchronous, so every driver call runs on the blocking
//! thread pool via [`tokio::task::spawn_blocking`]. That keeps the executor's
//! timeout effective: a caller that times out drops the join handle while the
//! driver call finishes on its own thread, and the `Arc` on the connection
//! keeps the handle alive until it does. Results are fetched in text mode and
//! normalized into [`CellValue`]s, which keeps the adapter uniform across
//! driver families at the cost of native numeric binding.

use crate::config::ConnectionProfile;
use crate::database::driver::{ConnectAttr, Driver, DriverSession, DsnInfo, ServerInfo};
use crate::database::result::{
    CellValue, Column, ColumnDescriptor, FetchOutcome, PortableType, TableDescriptor,
};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::{Connection, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

const FETCH_BATCH_SIZE: usize = 256;
const MAX_CELL_BYTES: usize = 4096;

/// Process-wide ODBC environment, created on first use.
fn environment() -> DbResult<&'static Environment> {
    static ENV: OnceCell<Environment> = OnceCell::new();
    ENV.get_or_try_init(Environment::new)
        .map_err(|e| DatabaseError::ConnectionFailed(format!("ODBC environment: {e}")))
}

fn join_failure(e: tokio::task::JoinError) -> DatabaseError {
    DatabaseError::QueryFailed(format!("driver task failed: {e}"))
}

/// Driver backed by the system ODBC driver manager.
pub struct OdbcDriver;

impl OdbcDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OdbcDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for OdbcDriver {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        attrs: &[ConnectAttr],
    ) -> DbResult<Box<dyn DriverSession>> {
        let connection_string = profile.odbc_connection_string();
        let name = profile.name.clone();
        let attrs = attrs.to_vec();

        let session = tokio::task::spawn_blocking(move || -> DbResult<OdbcSession> {
            let env = environment()?;
            let mut options = ConnectionOptions::default();
            for attr in &attrs {
                if let ConnectAttr::LoginTimeout(secs) = attr {
                    options.login_timeout_sec = Some(*secs);
                }
            }
            let conn = env
                .connect_with_connection_string(&connection_string, options)
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
            for attr in &attrs {
                match attr {
                    ConnectAttr::AutoCommit(enabled) => {
                        conn.set_autocommit(*enabled)
                            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
                    }
                    ConnectAttr::ReadOnly(enabled) => {
                        // SQL_ATTR_ACCESS_MODE is not exposed by odbc-api;
                        // the statement guard remains the enforcement point.
                        debug!(connection = %name, readonly = enabled, "Access mode attribute not applied");
                    }
                    ConnectAttr::LoginTimeout(_) => {}
                }
            }
            Ok(OdbcSession {
                conn: Arc::new(Mutex::new(conn)),
            })
        })
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(format!("driver task failed: {e}")))??;

        debug!(connection = %profile.name, "ODBC connection established");
        Ok(Box::new(session))
    }

    async fn list_data_sources(&self) -> DbResult<Vec<DsnInfo>> {
        tokio::task::spawn_blocking(|| -> DbResult<Vec<DsnInfo>> {
            let env = environment()?;
            let sources = env
                .data_sources()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            Ok(sources
                .into_iter()
                .map(|s| DsnInfo {
                    name: s.server_name,
                    driver: s.driver,
                })
                .collect())
        })
        .await
        .map_err(join_failure)?
    }
}

struct OdbcSession {
    conn: Arc<Mutex<Connection<'static>>>,
}

impl OdbcSession {
    /// Run `f` against the connection on the blocking pool. The connection
    /// mutex is taken inside the task, so an abandoned (timed-out) call
    /// releases it as soon as the driver returns.
    async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection<'static>) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(join_failure)?
    }
}

fn read_metadata(cursor: &mut impl ResultSetMetadata) -> DbResult<Vec<Column>> {
    let count = cursor
        .num_result_cols()
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    let mut columns = Vec::with_capacity(count as usize);
    for index in 1..=count as u16 {
        let name = cursor
            .col_name(index)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let declared = cursor
            .col_data_type(index)
            .map(|dt| format!("{dt:?}"))
            .unwrap_or_else(|_| "UNKNOWN".to_string());
        columns.push(Column::new(name, declared));
    }
    Ok(columns)
}

fn decode_cell(bytes: Option<&[u8]>, portable: PortableType) -> CellValue {
    let Some(bytes) = bytes else {
        return CellValue::Null;
    };
    let text = String::from_utf8_lossy(bytes);
    match portable {
        PortableType::Integer => text
            .trim()
            .parse::<i64>()
            .map(CellValue::Int)
            .unwrap_or_else(|_| CellValue::Text(text.into_owned())),
        PortableType::Float => text
            .trim()
            .parse::<f64>()
            .map(CellValue::Float)
            .unwrap_or_else(|_| CellValue::Text(text.into_owned())),
        PortableType::Decimal => CellValue::Decimal(text.into_owned()),
        PortableType::Boolean => match text.trim() {
            "1" | "true" | "TRUE" => CellValue::Bool(true),
            "0" | "false" | "FALSE" => CellValue::Bool(false),
            other => CellValue::Text(other.to_string()),
        },
        _ => CellValue::Text(text.into_owned()),
    }
}

fn drain_cursor(
    mut cursor: impl Cursor + ResultSetMetadata,
    fetch_limit: usize,
) -> DbResult<FetchOutcome> {
    let columns = read_metadata(&mut cursor)?;
    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_CELL_BYTES))
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    let mut row_set = cursor
        .bind_buffer(&mut buffers)
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    let mut more_rows = false;
    'fetch: while let Some(batch) = row_set
        .fetch()
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
    {
        for row_index in 0..batch.num_rows() {
            if rows.len() >= fetch_limit {
                more_rows = true;
                break 'fetch;
            }
            let row = columns
                .iter()
                .enumerate()
                .map(|(col_index, col)| {
                    decode_cell(batch.at(col_index, row_index), col.portable_type)
                })
                .collect();
            rows.push(row);
        }
    }

    Ok(FetchOutcome {
        columns,
        rows,
        more_rows,
    })
}

fn text_at(batch: &TextRowSet, col: usize, row: usize) -> Option<String> {
    batch
        .at(col, row)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

#[async_trait]
impl DriverSession for OdbcSession {
    async fn ping(&self) -> DbResult<()> {
        self.with_conn(|conn| match conn.is_dead() {
            Ok(false) => Ok(()),
            Ok(true) => Err(DatabaseError::ConnectionFailed(
                "connection reported dead".to_string(),
            )),
            Err(e) => Err(DatabaseError::ConnectionFailed(e.to_string())),
        })
        .await
    }

    async fn run(&self, sql: &str, fetch_limit: usize) -> DbResult<FetchOutcome> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let cursor = conn
                .execute(&sql, ())
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            match cursor {
                Some(cursor) => drain_cursor(cursor, fetch_limit),
                // Statement produced no result set (e.g. EXPLAIN on some drivers).
                None => Ok(FetchOutcome {
                    columns: Vec::new(),
                    rows: Vec::new(),
                    more_rows: false,
                }),
            }
        })
        .await
    }

    async fn tables(&self) -> DbResult<Vec<TableDescriptor>> {
        self.with_conn(|conn| {
            let mut cursor = conn
                .tables("", "", "", "TABLE,VIEW")
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            let mut buffers =
                TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_CELL_BYTES))
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            let mut row_set = cursor
                .bind_buffer(&mut buffers)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let mut tables = Vec::new();
            while let Some(batch) = row_set
                .fetch()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            {
                for row in 0..batch.num_rows() {
                    let Some(name) = text_at(batch, 2, row) else {
                        continue;
                    };
                    tables.push(TableDescriptor {
                        catalog: text_at(batch, 0, row).unwrap_or_default(),
                        schema: text_at(batch, 1, row).unwrap_or_default(),
                        name,
                        table_type: text_at(batch, 3, row)
                            .unwrap_or_else(|| "TABLE".to_string()),
                    });
                }
            }
            Ok(tables)
        })
        .await
    }

    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDescriptor>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut cursor = conn
                .columns("", "", &table, "")
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            let mut buffers =
                TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_CELL_BYTES))
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            let mut row_set = cursor
                .bind_buffer(&mut buffers)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            // SQLColumns layout: COLUMN_NAME=3, TYPE_NAME=5, NULLABLE=10,
            // ORDINAL_POSITION=16 (zero-based here).
            let mut columns = Vec::new();
            while let Some(batch) = row_set
                .fetch()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
            {
                for row in 0..batch.num_rows() {
                    let Some(name) = text_at(batch, 3, row) else {
                        continue;
                    };
                    let ordinal = text_at(batch, 16, row)
                        .and_then(|s| s.trim().parse::<usize>().ok())
                        .unwrap_or(columns.len() + 1);
                    columns.push(ColumnDescriptor {
                        name,
                        declared_type: text_at(batch, 5, row)
                            .unwrap_or_else(|| "UNKNOWN".to_string()),
                        nullable: text_at(batch, 10, row).as_deref() != Some("0"),
                        ordinal,
                    });
                }
            }
            columns.sort_by_key(|c| c.ordinal);
            Ok(columns)
        })
        .await
    }

    async fn server_info(&self) -> DbResult<ServerInfo> {
        self.with_conn(|conn| {
            let dbms_name = conn.database_management_system_name().ok();
            let database_name = conn.current_catalog().ok().filter(|s| !s.is_empty());
            Ok(ServerInfo {
                dbms_name,
                dbms_version: None,
                driver_name: None,
                database_name,
            })
        })
        .await
    }

    async fn close(&self) -> DbResult<()> {
        // Dropping the handle disconnects; nothing to flush in autocommit mode.
        Ok(())
    }
}
