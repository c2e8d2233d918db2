//! Capability interface over the underlying ODBC call surface.
//!
//! The broker never touches a native handle directly: it talks to a
//! [`Driver`] (connect, enumerate DSNs) and to [`DriverSession`]s (execute,
//! fetch, catalog calls). The real adapter lives in
//! [`odbc`](crate::database::odbc) behind the `odbc` feature; tests use a
//! deterministic in-memory fake.

use crate::config::ConnectionProfile;
use crate::database::result::{ColumnDescriptor, FetchOutcome, TableDescriptor};
use crate::error::DbResult;
use async_trait::async_trait;
use serde::Serialize;

/// Connection-time attribute applied during `connect`, before any statement
/// is issued. Order matters for some driver families (see
/// [`quirks`](crate::database::quirks)); attributes the driver does not
/// support are skipped, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttr {
    AutoCommit(bool),
    ReadOnly(bool),
    LoginTimeout(u32),
}

/// A system DSN known to the host driver manager.
#[derive(Debug, Clone, Serialize)]
pub struct DsnInfo {
    pub name: String,
    pub driver: String,
}

/// Identification reported by a live session, shown by test-connection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dbms_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dbms_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

/// Entry point to a driver backend.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a new session for `profile`, applying `attrs` in the given order
    /// at connection time.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ConnectionFailed`](crate::error::DatabaseError)
    /// wrapping the driver message on authentication failure, unreachable DSN
    /// or similar.
    async fn connect(
        &self,
        profile: &ConnectionProfile,
        attrs: &[ConnectAttr],
    ) -> DbResult<Box<dyn DriverSession>>;

    /// Enumerate system DSNs registered with the host driver manager.
    async fn list_data_sources(&self) -> DbResult<Vec<DsnInfo>>;
}

/// One live driver connection.
///
/// Sessions are owned by the session manager; callers borrow them for a
/// single operation. Implementations need not be safe for concurrent
/// statement execution; the manager serializes per handle.
#[async_trait]
pub trait DriverSession: Send + Sync {
    /// Cheap liveness round trip (`SELECT 1` or the driver's equivalent).
    async fn ping(&self) -> DbResult<()>;

    /// Execute `sql` and fetch at most `fetch_limit` rows.
    ///
    /// Implementations set [`FetchOutcome::more_rows`] when the cursor had
    /// rows left beyond the limit, then close the cursor. Values are already
    /// normalized to the portable [`CellValue`](crate::database::CellValue)
    /// set.
    async fn run(&self, sql: &str, fetch_limit: usize) -> DbResult<FetchOutcome>;

    /// Catalog call: tables visible to the current credentials.
    async fn tables(&self) -> DbResult<Vec<TableDescriptor>>;

    /// Catalog call: column metadata for one table.
    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDescriptor>>;

    /// Driver and DBMS identification.
    async fn server_info(&self) -> DbResult<ServerInfo>;

    /// Whether an in-flight statement can be canceled.
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Best-effort cancellation of the in-flight statement.
    async fn cancel(&self) -> DbResult<()> {
        Ok(())
    }

    /// Release the underlying resource. Idempotent.
    async fn close(&self) -> DbResult<()>;
}
