//! Query executor: runs one SQL statement against a managed session.
//!
//! Enforcement order is fixed: read-only shape check (before any driver
//! contact), timeout around the driver call, row-limit truncation, type
//! normalization. A timed-out handle is evicted from the cache so it can
//! never be reused in a corrupted state.

use crate::config::ConnectionProfile;
use crate::database::result::QueryResult;
use crate::database::session::SessionManager;
use crate::error::{DatabaseError, DbResult};
use crate::security::ReadOnlyGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One query to run against a named connection.
///
/// Overrides can lower the profile's limits but never raise them.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub max_rows: Option<usize>,
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            max_rows: None,
            timeout: None,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn effective_max_rows(&self, profile: &ConnectionProfile) -> usize {
        self.max_rows
            .map_or(profile.max_rows, |n| n.min(profile.max_rows))
    }

    fn effective_timeout(&self, profile: &ConnectionProfile) -> Duration {
        self.timeout
            .map_or(profile.timeout, |t| t.min(profile.timeout))
    }
}

/// Executes read-bounded queries through the session manager.
pub struct QueryExecutor {
    sessions: Arc<SessionManager>,
    guard: ReadOnlyGuard,
}

impl QueryExecutor {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            guard: ReadOnlyGuard::new(),
        }
    }

    /// Run `request` against `profile`'s session.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::WriteNotAllowed`] for non-read statements on a
    ///   read-only profile, raised before the driver is reached.
    /// - [`DatabaseError::Timeout`] when the effective timeout expires; the
    ///   session is canceled if the driver supports it and evicted either way.
    /// - [`DatabaseError::QueryFailed`] for driver-reported failures, with
    ///   the original driver message preserved.
    pub async fn execute(
        &self,
        profile: &ConnectionProfile,
        request: QueryRequest,
    ) -> DbResult<QueryResult> {
        if profile.readonly {
            self.guard.check(&request.sql)?;
        }

        let max_rows = request.effective_max_rows(profile);
        let timeout = request.effective_timeout(profile);

        let handle = self.sessions.get_or_open(profile).await?;
        let _exec = handle.lock_exec().await;

        debug!(
            connection = %profile.name,
            max_rows,
            timeout_s = timeout.as_secs(),
            "Executing query"
        );

        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, handle.session().run(&request.sql, max_rows))
            .await
        {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(connection = %profile.name, "Query exceeded timeout, invalidating session");
                if handle.session().supports_cancel() {
                    let _ = handle.session().cancel().await;
                }
                handle.mark_invalid();
                self.sessions.invalidate(&profile.name).await;
                return Err(DatabaseError::Timeout(timeout.as_secs()));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            connection = %profile.name,
            rows = outcome.rows.len(),
            truncated = outcome.more_rows,
            elapsed_ms,
            "Query complete"
        );
        Ok(QueryResult::new(outcome, elapsed_ms))
    }
}
