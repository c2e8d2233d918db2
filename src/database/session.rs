//! Driver session manager: opens, caches, validates and closes sessions.
//!
//! Cache discipline (one slot per logical connection name):
//! - opening is serialized per name, so concurrent requests for the same
//!   profile share one underlying driver connection;
//! - a cached handle is revalidated with a cheap ping before reuse and
//!   transparently reopened when stale;
//! - statement execution is serialized per handle via [`SessionHandle::lock_exec`],
//!   while different connections proceed in parallel.
//!
//! Handle states: Unopened -> Open -> (Invalid on liveness/timeout failure)
//! -> Closed. Invalid handles are discarded; the next use opens a fresh one.

use crate::config::ConnectionProfile;
use crate::database::driver::{Driver, DriverSession};
use crate::database::quirks;
use crate::error::{DatabaseError, DbResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// One live driver connection bound to exactly one profile.
///
/// Owned by the manager; callers borrow it for the duration of a single
/// operation and never retain it across calls.
pub struct SessionHandle {
    profile_name: String,
    session: Box<dyn DriverSession>,
    pub opened_at: DateTime<Utc>,
    /// Mirrors the profile, fixed at open time and never changed afterwards.
    pub readonly: bool,
    pub driver_family: crate::config::DriverFamily,
    invalid: AtomicBool,
    closed: AtomicBool,
    exec_lock: Mutex<()>,
}

impl SessionHandle {
    fn new(profile: &ConnectionProfile, session: Box<dyn DriverSession>) -> Self {
        Self {
            profile_name: profile.name.clone(),
            session,
            opened_at: Utc::now(),
            readonly: profile.readonly,
            driver_family: profile.driver_family,
            invalid: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            exec_lock: Mutex::new(()),
        }
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// The underlying driver session.
    pub fn session(&self) -> &dyn DriverSession {
        self.session.as_ref()
    }

    /// Serializes statement execution on this handle. Hold the guard for the
    /// duration of one driver call.
    pub async fn lock_exec(&self) -> MutexGuard<'_, ()> {
        self.exec_lock.lock().await
    }

    pub fn mark_invalid(&self) {
        self.invalid.store(true, Ordering::SeqCst);
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    /// Close the underlying resource. Idempotent; close errors are logged,
    /// never surfaced.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.session.close().await {
            debug!(connection = %self.profile_name, "Error closing session: {}", e);
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("profile_name", &self.profile_name)
            .field("opened_at", &self.opened_at)
            .field("readonly", &self.readonly)
            .field("driver_family", &self.driver_family)
            .field("invalid", &self.is_invalid())
            .finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<Arc<SessionHandle>>>>;

/// Opens, caches and recycles driver sessions, keyed by connection name.
pub struct SessionManager {
    driver: Arc<dyn Driver>,
    slots: DashMap<String, Slot>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            slots: DashMap::new(),
        }
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    fn slot(&self, name: &str) -> Slot {
        self.slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Return the cached handle for this profile, revalidated with a ping,
    /// or open a fresh one. At most one open is in flight per name.
    pub async fn get_or_open(&self, profile: &ConnectionProfile) -> DbResult<Arc<SessionHandle>> {
        let slot = self.slot(&profile.name);
        let mut guard = slot.lock().await;

        if let Some(handle) = guard.as_ref() {
            // A ping must not interleave with a statement in flight on the
            // same handle; an exec-locked handle is busy, hence live.
            let live = !handle.is_invalid()
                && match handle.exec_lock.try_lock() {
                    Ok(_exec) => handle.session().ping().await.is_ok(),
                    Err(_) => true,
                };
            if live {
                debug!(connection = %profile.name, "Reusing cached session");
                return Ok(Arc::clone(handle));
            }
            warn!(connection = %profile.name, "Cached session failed liveness check, reopening");
            if let Some(stale) = guard.take() {
                stale.mark_invalid();
                stale.close().await;
            }
        }

        let handle = Arc::new(self.open_new(profile).await?);
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Open a session that is never cached. Used by test-connection so probe
    /// sessions cannot accumulate; the caller must close it.
    pub async fn open_ephemeral(&self, profile: &ConnectionProfile) -> DbResult<SessionHandle> {
        self.open_new(profile).await
    }

    /// Open with the family's connection-time attribute sequence applied.
    /// A transient open failure is retried once before surfacing.
    async fn open_new(&self, profile: &ConnectionProfile) -> DbResult<SessionHandle> {
        let attrs = quirks::connect_attrs(
            profile.driver_family,
            profile.readonly,
            profile.timeout.as_secs() as u32,
        );

        let session = match self.driver.connect(profile, &attrs).await {
            Ok(session) => session,
            Err(first) => {
                debug!(connection = %profile.name, "Open failed ({}), retrying once", first);
                self.driver.connect(profile, &attrs).await.map_err(|e| {
                    DatabaseError::ConnectionFailed(format!(
                        "'{}': {}",
                        profile.name,
                        source_message(e)
                    ))
                })?
            }
        };

        info!(
            connection = %profile.name,
            driver_family = profile.driver_family.as_str(),
            readonly = profile.readonly,
            "Opened session"
        );
        Ok(SessionHandle::new(profile, session))
    }

    /// Drop the cached handle for a name, closing it. Used after a timeout
    /// so a possibly corrupted session is never reused.
    pub async fn invalidate(&self, name: &str) {
        let slot = self.slot(name);
        let mut guard = slot.lock().await;
        if let Some(handle) = guard.take() {
            warn!(connection = %name, "Evicting session from cache");
            handle.mark_invalid();
            handle.close().await;
        }
    }

    /// Close every cached session. Called at process shutdown.
    pub async fn close_all(&self) {
        // Snapshot the slots before awaiting: holding a DashMap iterator
        // guard across an await can deadlock against concurrent `entry()`
        // calls on the same shard.
        let slots: Vec<Slot> = self.slots.iter().map(|entry| entry.value().clone()).collect();
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(handle) = guard.take() {
                handle.close().await;
            }
        }
        info!("All cached sessions closed");
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|slot| slot.try_lock().map(|g| g.is_some()).unwrap_or(true))
    }
}

fn source_message(e: DatabaseError) -> String {
    match e {
        DatabaseError::ConnectionFailed(msg) => msg,
        other => other.to_string(),
    }
}
