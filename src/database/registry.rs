//! Connection profile registry.
//!
//! Loaded once at startup from the resolved configuration; immutable for the
//! process lifetime, so lookups need no locking.

use crate::config::{ConnectionProfile, DriverFamily, ServerConfig};
use crate::error::{DatabaseError, DbResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// What `list-connections` exposes per profile. Credentials are never part
/// of a summary by construction.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub driver_family: DriverFamily,
    pub readonly: bool,
}

/// Registry of logical connection names.
pub struct ProfileRegistry {
    // Config order preserved for listing; index for resolution.
    profiles: Vec<Arc<ConnectionProfile>>,
    by_name: HashMap<String, Arc<ConnectionProfile>>,
    default_connection: Option<String>,
}

impl ProfileRegistry {
    pub fn from_config(config: &ServerConfig) -> Self {
        let profiles: Vec<Arc<ConnectionProfile>> = config
            .profiles
            .iter()
            .cloned()
            .map(Arc::new)
            .collect();
        let by_name = profiles
            .iter()
            .map(|p| (p.name.clone(), Arc::clone(p)))
            .collect();
        Self {
            profiles,
            by_name,
            default_connection: config.settings.default_connection.clone(),
        }
    }

    /// Resolve a logical name to its profile.
    pub fn resolve(&self, name: &str) -> DbResult<Arc<ConnectionProfile>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| DatabaseError::UnknownConnection(name.to_string()))
    }

    /// The configured default profile. When no default is configured but
    /// exactly one connection exists, that one is used.
    pub fn default_profile(&self) -> DbResult<Arc<ConnectionProfile>> {
        match &self.default_connection {
            Some(name) => self.resolve(name),
            None if self.profiles.len() == 1 => Ok(Arc::clone(&self.profiles[0])),
            None => Err(DatabaseError::NoDefaultConnection),
        }
    }

    /// Resolve an optional caller-supplied name, falling back to the default.
    pub fn resolve_or_default(&self, name: Option<&str>) -> DbResult<Arc<ConnectionProfile>> {
        match name {
            Some(name) => self.resolve(name),
            None => self.default_profile(),
        }
    }

    /// Profile summaries in configuration order.
    pub fn list(&self) -> Vec<ProfileSummary> {
        self.profiles
            .iter()
            .map(|p| ProfileSummary {
                name: p.name.clone(),
                driver_family: p.driver_family,
                readonly: p.readonly,
            })
            .collect()
    }

    pub fn default_connection_name(&self) -> Option<&str> {
        self.default_connection.as_deref()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
