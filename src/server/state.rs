//! Shared server state wiring the broker components together.

use crate::config::ServerConfig;
use crate::database::catalog::CatalogIntrospector;
use crate::database::driver::Driver;
use crate::database::executor::QueryExecutor;
use crate::database::registry::ProfileRegistry;
use crate::database::session::SessionManager;
use crate::error::{McpError, Result};
use crate::protocol::Implementation;
use crate::tools::ToolRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ServerState {
    pub config: ServerConfig,
    pub profiles: Arc<ProfileRegistry>,
    pub sessions: Arc<SessionManager>,
    pub tools: ToolRegistry,
    initialized: AtomicBool,
    client_info: RwLock<Option<Implementation>>,
}

impl ServerState {
    pub fn builder() -> ServerStateBuilder {
        ServerStateBuilder::new()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_initialized(&self, client_info: Implementation) {
        *self.client_info.write() = Some(client_info);
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.client_info.read().clone()
    }

    /// Closes every cached session. Called on shutdown.
    pub async fn close_all_sessions(&self) {
        self.sessions.close_all().await;
    }
}

pub struct ServerStateBuilder {
    config: Option<ServerConfig>,
    driver: Option<Arc<dyn Driver>>,
}

impl ServerStateBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            driver: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<ServerState> {
        let config = self.config.ok_or_else(|| McpError::Internal {
            message: "Config is required".into(),
        })?;
        let driver = self.driver.ok_or_else(|| McpError::Internal {
            message: "Driver is required".into(),
        })?;

        let profiles = Arc::new(ProfileRegistry::from_config(&config));
        let sessions = Arc::new(SessionManager::new(driver));
        let executor = Arc::new(QueryExecutor::new(Arc::clone(&sessions)));
        let catalog = Arc::new(CatalogIntrospector::new(Arc::clone(&sessions)));

        let tools = crate::tools::create_registry(
            Arc::clone(&profiles),
            Arc::clone(&sessions),
            executor,
            catalog,
        );

        Ok(ServerState {
            config,
            profiles,
            sessions,
            tools,
            initialized: AtomicBool::new(false),
            client_info: RwLock::new(None),
        })
    }
}

impl Default for ServerStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
