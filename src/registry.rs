//! Process-wide publication registry mapping names to managers.
//!
//! The hosting application owns one [`DatabaseRegistry`]: its startup hook
//! constructs a manager per configured descriptor via [`DatabaseRegistry::start`],
//! other components look managers up by name, and the shutdown hook calls
//! [`DatabaseRegistry::shutdown`] exactly once. There are no hidden globals;
//! the host injects the registry into whatever needs it.

use crate::config::DatabaseConfig;
use crate::db::DatabaseManager;
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Reserved name of the default database.
pub const DEFAULT_DATABASE: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct DatabaseRegistry {
    managers: Arc<RwLock<HashMap<String, Arc<DatabaseManager>>>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self {
            managers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Construct and publish one manager per descriptor. Called from the
    /// host's startup hook.
    pub async fn start(&self, configs: Vec<DatabaseConfig>) -> DbResult<()> {
        info!(count = configs.len(), "Starting configured databases");
        for config in configs {
            self.register(config).await?;
        }
        Ok(())
    }

    /// Construct a manager from the config and publish it under its name.
    ///
    /// Fails with `ConfigInvalid` when the name is already taken; the
    /// existing manager is left untouched.
    pub async fn register(&self, config: DatabaseConfig) -> DbResult<Arc<DatabaseManager>> {
        let name = config.name.clone();

        // Early check before paying for a connection
        {
            let managers = self.managers.read().await;
            if managers.contains_key(&name) {
                return Err(DbError::config(format!(
                    "database '{name}' is already registered"
                )));
            }
        }

        let manager = Arc::new(DatabaseManager::connect(config).await?);

        // Re-check after the async connect to prevent a TOCTOU race; on a
        // duplicate, close the manager we just built outside the lock.
        let duplicate = {
            let mut managers = self.managers.write().await;
            if managers.contains_key(&name) {
                true
            } else {
                managers.insert(name.clone(), Arc::clone(&manager));
                false
            }
        };

        if duplicate {
            manager.close().await;
            return Err(DbError::config(format!(
                "database '{name}' is already registered"
            )));
        }

        info!(db = %name, backend = manager.backend_kind(), "Registered database");
        Ok(manager)
    }

    /// The default database (name "default"). Fails if none is configured.
    pub async fn default_database(&self) -> DbResult<Arc<DatabaseManager>> {
        self.get(DEFAULT_DATABASE).await
    }

    /// Look up a manager by name.
    pub async fn get(&self, name: &str) -> DbResult<Arc<DatabaseManager>> {
        let managers = self.managers.read().await;
        managers
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::unknown_database(name))
    }

    /// Whether a database with the given name is published.
    pub async fn has(&self, name: &str) -> bool {
        self.managers.read().await.contains_key(name)
    }

    /// Number of published databases.
    pub async fn count(&self) -> usize {
        self.managers.read().await.len()
    }

    /// Close a specific database and remove it from the registry.
    pub async fn close(&self, name: &str) -> DbResult<()> {
        let manager = {
            let mut managers = self.managers.write().await;
            managers
                .remove(name)
                .ok_or_else(|| DbError::unknown_database(name))?
        };
        manager.close().await;
        Ok(())
    }

    /// Close every published database and clear the registry. Called from
    /// the host's shutdown hook; safe to call more than once.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<DatabaseManager>)> = {
            let mut managers = self.managers.write().await;
            managers.drain().collect()
        };

        for (name, manager) in drained {
            info!(db = %name, "Closing database");
            manager.close().await;
        }
        info!("All databases closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = DatabaseRegistry::new();
        assert_eq!(registry.count().await, 0);
        assert!(!registry.has("default").await);
    }

    #[tokio::test]
    async fn test_get_missing_fails() {
        let registry = DatabaseRegistry::new();
        let result = registry.get("nope").await;
        assert!(matches!(result, Err(DbError::UnknownDatabase { .. })));
    }

    #[tokio::test]
    async fn test_default_missing_fails() {
        let registry = DatabaseRegistry::new();
        assert!(registry.default_database().await.is_err());
    }

    #[tokio::test]
    async fn test_close_missing_fails() {
        let registry = DatabaseRegistry::new();
        assert!(registry.close("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_on_empty_registry_is_fine() {
        let registry = DatabaseRegistry::new();
        registry.shutdown().await;
        registry.shutdown().await;
    }
}
