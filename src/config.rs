//! Database configuration values and JSON descriptor loading.
//!
//! A [`DatabaseConfig`] is an immutable description of one logical database:
//! a unique name, a backend (embedded SQLite file or client-server MySQL),
//! a pool size, and whether raw unparameterized execution is allowed.
//!
//! Descriptors are consumed from JSON, one object per database:
//!
//! ```json
//! { "name": "default", "type": "sqlite", "path": "./data/database.db" }
//! ```
//!
//! ```json
//! {
//!     "name": "analytics",
//!     "type": "mysql",
//!     "host": "localhost",
//!     "port": 3306,
//!     "database": "analytics",
//!     "user": "app",
//!     "password": "secret",
//!     "poolSize": 10
//! }
//! ```

use crate::error::{DbError, DbResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default pool size for the MySQL backend.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Default MySQL port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Path and content of the default descriptor created by [`read_default`].
pub const DEFAULT_CONFIG_PATH: &str = "./default_db.json";
const DEFAULT_CONFIG_CONTENT: &str = r#"{
    "name": "default",
    "type": "sqlite",
    "path": "./data/database.db"
}
"#;

/// Backend-specific connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Embedded single-file engine with engine-enforced single-writer
    /// semantics.
    Sqlite { path: PathBuf },
    /// Networked engine reached through a bounded connection pool.
    MySql {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
    },
}

impl BackendConfig {
    /// Short backend label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::MySql { .. } => "mysql",
        }
    }
}

/// Immutable description of one logical database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Unique name under which the manager is published.
    pub name: String,
    /// Backend kind and its connection parameters.
    pub backend: BackendConfig,
    /// Maximum pooled connections (MySQL). Must be >= 1.
    pub pool_size: u32,
    /// Opt-in for `execute_raw`. Defaults to false: unparameterized raw
    /// execution is an injection hazard and is never enabled silently.
    pub allow_raw_execute: bool,
}

impl DatabaseConfig {
    /// Create an embedded SQLite configuration with defaults.
    pub fn sqlite(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::Sqlite { path: path.into() },
            pool_size: DEFAULT_POOL_SIZE,
            allow_raw_execute: false,
        }
    }

    /// Create a MySQL configuration with defaults.
    pub fn mysql(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::MySql {
                host: host.into(),
                port,
                database: database.into(),
                username: username.into(),
                password: password.into(),
            },
            pool_size: DEFAULT_POOL_SIZE,
            allow_raw_execute: false,
        }
    }

    /// Set the pool size (builder-style).
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Opt in to `execute_raw` (builder-style).
    pub fn with_raw_execute(mut self) -> Self {
        self.allow_raw_execute = true;
        self
    }

    /// Validate the configuration. Returns `ConfigInvalid` on violation.
    pub fn validate(&self) -> DbResult<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::config("database name must not be empty"));
        }
        if self.pool_size < 1 {
            return Err(DbError::config("poolSize must be at least 1"));
        }
        match &self.backend {
            BackendConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err(DbError::config("sqlite path must not be empty"));
                }
            }
            BackendConfig::MySql { host, database, .. } => {
                if host.is_empty() {
                    return Err(DbError::config("mysql host must not be empty"));
                }
                if database.is_empty() {
                    return Err(DbError::config("mysql database must not be empty"));
                }
            }
        }
        Ok(())
    }
}

/// Raw JSON shape of a descriptor, before validation.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    name: String,
    #[serde(rename = "type", default = "default_type")]
    kind: String,
    // sqlite
    path: Option<String>,
    // mysql
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    #[serde(rename = "poolSize")]
    pool_size: Option<u32>,
    #[serde(rename = "allowRawExecute", default)]
    allow_raw_execute: bool,
}

fn default_type() -> String {
    "sqlite".to_string()
}

impl RawDescriptor {
    fn into_config(self) -> DbResult<DatabaseConfig> {
        let backend = match self.kind.to_lowercase().as_str() {
            "sqlite" => BackendConfig::Sqlite {
                path: PathBuf::from(require(self.path, "path")?),
            },
            "mysql" => BackendConfig::MySql {
                host: require(self.host, "host")?,
                port: self.port.unwrap_or(DEFAULT_MYSQL_PORT),
                database: require(self.database, "database")?,
                username: require(self.user, "user")?,
                password: require(self.password, "password")?,
            },
            other => {
                return Err(DbError::config(format!("unknown database type: {other}")));
            }
        };

        let config = DatabaseConfig {
            name: self.name,
            backend,
            pool_size: self.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
            allow_raw_execute: self.allow_raw_execute,
        };
        config.validate()?;
        Ok(config)
    }
}

fn require<T>(value: Option<T>, field: &str) -> DbResult<T> {
    value.ok_or_else(|| DbError::config(format!("missing required field '{field}'")))
}

/// Parse a single database descriptor from a JSON string.
pub fn parse_one(json: &str) -> DbResult<DatabaseConfig> {
    let raw: RawDescriptor =
        serde_json::from_str(json).map_err(|e| DbError::config(format!("invalid JSON: {e}")))?;
    raw.into_config()
}

/// Parse an array of database descriptors from a JSON string.
pub fn parse_many(json: &str) -> DbResult<Vec<DatabaseConfig>> {
    let raw: Vec<RawDescriptor> =
        serde_json::from_str(json).map_err(|e| DbError::config(format!("invalid JSON: {e}")))?;
    raw.into_iter().map(RawDescriptor::into_config).collect()
}

/// Read a single database descriptor from a JSON file.
pub fn read_one(path: impl AsRef<Path>) -> DbResult<DatabaseConfig> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        DbError::config(format!("cannot read {}: {e}", path.as_ref().display()))
    })?;
    parse_one(&content)
}

/// Read an array of database descriptors from a JSON file.
pub fn read_many(path: impl AsRef<Path>) -> DbResult<Vec<DatabaseConfig>> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        DbError::config(format!("cannot read {}: {e}", path.as_ref().display()))
    })?;
    parse_many(&content)
}

/// Read the default descriptor from `./default_db.json`, creating the file
/// with a SQLite default when it does not exist.
pub fn read_default() -> DbResult<DatabaseConfig> {
    let path = Path::new(DEFAULT_CONFIG_PATH);
    if !path.exists() {
        std::fs::write(path, DEFAULT_CONFIG_CONTENT).map_err(|e| {
            DbError::config(format!("cannot create {}: {e}", path.display()))
        })?;
    }
    read_one(path)
}
