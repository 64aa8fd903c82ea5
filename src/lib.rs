//! sqlgate — async database-access facade.
//!
//! Lets many independent callers share a small number of logical database
//! connections safely under concurrent load, hiding two different backend
//! models behind one asynchronous contract:
//!
//! - an embedded single-file engine (SQLite) with a dedicated writer and a
//!   dedicated reader connection, writes strictly serialized;
//! - a client-server engine (MySQL) behind a bounded connection pool.
//!
//! # Example
//!
//! ```no_run
//! use sqlgate::{DatabaseConfig, DatabaseManager, SqlParam};
//!
//! # async fn example() -> Result<(), sqlgate::DbError> {
//! let config = DatabaseConfig::sqlite("default", "./data/app.db");
//! let db = DatabaseManager::connect(config).await?;
//!
//! let insert = db.prepare("INSERT INTO players (uuid, name) VALUES (?, ?)")?;
//! let affected = db.update(insert, vec![
//!     SqlParam::from("d6f3a0"),
//!     SqlParam::from("alice"),
//! ]).await?;
//! assert_eq!(affected, 1);
//!
//! db.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod registry;

pub use config::{BackendConfig, DatabaseConfig};
pub use db::{DatabaseManager, PendingResult, Row, SqlParam};
pub use error::{DbError, DbResult};
pub use registry::DatabaseRegistry;
