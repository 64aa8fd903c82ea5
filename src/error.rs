//! Error types for sqlgate.
//!
//! All failures surfaced to callers are variants of [`DbError`], built with
//! `thiserror`. A failure is always local to the single operation that caused
//! it; one failed statement never poisons the manager or other in-flight work.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("No connection available: {message}")]
    ConnectionUnavailable { message: String },

    #[error(
        "Raw execution is disabled. Enable it explicitly with allow_raw_execute in the database configuration."
    )]
    ExecutionDisabled,

    #[error("No prepared statement with handle {handle}")]
    UnknownStatement { handle: u32 },

    #[error("Statement failed: {message}")]
    StatementFailed {
        message: String,
        /// e.g. "23000" for a constraint violation
        sql_state: Option<String>,
    },

    #[error("Database manager is closed")]
    ManagerClosed,

    #[error("No database registered under name '{name}'")]
    UnknownDatabase { name: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Create a connection-unavailable error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            message: message.into(),
        }
    }

    /// Create an unknown-statement error for the given handle.
    pub fn unknown_statement(handle: u32) -> Self {
        Self::UnknownStatement { handle }
    }

    /// Create a statement-failed error with an optional SQLSTATE code.
    pub fn statement(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::StatementFailed {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an unknown-database error for the given registry name.
    pub fn unknown_database(name: impl Into<String>) -> Self {
        Self::UnknownDatabase { name: name.into() }
    }

    /// SQLSTATE code reported by the engine, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::StatementFailed { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// Pool and I/O problems become `ConnectionUnavailable` (the caller may try
/// again later); everything the engine said about the statement itself
/// becomes `StatementFailed`.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                DbError::connection("connection pool acquire timed out")
            }
            sqlx::Error::PoolClosed => DbError::connection("connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {io_err}")),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {tls_err}")),
            sqlx::Error::Configuration(msg) => {
                DbError::config(format!("connection options rejected: {msg}"))
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::statement(db_err.message(), code)
            }
            sqlx::Error::Protocol(msg) => {
                DbError::statement(format!("protocol error: {msg}"), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::statement(format!("failed to decode column {index}: {source}"), None)
            }
            sqlx::Error::Decode(source) => {
                DbError::statement(format!("decode error: {source}"), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::statement(format!("column not found: {col}"), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::statement(
                format!("column index {index} out of bounds (len: {len})"),
                None,
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::statement(format!("type not found: {type_name}"), None)
            }
            sqlx::Error::RowNotFound => DbError::statement("no rows returned", None),
            sqlx::Error::WorkerCrashed => DbError::connection("database worker crashed"),
            _ => DbError::statement(format!("database error: {err}"), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
