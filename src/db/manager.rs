//! The database manager facade.
//!
//! A [`DatabaseManager`] owns the connections, workers, and prepared
//! statements for one logical database. Callers `prepare` a statement once,
//! then `update`/`query` with the returned handle and positional parameters;
//! both return a [`PendingResult`] immediately and never block the caller
//! while the statement executes.
//!
//! # Backends
//!
//! - **SQLite**: two long-lived connections (dedicated writer, read-only
//!   reader), each driven by its own single-consumer worker. Writes are
//!   strictly serialized in submission order, mirroring the engine's
//!   single-writer model. A background task periodically runs
//!   `PRAGMA optimize;` on the writer.
//! - **MySQL**: a bounded connection pool shared by a dynamically-sized set
//!   of worker tasks. Pool exhaustion past the acquire timeout surfaces as
//!   [`DbError::ConnectionUnavailable`].

use crate::config::{BackendConfig, DatabaseConfig};
use crate::db::engine::{
    Job, JobKind, SqliteRole, spawn_mysql_dispatcher, spawn_sqlite_worker,
};
use crate::db::maintenance::{STARTUP_OPTIMIZE_SQL, spawn_optimize_task};
use crate::db::params::SqlParam;
use crate::db::statements::StatementRegistry;
use crate::db::types::Row;
use crate::error::{DbError, DbResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Connection, MySqlPool, SqliteConnection};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// SQLite busy-wait bound: contention yields a bounded wait instead of an
/// immediate SQLITE_BUSY failure.
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// MySQL pool acquire bound: fail fast instead of queueing indefinitely.
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle pooled connections are recycled after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Pooled connections are recycled outright after this long.
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// How long `close` waits for in-flight work before aborting workers.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A not-yet-complete asynchronous outcome of one `update`/`query` call.
///
/// Completed exactly once with either the success value or the failure.
/// Await it to get the result; apply your own timeout if the manager might
/// be force-closed while the work is in flight.
pub struct PendingResult<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    /// Failed before submission (unknown handle, closed manager, ...).
    Ready(Option<DbResult<T>>),
    /// Submitted; the worker completes the channel.
    Waiting(oneshot::Receiver<DbResult<T>>),
}

impl<T> PendingResult<T> {
    fn ready(result: DbResult<T>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<DbResult<T>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }
}

impl<T> Unpin for PendingResult<T> {}

impl<T> Future for PendingResult<T> {
    type Output = DbResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            PendingState::Ready(slot) => {
                Poll::Ready(slot.take().expect("pending result polled after completion"))
            }
            PendingState::Waiting(rx) => Pin::new(rx).poll(cx).map(|res| match res {
                Ok(result) => result,
                // The worker was torn down before completing the reply.
                Err(_) => Err(DbError::ManagerClosed),
            }),
        }
    }
}

/// Job senders, one per role. For MySQL both are clones of the same
/// dispatcher channel.
struct Submitter {
    write_tx: mpsc::UnboundedSender<Job>,
    read_tx: mpsc::UnboundedSender<Job>,
}

/// Everything `close` has to tear down.
struct Shutdown {
    workers: Vec<JoinHandle<()>>,
    maintenance: Option<JoinHandle<()>>,
    pool: Option<MySqlPool>,
}

pub struct DatabaseManager {
    name: String,
    backend_kind: &'static str,
    allow_raw_execute: bool,
    statements: StatementRegistry,
    closed: AtomicBool,
    submitter: RwLock<Option<Submitter>>,
    shutdown: Mutex<Option<Shutdown>>,
}

impl DatabaseManager {
    /// Construct a manager for the given configuration, opening its
    /// connections immediately.
    pub async fn connect(config: DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        let backend_kind = config.backend.kind();

        info!(
            db = %config.name,
            backend = backend_kind,
            "Opening database manager"
        );

        let (submitter, shutdown) = match &config.backend {
            BackendConfig::Sqlite { path } => Self::open_sqlite(&config.name, path).await?,
            BackendConfig::MySql {
                host,
                port,
                database,
                username,
                password,
            } => {
                Self::open_mysql(
                    &config.name,
                    host,
                    *port,
                    database,
                    username,
                    password,
                    config.pool_size,
                )
                .await?
            }
        };

        Ok(Self {
            name: config.name,
            backend_kind,
            allow_raw_execute: config.allow_raw_execute,
            statements: StatementRegistry::new(),
            closed: AtomicBool::new(false),
            submitter: RwLock::new(Some(submitter)),
            shutdown: Mutex::new(Some(shutdown)),
        })
    }

    async fn open_sqlite(name: &str, path: &Path) -> DbResult<(Submitter, Shutdown)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::config(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let base = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(SQLITE_BUSY_TIMEOUT)
            .foreign_keys(true);

        // Writer first so create_if_missing guarantees the file exists for
        // the read-only open.
        let writer = SqliteConnection::connect_with(&base.clone().create_if_missing(true))
            .await
            .map_err(|e| DbError::connection(format!("failed to open SQLite writer: {e}")))?;
        let reader = SqliteConnection::connect_with(&base.read_only(true))
            .await
            .map_err(|e| DbError::connection(format!("failed to open SQLite reader: {e}")))?;

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (read_tx, read_rx) = mpsc::unbounded_channel();

        let workers = vec![
            spawn_sqlite_worker(name.to_string(), SqliteRole::Writer, writer, write_rx),
            spawn_sqlite_worker(name.to_string(), SqliteRole::Reader, reader, read_rx),
        ];

        // Analyze-and-optimize once at startup; the first queued job so it
        // runs before any caller work. Best effort like all maintenance.
        let _ = write_tx.send(Job::maintenance(STARTUP_OPTIMIZE_SQL));
        let maintenance = spawn_optimize_task(name.to_string(), write_tx.clone());

        Ok((
            Submitter { write_tx, read_tx },
            Shutdown {
                workers,
                maintenance: Some(maintenance),
                pool: None,
            },
        ))
    }

    async fn open_mysql(
        name: &str,
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        pool_size: u32,
    ) -> DbResult<(Submitter, Shutdown)> {
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(username)
            .password(password)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size)
            .min_connections(pool_size.min(2))
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .connect_with(options)
            .await
            .map_err(|e| DbError::connection(format!("failed to connect to MySQL: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = spawn_mysql_dispatcher(name.to_string(), pool.clone(), rx);

        Ok((
            Submitter {
                write_tx: tx.clone(),
                read_tx: tx,
            },
            Shutdown {
                workers: vec![dispatcher],
                maintenance: None,
                pool: Some(pool),
            },
        ))
    }

    /// Name this manager was configured under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend label, "sqlite" or "mysql".
    pub fn backend_kind(&self) -> &'static str {
        self.backend_kind
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register SQL text and return a handle for later execution.
    ///
    /// Handles are valid only for this manager. Identical SQL prepared twice
    /// yields distinct handles; callers own any caching.
    pub fn prepare(&self, sql: impl Into<String>) -> DbResult<u32> {
        if self.is_closed() {
            return Err(DbError::ManagerClosed);
        }
        Ok(self.statements.prepare(sql))
    }

    /// Execute an INSERT/UPDATE/DELETE-shaped statement asynchronously.
    ///
    /// Fails fast with [`DbError::UnknownStatement`] before any engine work
    /// when the handle was not issued by this manager. On the SQLite backend
    /// updates run strictly in submission order.
    pub fn update(&self, handle: u32, params: Vec<SqlParam>) -> PendingResult<u64> {
        if self.is_closed() {
            return PendingResult::ready(Err(DbError::ManagerClosed));
        }
        let Some(sql) = self.statements.resolve(handle) else {
            return PendingResult::ready(Err(DbError::unknown_statement(handle)));
        };

        let (tx, rx) = oneshot::channel();
        let job = Job {
            sql,
            params,
            kind: JobKind::Update { reply: tx },
        };
        match self.send(job, true) {
            Ok(()) => PendingResult::waiting(rx),
            Err(e) => PendingResult::ready(Err(e)),
        }
    }

    /// Execute a SELECT-shaped statement asynchronously, resolving to the
    /// ordered row set.
    pub fn query(&self, handle: u32, params: Vec<SqlParam>) -> PendingResult<Vec<Row>> {
        if self.is_closed() {
            return PendingResult::ready(Err(DbError::ManagerClosed));
        }
        let Some(sql) = self.statements.resolve(handle) else {
            return PendingResult::ready(Err(DbError::unknown_statement(handle)));
        };

        let (tx, rx) = oneshot::channel();
        let job = Job {
            sql,
            params,
            kind: JobKind::Query { reply: tx },
        };
        match self.send(job, false) {
            Ok(()) => PendingResult::waiting(rx),
            Err(e) => PendingResult::ready(Err(e)),
        }
    }

    /// Run unparameterized SQL directly. Administrative use only; not for
    /// latency-sensitive paths.
    ///
    /// Disabled unless the configuration opted in with `allow_raw_execute`:
    /// raw execution with untrusted input is an injection hazard. Prefer
    /// [`DatabaseManager::prepare`].
    pub async fn execute_raw(&self, sql: &str) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::ManagerClosed);
        }
        if !self.allow_raw_execute {
            return Err(DbError::ExecutionDisabled);
        }

        let (tx, rx) = oneshot::channel();
        let job = Job {
            sql: sql.to_string(),
            params: Vec::new(),
            kind: JobKind::Raw { reply: tx },
        };
        self.send(job, true)?;
        rx.await.map_err(|_| DbError::ManagerClosed)?
    }

    fn send(&self, job: Job, write: bool) -> DbResult<()> {
        let guard = self.submitter.read().expect("submitter lock poisoned");
        let Some(submitter) = guard.as_ref() else {
            return Err(DbError::ManagerClosed);
        };
        let tx = if write {
            &submitter.write_tx
        } else {
            &submitter.read_tx
        };
        tx.send(job).map_err(|_| DbError::ManagerClosed)
    }

    /// Close the manager. Idempotent.
    ///
    /// Stops accepting new work, lets in-flight work drain for up to five
    /// seconds, aborts the remainder, stops the maintenance task, and
    /// disposes all connections. Every operation after this fails with
    /// [`DbError::ManagerClosed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(db = %self.name, backend = self.backend_kind, "Closing database manager");

        // Dropping the senders lets the workers drain their queues and exit.
        drop(
            self.submitter
                .write()
                .expect("submitter lock poisoned")
                .take(),
        );

        let shutdown = self.shutdown.lock().await.take();
        if let Some(mut shutdown) = shutdown {
            if let Some(maintenance) = shutdown.maintenance.take() {
                maintenance.abort();
            }

            for mut worker in shutdown.workers {
                if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut worker)
                    .await
                    .is_err()
                {
                    warn!(db = %self.name, "Worker did not drain in time, aborting");
                    worker.abort();
                }
            }

            if let Some(pool) = shutdown.pool {
                pool.close().await;
            }
        }

        self.statements.clear();
        info!(db = %self.name, "Database manager closed");
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("name", &self.name)
            .field("backend", &self.backend_kind)
            .field("closed", &self.is_closed())
            .field("statements", &self.statements.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_result_ready_resolves_immediately() {
        let pending = PendingResult::<u64>::ready(Err(DbError::unknown_statement(7)));
        let result = pending.await;
        assert!(matches!(result, Err(DbError::UnknownStatement { handle: 7 })));
    }

    #[tokio::test]
    async fn test_pending_result_waiting_resolves_when_sent() {
        let (tx, rx) = oneshot::channel();
        let pending = PendingResult::waiting(rx);
        tx.send(Ok(3u64)).unwrap();
        assert_eq!(pending.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pending_result_dropped_sender_is_manager_closed() {
        let (tx, rx) = oneshot::channel::<DbResult<u64>>();
        let pending = PendingResult::waiting(rx);
        drop(tx);
        assert!(matches!(pending.await, Err(DbError::ManagerClosed)));
    }
}
