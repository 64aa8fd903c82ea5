//! Per-backend execution workers.
//!
//! Every `update`/`query` call becomes a [`Job`] on a channel. The embedded
//! backend runs two single-consumer workers, one owning the long-lived writer
//! connection and one the reader, so writes execute strictly in submission
//! order and total concurrency stays at two. The MySQL backend runs one
//! dispatcher that spawns each job as a task against the shared pool; the
//! pool's acquire timeout bounds how long a job waits for a free connection.
//!
//! A job completes its caller's reply channel exactly once, with either the
//! converted result or the failure. Maintenance jobs carry no reply; their
//! failures are logged and swallowed.

use crate::db::params::{SqlParam, bind_mysql_param, bind_sqlite_param};
use crate::db::types::{Row, RowToJson};
use crate::error::{DbError, DbResult};
use futures_util::TryStreamExt;
use sqlx::mysql::MySqlRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, Executor, MySqlPool, SqliteConnection};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// One unit of work handed to a worker.
pub(crate) struct Job {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub kind: JobKind,
}

/// What to do with the statement and where the outcome goes.
pub(crate) enum JobKind {
    /// INSERT/UPDATE/DELETE-shaped statement; resolves to the affected count.
    Update { reply: oneshot::Sender<DbResult<u64>> },
    /// SELECT-shaped statement; resolves to the converted row set.
    Query { reply: oneshot::Sender<DbResult<Vec<Row>>> },
    /// Unparameterized raw statement (administrative use).
    Raw { reply: oneshot::Sender<DbResult<()>> },
    /// Background engine-maintenance command. Best effort, no reply.
    Maintenance,
}

impl Job {
    pub fn maintenance(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: JobKind::Maintenance,
        }
    }
}

/// Which connection a SQLite worker owns; used for log fields only.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SqliteRole {
    Writer,
    Reader,
}

impl SqliteRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::Writer => "writer",
            Self::Reader => "reader",
        }
    }
}

/// Spawn a single-consumer worker that owns one SQLite connection.
///
/// The worker drains queued jobs after the sender side is dropped, then
/// closes its connection and exits.
pub(crate) fn spawn_sqlite_worker(
    name: String,
    role: SqliteRole,
    conn: SqliteConnection,
    rx: mpsc::UnboundedReceiver<Job>,
) -> JoinHandle<()> {
    tokio::spawn(run_sqlite_worker(name, role, conn, rx))
}

async fn run_sqlite_worker(
    name: String,
    role: SqliteRole,
    mut conn: SqliteConnection,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.recv().await {
        run_sqlite_job(&name, role, &mut conn, job).await;
    }

    if let Err(e) = conn.close().await {
        warn!(db = %name, role = role.as_str(), error = %e, "Failed to close SQLite connection");
    }
    debug!(db = %name, role = role.as_str(), "SQLite worker stopped");
}

async fn run_sqlite_job(name: &str, role: SqliteRole, conn: &mut SqliteConnection, job: Job) {
    match job.kind {
        JobKind::Update { reply } => {
            debug!(db = %name, role = role.as_str(), sql = %job.sql, params = job.params.len(), "Executing update");
            let mut query = sqlx::query(&job.sql);
            for param in &job.params {
                query = bind_sqlite_param(query, param);
            }
            let result = query
                .execute(&mut *conn)
                .await
                .map(|r| r.rows_affected())
                .map_err(DbError::from);
            let _ = reply.send(result);
        }
        JobKind::Query { reply } => {
            debug!(db = %name, role = role.as_str(), sql = %job.sql, params = job.params.len(), "Executing query");
            let mut query = sqlx::query(&job.sql);
            for param in &job.params {
                query = bind_sqlite_param(query, param);
            }
            let result: DbResult<Vec<Row>> = query
                .fetch(&mut *conn)
                .try_collect::<Vec<SqliteRow>>()
                .await
                .map(|rows| rows.iter().map(RowToJson::to_row).collect())
                .map_err(DbError::from);
            let _ = reply.send(result);
        }
        JobKind::Raw { reply } => {
            debug!(db = %name, role = role.as_str(), sql = %job.sql, "Executing raw statement");
            let result = conn
                .execute(job.sql.as_str())
                .await
                .map(|_| ())
                .map_err(DbError::from);
            let _ = reply.send(result);
        }
        JobKind::Maintenance => {
            if let Err(e) = conn.execute(job.sql.as_str()).await {
                warn!(db = %name, sql = %job.sql, error = %e, "Maintenance command failed");
            } else {
                debug!(db = %name, sql = %job.sql, "Maintenance command ran");
            }
        }
    }
}

/// Spawn the MySQL dispatcher.
///
/// Each received job runs as its own task against the shared pool; the
/// dispatcher tracks them in a `JoinSet` and drains the set before exiting
/// once the sender side is dropped.
pub(crate) fn spawn_mysql_dispatcher(
    name: String,
    pool: MySqlPool,
    rx: mpsc::UnboundedReceiver<Job>,
) -> JoinHandle<()> {
    tokio::spawn(run_mysql_dispatcher(name, pool, rx))
}

async fn run_mysql_dispatcher(
    name: String,
    pool: MySqlPool,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => {
                    tasks.spawn(run_mysql_job(name.clone(), pool.clone(), job));
                }
                None => break,
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}
    debug!(db = %name, "MySQL dispatcher stopped");
}

async fn run_mysql_job(name: String, pool: MySqlPool, job: Job) {
    match job.kind {
        JobKind::Update { reply } => {
            debug!(db = %name, sql = %job.sql, params = job.params.len(), "Executing update");
            let mut query = sqlx::query(&job.sql);
            for param in &job.params {
                query = bind_mysql_param(query, param);
            }
            let result = query
                .execute(&pool)
                .await
                .map(|r| r.rows_affected())
                .map_err(DbError::from);
            let _ = reply.send(result);
        }
        JobKind::Query { reply } => {
            debug!(db = %name, sql = %job.sql, params = job.params.len(), "Executing query");
            let mut query = sqlx::query(&job.sql);
            for param in &job.params {
                query = bind_mysql_param(query, param);
            }
            let result: DbResult<Vec<Row>> = query
                .fetch(&pool)
                .try_collect::<Vec<MySqlRow>>()
                .await
                .map(|rows| rows.iter().map(RowToJson::to_row).collect())
                .map_err(DbError::from);
            let _ = reply.send(result);
        }
        JobKind::Raw { reply } => {
            debug!(db = %name, sql = %job.sql, "Executing raw statement");
            // Raw SQL bypasses the prepared-statement path; some
            // administrative statements cannot be prepared.
            let result = pool
                .execute(job.sql.as_str())
                .await
                .map(|_| ())
                .map_err(DbError::from);
            let _ = reply.send(result);
        }
        JobKind::Maintenance => {
            if let Err(e) = pool.execute(job.sql.as_str()).await {
                warn!(db = %name, sql = %job.sql, error = %e, "Maintenance command failed");
            }
        }
    }
}
