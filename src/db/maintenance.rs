//! Periodic engine maintenance for the embedded backend.
//!
//! SQLite benefits from an occasional `PRAGMA optimize;` on the writer
//! connection. The manager runs the stronger analyze-and-optimize variant
//! once at construction, then this task submits the light variant every
//! three hours. Failures are logged by the worker and never surface to
//! callers.

use crate::db::engine::Job;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often the periodic optimize runs.
pub const MAINTENANCE_PERIOD: Duration = Duration::from_secs(3 * 60 * 60);

/// Startup variant: 0x10002 = SQLITE_ANALYZE | SQLITE_OPTIMIZE
/// (https://www.sqlite.org/pragma.html#pragma_optimize)
pub const STARTUP_OPTIMIZE_SQL: &str = "PRAGMA optimize=0x10002;";

/// Light periodic variant.
pub const PERIODIC_OPTIMIZE_SQL: &str = "PRAGMA optimize;";

/// Spawn the periodic optimize task. It submits maintenance jobs onto the
/// writer channel until the channel closes (manager shutdown).
pub(crate) fn spawn_optimize_task(
    name: String,
    write_tx: mpsc::UnboundedSender<Job>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First periodic run happens one full period after construction;
        // the startup variant already ran.
        let start = tokio::time::Instant::now() + MAINTENANCE_PERIOD;
        let mut interval = tokio::time::interval_at(start, MAINTENANCE_PERIOD);
        loop {
            interval.tick().await;
            if write_tx.send(Job::maintenance(PERIODIC_OPTIMIZE_SQL)).is_err() {
                break;
            }
            debug!(db = %name, "Scheduled periodic optimize");
        }
    })
}
