//! Database access core.
//!
//! This module contains the connection/execution manager:
//! - The manager facade and pending-result abstraction
//! - Per-backend execution workers
//! - The prepared-statement registry
//! - Parameter binding and row conversion
//! - The embedded backend's maintenance scheduler

pub(crate) mod engine;
pub(crate) mod maintenance;
pub mod manager;
pub mod params;
pub mod statements;
pub mod types;

pub use manager::{DatabaseManager, PendingResult};
pub use params::SqlParam;
pub use statements::StatementRegistry;
pub use types::Row;
