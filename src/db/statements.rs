//! Prepared-statement registry.
//!
//! Maps an opaque integer handle to SQL text. Handles are process-unique per
//! manager, allocated atomically, and start at 1. Identical SQL prepared
//! twice gets two distinct handles; callers own any caching.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct StatementRegistry {
    statements: RwLock<HashMap<u32, String>>,
    next_handle: AtomicU32,
}

impl Default for StatementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self {
            statements: RwLock::new(HashMap::new()),
            next_handle: AtomicU32::new(1),
        }
    }

    /// Register SQL text and return its handle.
    pub fn prepare(&self, sql: impl Into<String>) -> u32 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.statements
            .write()
            .expect("statement registry lock poisoned")
            .insert(handle, sql.into());
        handle
    }

    /// Resolve a handle back to its SQL text.
    pub fn resolve(&self, handle: u32) -> Option<String> {
        self.statements
            .read()
            .expect("statement registry lock poisoned")
            .get(&handle)
            .cloned()
    }

    /// Number of registered statements.
    pub fn len(&self) -> usize {
        self.statements
            .read()
            .expect("statement registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all registered statements. Called when the owning manager closes.
    pub fn clear(&self) {
        self.statements
            .write()
            .expect("statement registry lock poisoned")
            .clear();
    }
}
