//! Storage module for persisting audit data
//!
//! This module handles all database operations for the auditor, including:
//! - SQLite database initialization and schema management
//! - Project and crawl records
//! - Page observations with their links and resources
//! - Issues and the priority lookup used for severity totals

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::AuditError;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between the orchestrator and blocking writer tasks
pub type SharedStorage<S> = Arc<Mutex<S>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(AuditError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, AuditError> {
    SqliteStorage::new(path)
}

/// Opens a throwaway in-memory database
pub fn open_in_memory() -> Result<SqliteStorage, AuditError> {
    SqliteStorage::new_in_memory()
}

/// Wraps a backend for sharing across tasks
pub fn shared<S: Storage>(storage: S) -> SharedStorage<S> {
    Arc::new(Mutex::new(storage))
}

/// Locks a shared backend, mapping poisoning to a storage error
pub fn lock<S>(storage: &Mutex<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}
