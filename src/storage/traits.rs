//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::issues::{IssueKind, IssueRecord, Priority};
use crate::page::PageReport;
use crate::state::{CrawlRun, Project};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Crawl not found: {0}")]
    CrawlNotFound(i64),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The crawl pipeline shares one backend as `Arc<Mutex<S>>` and calls it from
/// blocking tasks, so implementations must be `Send`.
pub trait Storage: Send {
    // ===== Projects =====

    /// Inserts the project or refreshes the policies of the existing one with
    /// the same URL
    ///
    /// # Returns
    ///
    /// The project with its storage id
    fn upsert_project(&mut self, project: &Project) -> StorageResult<Project>;

    // ===== Crawls =====

    /// Inserts a new crawl record and returns it with its id
    fn create_crawl(&mut self, crawl: &CrawlRun) -> StorageResult<CrawlRun>;

    /// Overwrites the phase, timestamps and counters of a crawl
    fn update_crawl(&mut self, crawl: &CrawlRun) -> StorageResult<()>;

    /// Gets a crawl by ID
    fn get_crawl(&self, crawl_id: i64) -> StorageResult<CrawlRun>;

    /// Gets the most recent crawl of a project
    fn get_last_crawl(&self, project_id: i64) -> StorageResult<Option<CrawlRun>>;

    /// Crawls of a project older than `crawl_id` that still hold page data,
    /// oldest first
    fn superseded_crawl_ids(&self, project_id: i64, crawl_id: i64) -> StorageResult<Vec<i64>>;

    /// Removes every page-level row and issue of a crawl
    ///
    /// The crawl row itself is kept as history.
    fn delete_crawl_data(&mut self, crawl_id: i64) -> StorageResult<()>;

    // ===== Page reports =====

    /// Persists an observation with its links, hreflangs, images and
    /// resources
    ///
    /// # Returns
    ///
    /// A copy of the observation carrying its storage id
    fn save_page_report(&mut self, page: &PageReport, crawl_id: i64)
        -> StorageResult<PageReport>;

    /// Loads the observation of `url` in a crawl
    fn find_page_report(&self, crawl_id: i64, url: &str) -> StorageResult<Option<PageReport>>;

    /// Number of observations stored for a crawl
    fn count_page_reports(&self, crawl_id: i64) -> StorageResult<u64>;

    /// Runs one page of a crawl-wide query
    ///
    /// The query takes the crawl id as `?1` and selects page ids in its first
    /// column. Returns at most `limit` distinct ids greater than `after`, in
    /// ascending order.
    fn select_page_ids(
        &self,
        sql: &str,
        crawl_id: i64,
        after: i64,
        limit: usize,
    ) -> StorageResult<Vec<i64>>;

    // ===== Issues =====

    /// Inserts a batch of issues in one transaction
    fn save_issues(&mut self, issues: &[IssueRecord]) -> StorageResult<()>;

    /// Number of issues of a crawl whose kind has the given priority
    fn count_issues_by_priority(&self, crawl_id: i64, priority: Priority) -> StorageResult<u64>;

    /// Issue counts per kind, most frequent first
    fn count_issues_by_kind(&self, crawl_id: i64) -> StorageResult<Vec<(IssueKind, u64)>>;

    /// Every issue recorded for a crawl
    fn get_issues(&self, crawl_id: i64) -> StorageResult<Vec<IssueRecord>>;
}
