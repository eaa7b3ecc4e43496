//! Sumi-Audit: A polite site auditor
//!
//! This crate crawls a single website, records one observation per URL and
//! classifies every page against a catalog of SEO defects. Issues are
//! persisted in SQLite with a severity tier, and crawl progress is streamed
//! through a topic-based broker.

pub mod config;
pub mod crawler;
pub mod issues;
pub mod output;
pub mod page;
pub mod progress;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Could not submit {url}: {source}")]
    Submit {
        url: String,
        source: crawler::SubmitError,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Sumi-Audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

// Re-export commonly used types
pub use config::Config;
pub use issues::{IssueKind, IssueRecord, Priority};
pub use page::PageReport;
pub use state::{CrawlPhase, CrawlRun, Project};
pub use url::{extract_domain, normalize_url};
