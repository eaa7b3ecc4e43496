//! Output module for presenting audit results
//!
//! Crawl results live in SQLite; this module reads them back for the CLI.

pub mod stats;

pub use stats::{load_issue_summary, print_issue_summary, IssueSummary};
