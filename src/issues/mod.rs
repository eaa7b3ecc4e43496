//! Issue detection
//!
//! Page rules classify one observation at a time while it is being crawled.
//! Crawl-wide rules run once the crawl has been fully persisted and query the
//! whole observation set. Both feed the `ReportManager`, which batches the
//! resulting records into storage.

pub mod crawl_rules;
mod kind;
mod manager;
pub mod page_rules;

pub use crawl_rules::{crawl_rules, CrawlRule};
pub use kind::{IssueKind, Priority};
pub use manager::ReportManager;
pub use page_rules::{page_rules, PageRule};

/// One detected defect on one page of one crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IssueRecord {
    pub page_id: i64,
    pub crawl_id: i64,
    pub kind: IssueKind,
}

impl IssueRecord {
    pub fn new(page_id: i64, crawl_id: i64, kind: IssueKind) -> Self {
        Self {
            page_id,
            crawl_id,
            kind,
        }
    }
}
