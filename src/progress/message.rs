use serde::{Deserialize, Serialize};

/// Counters published after each processed page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageProgress {
    pub status_code: u16,
    pub url: String,
    pub crawled_count: u64,
    pub discovered_count: u64,
    pub crawling: u64,
}

/// A message delivered to progress subscribers
///
/// Serializes as `{"name": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum ProgressMessage {
    PageReport(PageProgress),
    /// The fetch stream is exhausted and crawl-wide rules are starting
    IssuesInit,
    /// The crawl is finished, with its final URL total
    CrawlEnd(u64),
}

/// Topic carrying the progress of one project's crawls
pub fn crawl_topic(project_id: i64) -> String {
    format!("crawl-{}", project_id)
}
