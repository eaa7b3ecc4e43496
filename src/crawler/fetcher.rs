//! Fetch layer interface
//!
//! The orchestrator only sees a `Fetcher`: it submits URLs and consumes
//! responses. `HttpFetcher` is the production implementation; tests script
//! their own.

use crate::crawler::Frontier;
use crate::page::RawResponse;
use async_trait::async_trait;
use thiserror::Error;

/// Metadata carried with a submission and handed back on its response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Depth of the page the URL was found on (`-1` for the seed)
    pub depth: i32,
    /// Skip the domain scope check (page resources on other hosts)
    pub ignore_domain: bool,
}

impl RequestMeta {
    pub fn new(depth: i32) -> Self {
        Self {
            depth,
            ignore_domain: false,
        }
    }

    pub fn resource(depth: i32) -> Self {
        Self {
            depth,
            ignore_domain: true,
        }
    }
}

/// Why a submission was not queued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("blocked by robots.txt")]
    BlockedByRobots,

    #[error("already submitted")]
    Duplicate,

    #[error("outside the crawl scope")]
    OutOfScope,

    #[error("URL limit reached")]
    LimitReached,

    #[error("invalid URL: {0}")]
    Invalid(String),

    #[error("fetcher is closed")]
    Closed,
}

/// Snapshot of the fetch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetcherStatus {
    /// Responses produced so far
    pub crawled: u64,
    /// URLs accepted for fetching
    pub discovered: u64,
    /// Requests currently in flight
    pub crawling: u64,
}

/// Acknowledges a frontier URL when dropped
///
/// Travels with the response so that a page only stops counting as active
/// work after the orchestrator has submitted everything found on it.
pub struct AckGuard {
    frontier: Option<Frontier>,
    url: String,
}

impl AckGuard {
    pub fn new(frontier: Frontier, url: &str) -> Self {
        Self {
            frontier: Some(frontier),
            url: url.to_string(),
        }
    }

    /// A guard that acknowledges nothing, for fetchers without a frontier
    pub fn detached() -> Self {
        Self {
            frontier: None,
            url: String::new(),
        }
    }
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        if let Some(frontier) = &self.frontier {
            frontier.ack(&self.url);
        }
    }
}

impl std::fmt::Debug for AckGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckGuard").field("url", &self.url).finish()
    }
}

/// One fetched URL
#[derive(Debug)]
pub struct FetchResponse {
    pub raw: RawResponse,
    pub meta: RequestMeta,
    pub in_sitemap: bool,
    pub ack: AckGuard,
}

/// Source of fetch responses for a crawl
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Next response, or `None` once the crawl has no more work or was stopped
    async fn next(&self) -> Option<FetchResponse>;

    /// Offers a URL for fetching
    async fn submit(&self, url: &str, meta: RequestMeta) -> Result<(), SubmitError>;

    /// Stops issuing requests; `next` drains and then returns `None`
    fn stop(&self);

    fn status(&self) -> FetcherStatus;

    /// Whether the seed host served a robots.txt
    fn robots_present(&self) -> bool;

    /// Whether a sitemap was found
    fn sitemap_present(&self) -> bool;

    /// Whether robots.txt disallows a sitemap location
    fn sitemap_blocked(&self) -> bool;

    /// URLs listed in the sitemap, submitted by the orchestrator after the seed
    fn sitemap_urls(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether `url` is listed in the sitemap
    fn in_sitemap(&self, _url: &str) -> bool {
        false
    }
}
