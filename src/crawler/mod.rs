//! Crawler module for fetching and orchestrating an audit crawl
//!
//! This module contains the core crawling logic, including:
//! - The frontier queue feeding the fetch workers
//! - HTTP fetching with robots.txt and sitemap handling
//! - External link checks
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod http;
mod links;
pub mod sitemap;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{AckGuard, FetchResponse, Fetcher, FetcherStatus, RequestMeta, SubmitError};
pub use frontier::{Frontier, FrontierError};
pub use http::{build_http_client, FetcherConfig, HttpFetcher};
pub use links::{HeadChecker, LinkChecker};
