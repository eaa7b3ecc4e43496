//! State module for tracking crawl runs
//!
//! # Components
//!
//! - `Project`: the audited site and its crawl policies
//! - `CrawlPhase`: lifecycle of one crawl (starting, running, finalizing, done or stopped)
//! - `CrawlRun`: one crawl execution with its running counters and completion timestamps

mod crawl;
mod project;

// Re-export main types
pub use crawl::{CrawlPhase, CrawlRun};
pub use project::Project;
