//! Crawl progress notifications
//!
//! The orchestrator publishes a message per processed page and at the phase
//! changes of a crawl. Consumers subscribe to the crawl topic of a project.

mod broker;
mod message;

pub use broker::{Broker, Callback, Subscription};
pub use message::{crawl_topic, PageProgress, ProgressMessage};
