//! External link checks

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Checks whether a URL outside the audited site answers
#[async_trait]
pub trait LinkChecker: Send + Sync {
    /// Status code of the URL, `None` when it could not be reached
    async fn check(&self, url: &str) -> Option<u16>;
}

/// Sends a HEAD request without following redirects
pub struct HeadChecker {
    client: Client,
}

impl HeadChecker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkChecker for HeadChecker {
    async fn check(&self, url: &str) -> Option<u16> {
        match self.client.head(url).send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                None
            }
        }
    }
}
