//! Robots.txt handling module
//!
//! This module fetches and parses robots.txt files. Besides allow/deny
//! decisions it exposes the `Sitemap:` declarations and crawl delays that the
//! fetcher and the audit report rely on.

mod parser;

pub use parser::RobotsRules;

use reqwest::Client;
use url::Url;

/// Outcome of fetching robots.txt for one origin
#[derive(Debug, Clone)]
pub struct RobotsFetch {
    /// Rules to apply (allow-all when the file is missing or unreadable)
    pub rules: RobotsRules,
    /// Whether the server answered with a 2xx robots.txt
    pub present: bool,
}

/// Fetches robots.txt for the origin of `url`
///
/// # Arguments
///
/// * `client` - The HTTP client used by the crawl
/// * `url` - Any URL on the origin whose robots.txt is wanted
///
/// # Returns
///
/// The parsed rules and whether the file exists. Network failures and non-2xx
/// answers are treated as "no robots.txt", which allows everything.
pub async fn fetch_robots(client: &Client, url: &Url) -> RobotsFetch {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => {
            return RobotsFetch {
                rules: RobotsRules::allow_all(),
                present: false,
            }
        }
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("Failed to fetch {}: {}", robots_url, e);
            return RobotsFetch {
                rules: RobotsRules::allow_all(),
                present: false,
            };
        }
    };

    if !response.status().is_success() {
        tracing::debug!("{} answered {}", robots_url, response.status());
        return RobotsFetch {
            rules: RobotsRules::allow_all(),
            present: false,
        };
    }

    match response.text().await {
        Ok(body) => RobotsFetch {
            rules: RobotsRules::from_content(&body),
            present: true,
        },
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", robots_url, e);
            RobotsFetch {
                rules: RobotsRules::allow_all(),
                present: true,
            }
        }
    }
}
