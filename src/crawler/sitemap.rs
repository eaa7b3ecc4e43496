//! Sitemap discovery
//!
//! Locations come from the `Sitemap:` lines of robots.txt, falling back to
//! `/sitemap.xml`. Sitemap indexes are followed without recursion.

use crate::page::dom;
use crate::robots::RobotsRules;
use reqwest::Client;
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Upper bound on sitemap files read for one crawl
const MAX_SITEMAPS: usize = 100;

/// What was learned about the sitemaps of the seed host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapInfo {
    /// At least one location answered 2xx
    pub present: bool,
    /// robots.txt disallows at least one location
    pub blocked: bool,
    /// Page URLs listed, when they were collected
    pub urls: Vec<String>,
}

/// Sitemap locations declared in robots.txt, or the conventional one
pub fn sitemap_locations(seed: &Url, robots: &RobotsRules) -> Vec<String> {
    let declared = robots.sitemaps();
    if !declared.is_empty() {
        return declared;
    }
    seed.join("/sitemap.xml")
        .map(|u| vec![u.to_string()])
        .unwrap_or_default()
}

/// `<loc>` values of a sitemap or sitemap index document
pub fn extract_locs(xml: &str) -> Vec<String> {
    let document = Html::parse_document(xml);
    dom::select(&document, "loc")
        .iter()
        .map(dom::text_of)
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Checks the sitemap locations and optionally collects their URLs
///
/// # Arguments
///
/// * `client` - HTTP client of the crawl
/// * `locations` - Candidate sitemap URLs
/// * `robots` - Rules of the seed host
/// * `robots_token` - Product token matched against robots.txt groups
/// * `collect` - Whether to read the `<loc>` entries
pub async fn discover(
    client: &Client,
    locations: &[String],
    robots: &RobotsRules,
    robots_token: &str,
    collect: bool,
) -> SitemapInfo {
    let mut info = SitemapInfo::default();
    let mut pending: Vec<String> = locations.iter().rev().cloned().collect();
    let mut processed = HashSet::new();

    while let Some(location) = pending.pop() {
        if processed.len() >= MAX_SITEMAPS || !processed.insert(location.clone()) {
            continue;
        }

        if !robots.is_allowed(&location, robots_token) {
            info.blocked = true;
        }

        let response = match client.get(&location).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Sitemap {} returned {}", location, r.status());
                continue;
            }
            Err(e) => {
                debug!("Failed to fetch sitemap {}: {}", location, e);
                continue;
            }
        };
        info.present = true;

        if !collect {
            continue;
        }

        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to read sitemap {}: {}", location, e);
                continue;
            }
        };

        let locs = extract_locs(&text);
        if text.contains("<sitemapindex") {
            pending.extend(locs.into_iter().rev());
        } else {
            info.urls.extend(locs);
        }
    }

    debug!(
        "Sitemap present={} blocked={} urls={}",
        info.present,
        info.blocked,
        info.urls.len()
    );
    info
}
