//! Page observations
//!
//! A `PageReport` is the structured result of fetching (or discovering) one
//! URL during a crawl. It is produced by an `ObservationBuilder` from a
//! `RawResponse`, augmented by the crawl coordinator, persisted once and then
//! evaluated by the page rules.

mod builder;
pub(crate) mod dom;

pub use builder::{BuildError, HtmlObservationBuilder, ObservationBuilder};

use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;

/// Why a request produced no usable HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The request exceeded its deadline
    Timeout,
    /// Connection, TLS or body read error
    Network,
}

/// One HTTP exchange as seen by the fetch layer
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Requested URL (redirects are not followed)
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Time until the response headers arrived
    pub ttfb: Duration,
    pub failure: Option<FetchFailure>,
}

impl RawResponse {
    /// A response that never arrived
    pub fn failed(url: &str, failure: FetchFailure) -> Self {
        Self {
            url: url.to_string(),
            status: 0,
            headers: HeaderMap::new(),
            body: Vec::new(),
            ttfb: Duration::ZERO,
            failure: Some(failure),
        }
    }
}

/// An anchor found on a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub text: String,
    pub nofollow: bool,
    pub sponsored: bool,
    pub ugc: bool,
    /// Result of the HEAD check, external links only
    pub status_code: Option<u16>,
}

/// An `hreflang` alternate declared by a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hreflang {
    pub lang: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub alt: String,
}

/// Observation of one URL in one crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageReport {
    /// Storage id, 0 until persisted
    pub id: i64,
    pub url: String,
    pub parsed_url: Option<Url>,
    /// Absolute `Location` target of a 3xx response
    pub redirect_url: String,
    /// Absolute target of a meta refresh
    pub refresh: String,
    pub status_code: u16,
    /// Full `Content-Type` header value
    pub content_type: String,
    /// Lowercased media type without parameters, e.g. `text/html`
    pub media_type: String,
    pub lang: String,
    pub title: String,
    pub description: String,
    /// Meta robots content merged with `X-Robots-Tag`
    pub robots: String,
    pub noindex: bool,
    pub nofollow: bool,
    /// Absolute canonical URL from the `<link rel=canonical>` tag
    pub canonical: String,
    pub h1: String,
    pub h2: String,
    pub words: u32,
    /// Body size in bytes
    pub size: u64,
    /// Hex SHA-256 of the body, empty when there is no body
    pub body_hash: String,
    pub ttfb_ms: u64,
    pub depth: i32,
    pub timeout: bool,
    pub blocked_by_robots: bool,
    pub crawlable: bool,
    pub in_sitemap: bool,

    /// Links to pages of the audited site
    pub links: Vec<Link>,
    pub external_links: Vec<Link>,
    pub hreflangs: Vec<Hreflang>,
    pub images: Vec<Image>,
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
    pub iframes: Vec<String>,
    pub audios: Vec<String>,
    pub videos: Vec<String>,
}

impl PageReport {
    fn for_url(url: &Url) -> Self {
        Self {
            url: url.to_string(),
            parsed_url: Some(url.clone()),
            ..Self::default()
        }
    }

    /// Observation for a request that timed out or failed at the network level
    pub fn timeout(url: &Url) -> Self {
        Self {
            timeout: true,
            ..Self::for_url(url)
        }
    }

    /// Synthetic observation for a URL robots.txt forbids fetching
    pub fn blocked(url: &Url, depth: i32) -> Self {
        Self {
            blocked_by_robots: true,
            crawlable: false,
            depth,
            ..Self::for_url(url)
        }
    }

    pub fn is_html(&self) -> bool {
        self.media_type == "text/html"
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// True for crawlable HTML pages that answered 2xx
    ///
    /// Content rules only apply to these.
    pub fn is_indexable_html(&self) -> bool {
        self.crawlable
            && self.is_success()
            && self.is_html()
            && !self.timeout
            && !self.blocked_by_robots
    }

    /// Scheme of the observed URL, empty when it did not parse
    pub fn scheme(&self) -> &str {
        self.parsed_url.as_ref().map_or("", Url::scheme)
    }

    /// Host of the observed URL, empty when it did not parse
    pub fn host(&self) -> &str {
        self.parsed_url
            .as_ref()
            .and_then(Url::host_str)
            .unwrap_or("")
    }

    /// All resource URLs (images, scripts, styles, media)
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.images
            .iter()
            .map(|i| i.url.as_str())
            .chain(self.scripts.iter().map(String::as_str))
            .chain(self.styles.iter().map(String::as_str))
            .chain(self.audios.iter().map(String::as_str))
            .chain(self.videos.iter().map(String::as_str))
    }

    /// URLs referenced outside anchors: canonical, redirect, refresh,
    /// hreflang alternates and iframes
    pub fn indirect_links(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        for u in [&self.canonical, &self.redirect_url, &self.refresh] {
            if !u.is_empty() {
                urls.push(u);
            }
        }
        urls.extend(self.hreflangs.iter().map(|h| h.url.as_str()));
        urls.extend(self.iframes.iter().map(String::as_str));
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_observation() {
        let url = Url::parse("https://example.com/private").unwrap();
        let page = PageReport::blocked(&url, 2);
        assert!(page.blocked_by_robots);
        assert!(!page.crawlable);
        assert_eq!(page.depth, 2);
        assert_eq!(page.status_code, 0);
        assert_eq!(page.host(), "example.com");
    }

    #[test]
    fn test_timeout_observation_is_not_indexable() {
        let url = Url::parse("https://example.com/").unwrap();
        let mut page = PageReport::timeout(&url);
        page.crawlable = true;
        assert!(page.timeout);
        assert!(!page.is_indexable_html());
    }

    #[test]
    fn test_indirect_links_skip_empty() {
        let mut page = PageReport {
            canonical: "https://example.com/a".to_string(),
            ..PageReport::default()
        };
        page.hreflangs.push(Hreflang {
            lang: "fr".to_string(),
            url: "https://example.com/fr/a".to_string(),
        });
        assert_eq!(
            page.indirect_links(),
            vec!["https://example.com/a", "https://example.com/fr/a"]
        );
    }
}
