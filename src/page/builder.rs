//! Observation builder
//!
//! Turns a `RawResponse` into a `PageReport` plus the parsed document the
//! page rules inspect. Extraction covers:
//! - Title, meta description, meta robots and `X-Robots-Tag`
//! - Canonical, `<html lang>`, first H1 and H2, meta refresh
//! - Anchors split into internal and external links with their rel flags
//! - Hreflang alternates, images, scripts, stylesheets, iframes, audio and video
//! - Word count, body size, body digest and time to first byte

use crate::page::dom;
use crate::page::{FetchFailure, Hreflang, Image, Link, PageReport, RawResponse};
use crate::url::{is_in_scope, normalize_url, resolve_link};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use scraper::Html;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Failure to build an observation at all
///
/// Network failures are not errors: they produce a `timeout` observation.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Cannot observe invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Builds page observations from raw responses
pub trait ObservationBuilder: Send + Sync {
    /// Builds the observation and the parsed document
    ///
    /// Timed-out or failed requests yield a `timeout` observation with an
    /// empty document.
    fn build(&self, response: &RawResponse) -> Result<(PageReport, Html), BuildError>;
}

/// `scraper`-based builder scoped to one site
#[derive(Debug, Clone)]
pub struct HtmlObservationBuilder {
    seed_host: String,
    allow_subdomains: bool,
}

impl HtmlObservationBuilder {
    /// # Arguments
    ///
    /// * `seed_host` - Host of the project URL; anchors on it are internal links
    /// * `allow_subdomains` - Whether subdomains of the seed host count as internal
    pub fn new(seed_host: &str, allow_subdomains: bool) -> Self {
        Self {
            seed_host: seed_host.to_ascii_lowercase(),
            allow_subdomains,
        }
    }

    fn is_internal(&self, url: &Url) -> bool {
        url.host_str()
            .map_or(false, |h| is_in_scope(&self.seed_host, h, self.allow_subdomains))
    }

    fn extract_document(&self, page: &mut PageReport, document: &Html, base: &Url) {
        page.title = dom::first_text(document, "title");
        page.description = dom::meta_contents(document, "description")
            .into_iter()
            .next()
            .unwrap_or_default();
        page.h1 = dom::first_text(document, "h1");
        page.h2 = dom::first_text(document, "h2");
        page.lang = dom::select(document, "html[lang]")
            .first()
            .and_then(|e| e.value().attr("lang"))
            .unwrap_or("")
            .trim()
            .to_string();

        let meta_robots = dom::meta_contents(document, "robots").join(", ");
        if !meta_robots.is_empty() {
            page.robots = if page.robots.is_empty() {
                meta_robots
            } else {
                format!("{}, {}", meta_robots, page.robots)
            };
        }

        page.canonical = dom::links_with_rel(document, "canonical")
            .first()
            .and_then(|e| e.value().attr("href"))
            .and_then(|href| resolve_link(href, base))
            .map(|u| u.to_string())
            .unwrap_or_default();

        page.refresh = dom::select(document, "meta[http-equiv]")
            .into_iter()
            .filter(|m| {
                m.value()
                    .attr("http-equiv")
                    .map_or(false, |v| v.trim().eq_ignore_ascii_case("refresh"))
            })
            .find_map(|m| m.value().attr("content").and_then(|c| refresh_target(c, base)))
            .unwrap_or_default();

        for anchor in dom::select(document, "a[href]") {
            let Some(url) = anchor.value().attr("href").and_then(|h| resolve_link(h, base)) else {
                continue;
            };
            let mut text = dom::text_of(&anchor);
            if text.is_empty() {
                text = dom::select_within(&anchor, "img[alt]")
                    .first()
                    .and_then(|img| img.value().attr("alt"))
                    .unwrap_or("")
                    .trim()
                    .to_string();
            }
            let link = Link {
                url: url.to_string(),
                text,
                nofollow: dom::has_rel(&anchor, "nofollow"),
                sponsored: dom::has_rel(&anchor, "sponsored"),
                ugc: dom::has_rel(&anchor, "ugc"),
                status_code: None,
            };
            if self.is_internal(&url) {
                page.links.push(link);
            } else {
                page.external_links.push(link);
            }
        }

        page.hreflangs = dom::links_with_rel(document, "alternate")
            .into_iter()
            .filter_map(|l| {
                let lang = l.value().attr("hreflang")?.trim().to_string();
                let url = resolve_link(l.value().attr("href")?, base)?;
                Some(Hreflang {
                    lang,
                    url: url.to_string(),
                })
            })
            .collect();

        page.images = dom::select(document, "img[src]")
            .into_iter()
            .filter_map(|img| {
                let url = resolve_link(img.value().attr("src")?, base)?;
                Some(Image {
                    url: url.to_string(),
                    alt: img.value().attr("alt").unwrap_or("").trim().to_string(),
                })
            })
            .collect();

        page.scripts = resolve_attrs(document, "script[src]", "src", base);
        page.styles = dom::links_with_rel(document, "stylesheet")
            .into_iter()
            .filter_map(|l| resolve_link(l.value().attr("href")?, base))
            .map(|u| u.to_string())
            .collect();
        page.iframes = resolve_attrs(document, "iframe[src]", "src", base);
        page.audios = resolve_attrs(document, "audio[src], audio source[src]", "src", base);
        page.videos = resolve_attrs(document, "video[src], video source[src]", "src", base);

        page.words = dom::word_count(document);
    }
}

impl ObservationBuilder for HtmlObservationBuilder {
    fn build(&self, response: &RawResponse) -> Result<(PageReport, Html), BuildError> {
        let url = normalize_url(&response.url).map_err(|e| BuildError::InvalidUrl {
            url: response.url.clone(),
            reason: e.to_string(),
        })?;

        if let Some(failure) = response.failure {
            tracing::debug!("{} produced no response ({:?})", url, failure);
            return Ok((PageReport::timeout(&url), Html::new_document()));
        }

        let mut page = PageReport {
            url: url.to_string(),
            parsed_url: Some(url.clone()),
            status_code: response.status,
            crawlable: true,
            ttfb_ms: u64::try_from(response.ttfb.as_millis()).unwrap_or(u64::MAX),
            size: response.body.len() as u64,
            ..PageReport::default()
        };

        page.content_type = header_str(&response.headers, CONTENT_TYPE.as_str());
        page.media_type = page
            .content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if (300..400).contains(&response.status) {
            let location = header_str(&response.headers, LOCATION.as_str());
            page.redirect_url = resolve_link(&location, &url)
                .map(|u| u.to_string())
                .unwrap_or_default();
        }

        if !response.body.is_empty() {
            page.body_hash = hex::encode(Sha256::digest(&response.body));
        }

        page.robots = response
            .headers
            .get_all("x-robots-tag")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");

        let document = if page.is_html() && !response.body.is_empty() {
            let document = Html::parse_document(&String::from_utf8_lossy(&response.body));
            self.extract_document(&mut page, &document, &url);
            document
        } else {
            Html::new_document()
        };

        page.noindex = dom::has_robots_directive(&page.robots, "noindex");
        page.nofollow = dom::has_robots_directive(&page.robots, "nofollow");

        Ok((page, document))
    }
}

/// Reads a header as a string, empty when missing or not valid ASCII
pub(crate) fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn resolve_attrs(document: &Html, css: &str, attr: &str, base: &Url) -> Vec<String> {
    dom::select(document, css)
        .into_iter()
        .filter_map(|e| resolve_link(e.value().attr(attr)?, base))
        .map(|u| u.to_string())
        .collect()
}

/// Parses `5; url=/next` style refresh content into an absolute URL
fn refresh_target(content: &str, base: &Url) -> Option<String> {
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let target = match rest.split_once('=') {
        Some((key, value)) if key.trim().eq_ignore_ascii_case("url") => value,
        _ => rest,
    };
    let target = target.trim().trim_matches(|c| c == '\'' || c == '"');
    resolve_link(target, base).map(|u| u.to_string())
}
