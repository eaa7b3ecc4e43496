//! Anchor rules
//!
//! External link status codes are filled in by the crawl coordinator before
//! the page is evaluated; unchecked links carry no status.

use super::indexable;
use crate::page::{Link, PageReport};
use reqwest::header::HeaderMap;
use scraper::Html;
use url::Url;

const MAX_LINKS: usize = 100;
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "[::1]"];

fn all_links(page: &PageReport) -> impl Iterator<Item = &Link> {
    page.links.iter().chain(page.external_links.iter())
}

pub fn too_many_links(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.links.len() + page.external_links.len() > MAX_LINKS
}

/// HTTPS page linking to plain HTTP URLs
pub fn http_links(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page.scheme() == "https"
        && all_links(page).any(|l| l.url.starts_with("http://"))
}

pub fn internal_nofollow(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.links.iter().any(|l| l.nofollow)
}

pub fn external_without_nofollow(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.external_links.iter().any(|l| !l.nofollow)
}

/// Dead end: no links back into the site
pub fn no_internal_links(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.links.is_empty()
}

pub fn empty_link_text(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && all_links(page).any(|l| l.text.trim().is_empty())
}

pub fn localhost_links(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && all_links(page).any(|l| {
            Url::parse(&l.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
                .map_or(false, |h| LOCAL_HOSTS.contains(&h.as_str()))
        })
}

/// External link answering 4xx/5xx, or unreachable (status 0)
pub fn external_link_broken(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page
            .external_links
            .iter()
            .any(|l| matches!(l.status_code, Some(s) if s == 0 || s >= 400))
}

pub fn external_link_redirect(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page
            .external_links
            .iter()
            .any(|l| matches!(l.status_code, Some(s) if (300..400).contains(&s)))
}
