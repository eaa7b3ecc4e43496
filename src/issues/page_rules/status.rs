//! Status code and redirect rules
//!
//! Status rules look only at the status code so they hold regardless of what
//! else the observation carries.

use crate::page::PageReport;
use reqwest::header::HeaderMap;
use scraper::Html;
use url::Url;

pub fn is_30x(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    (300..400).contains(&page.status_code)
}

pub fn is_40x(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    (400..500).contains(&page.status_code)
}

pub fn is_50x(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    (500..600).contains(&page.status_code)
}

pub fn timed_out(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    page.timeout
}

pub fn blocked(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    page.blocked_by_robots
}

/// 3xx without a resolvable `Location`
pub fn redirect_without_target(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    page.is_redirect() && page.redirect_url.is_empty()
}

/// HTTPS page redirecting to plain HTTP
pub fn redirect_to_http(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    page.is_redirect() && page.scheme() == "https" && page.redirect_url.starts_with("http://")
}

/// Redirect leaving the host (a `www.` prefix change stays on the host)
pub fn redirect_to_external(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    if !page.is_redirect() || page.redirect_url.is_empty() {
        return false;
    }
    let target = match Url::parse(&page.redirect_url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    let strip = |h: &str| h.trim_start_matches("www.").to_ascii_lowercase();
    match target.host_str() {
        Some(host) => strip(host) != strip(page.host()),
        None => false,
    }
}
