//! Security header rules

use super::{fetched_html, header};
use crate::page::{dom, PageReport};
use reqwest::header::{HeaderMap, SET_COOKIE};
use scraper::Html;

pub fn missing_hsts(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page)
        && page.scheme() == "https"
        && header(headers, "strict-transport-security").is_none()
}

pub fn missing_csp(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page) && header(headers, "content-security-policy").is_none()
}

pub fn missing_content_type_options(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page)
        && !header(headers, "x-content-type-options")
            .map_or(false, |v| v.eq_ignore_ascii_case("nosniff"))
}

pub fn missing_referrer_policy(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page) && header(headers, "referrer-policy").is_none()
}

/// Neither X-Frame-Options nor a CSP `frame-ancestors` directive
pub fn missing_frame_options(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    let has_frame_ancestors = header(headers, "content-security-policy")
        .map_or(false, |csp| csp.to_ascii_lowercase().contains("frame-ancestors"));
    fetched_html(page) && header(headers, "x-frame-options").is_none() && !has_frame_ancestors
}

pub fn missing_permissions_policy(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page) && header(headers, "permissions-policy").is_none()
}

/// `Server` header carrying a version number, e.g. `nginx/1.18.0`
pub fn server_version_exposed(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page)
        && header(headers, "server").map_or(false, |s| {
            s.split_once('/')
                .map_or(false, |(_, version)| version.chars().any(|c| c.is_ascii_digit()))
        })
}

pub fn powered_by_exposed(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    fetched_html(page) && header(headers, "x-powered-by").is_some()
}

/// Cookie set over HTTPS without the `Secure` attribute
pub fn insecure_cookie(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    page.is_success()
        && page.scheme() == "https"
        && headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|cookie| {
                !cookie
                    .split(';')
                    .skip(1)
                    .any(|attr| attr.trim().eq_ignore_ascii_case("secure"))
            })
}

/// Form served over plain HTTP
pub fn insecure_form(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    fetched_html(page) && page.scheme() == "http" && dom::count(doc, "form") > 0
}
