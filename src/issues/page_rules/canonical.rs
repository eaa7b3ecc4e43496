//! Canonical declaration rules

use super::indexable;
use crate::page::{dom, PageReport};
use crate::url::resolve_link;
use reqwest::header::{HeaderMap, LINK};
use scraper::Html;
use url::Url;

/// Canonical URL declared in a `Link: <...>; rel="canonical"` header
fn header_canonical(page: &PageReport, headers: &HeaderMap) -> Option<String> {
    let base = page.parsed_url.as_ref()?;
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
            let is_canonical = parts.any(|p| {
                let p = p.trim().to_ascii_lowercase();
                p == "rel=canonical" || p == "rel=\"canonical\""
            });
            if is_canonical {
                resolve_link(target, base).map(|u| u.to_string())
            } else {
                None
            }
        })
}

/// Header and tag both present and pointing at different URLs
pub fn header_tag_mismatch(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    if !indexable(page) || page.canonical.is_empty() {
        return false;
    }
    header_canonical(page, headers).map_or(false, |h| h != page.canonical)
}

pub fn multiple(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::links_with_rel(doc, "canonical").len() > 1
}

pub fn relative(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::links_with_rel(doc, "canonical")
            .iter()
            .filter_map(|l| l.value().attr("href"))
            .any(|href| !href.trim().is_empty() && Url::parse(href.trim()).is_err())
}

pub fn in_body(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::select(doc, "body link[rel]")
            .iter()
            .any(|l| dom::has_rel(l, "canonical"))
}
