//! Image, media and embedded content rules

use super::indexable;
use crate::page::{dom, PageReport};
use reqwest::header::HeaderMap;
use scraper::Html;

const MAX_ALT_CHARS: usize = 100;
const MAX_IMAGE_BYTES: u64 = 500 * 1024;

/// `<img>` without an `alt` attribute (an empty alt marks a decorative image)
pub fn image_without_alt(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::select(doc, "img")
            .iter()
            .any(|i| i.value().attr("alt").is_none())
}

pub fn long_alt_text(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page
            .images
            .iter()
            .any(|i| i.alt.chars().count() > MAX_ALT_CHARS)
}

pub fn image_without_dimensions(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::select(doc, "img").iter().any(|i| {
            let v = i.value();
            v.attr("width").is_none() || v.attr("height").is_none()
        })
}

/// HTTPS page loading sub-resources over HTTP
pub fn mixed_content(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page.scheme() == "https"
        && page
            .resources()
            .chain(page.iframes.iter().map(String::as_str))
            .any(|u| u.starts_with("http://"))
}

/// Applies to the image observation itself, not to the page embedding it
pub fn large_image(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    page.is_success() && page.media_type.starts_with("image/") && page.size > MAX_IMAGE_BYTES
}

pub fn iframe_usage(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && !page.iframes.is_empty()
}
