//! Title, description and body content rules

use super::{fetched_html, indexable, is_valid_lang_code};
use crate::page::{dom, PageReport};
use reqwest::header::HeaderMap;
use scraper::Html;
use std::collections::HashSet;

const MIN_TITLE_CHARS: usize = 20;
const MAX_TITLE_CHARS: usize = 60;
const MIN_DESCRIPTION_CHARS: usize = 80;
const MAX_DESCRIPTION_CHARS: usize = 160;
const MIN_WORDS: u32 = 200;
const MAX_HTML_BYTES: u64 = 2 * 1024 * 1024;
const MAX_DOM_ELEMENTS: usize = 1500;
const MAX_TTFB_MS: u64 = 800;

const DEPRECATED_TAGS: &str =
    "acronym, applet, basefont, big, blink, center, dir, font, frame, frameset, marquee, strike, tt";

fn chars(s: &str) -> usize {
    s.trim().chars().count()
}

pub fn empty_title(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.title.trim().is_empty()
}

pub fn short_title(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    let n = chars(&page.title);
    indexable(page) && n > 0 && n < MIN_TITLE_CHARS
}

pub fn long_title(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && chars(&page.title) > MAX_TITLE_CHARS
}

pub fn multiple_title_tags(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::count(doc, "head > title") > 1
}

pub fn empty_description(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.description.trim().is_empty()
}

pub fn short_description(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    let n = chars(&page.description);
    indexable(page) && n > 0 && n < MIN_DESCRIPTION_CHARS
}

pub fn long_description(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && chars(&page.description) > MAX_DESCRIPTION_CHARS
}

pub fn multiple_description_tags(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::meta_contents(doc, "description").len() > 1
}

pub fn little_content(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.words < MIN_WORDS
}

pub fn large_html(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.size > MAX_HTML_BYTES
}

pub fn no_lang(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.lang.is_empty()
}

pub fn invalid_lang(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && !page.lang.is_empty() && !is_valid_lang_code(&page.lang)
}

/// No charset in the Content-Type header nor in a meta tag
pub fn no_charset(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    if !indexable(page) {
        return false;
    }
    if page.content_type.to_ascii_lowercase().contains("charset=") {
        return false;
    }
    if dom::count(doc, "meta[charset]") > 0 {
        return false;
    }
    !dom::select(doc, "meta[http-equiv][content]").iter().any(|m| {
        m.value()
            .attr("content")
            .map_or(false, |c| c.to_ascii_lowercase().contains("charset="))
    })
}

pub fn no_viewport(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::meta_contents(doc, "viewport").is_empty()
}

pub fn no_doctype(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && !doc.tree.root().children().any(|n| n.value().is_doctype())
}

pub fn large_dom(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::count(doc, "*") > MAX_DOM_ELEMENTS
}

pub fn meta_refresh(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    fetched_html(page)
        && dom::select(doc, "meta[http-equiv]").iter().any(|m| {
            m.value()
                .attr("http-equiv")
                .map_or(false, |v| v.trim().eq_ignore_ascii_case("refresh"))
        })
}

/// Reported even when noindex pages are excluded from the crawl
pub fn noindex(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    fetched_html(page) && page.noindex
}

pub fn nofollow_meta(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    fetched_html(page) && page.nofollow
}

/// Noindex sent as a header, applies to any media type
pub fn x_robots_noindex(page: &PageReport, _doc: &Html, headers: &HeaderMap) -> bool {
    page.is_success()
        && headers
            .get_all("x-robots-tag")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| dom::has_robots_directive(v, "noindex"))
}

pub fn slow_ttfb(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    fetched_html(page) && page.ttfb_ms > MAX_TTFB_MS
}

pub fn deprecated_tags(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::count(doc, DEPRECATED_TAGS) > 0
}

pub fn duplicated_ids(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    if !indexable(page) {
        return false;
    }
    let mut seen = HashSet::new();
    dom::select(doc, "[id]")
        .iter()
        .filter_map(|e| e.value().attr("id"))
        .filter(|id| !id.is_empty())
        .any(|id| !seen.insert(id))
}

/// External scripts in the head without `async`, `defer` or `type=module`
pub fn render_blocking_scripts(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::select(doc, "head script[src]").iter().any(|s| {
            let v = s.value();
            v.attr("async").is_none()
                && v.attr("defer").is_none()
                && !v.attr("type").map_or(false, |t| t.eq_ignore_ascii_case("module"))
        })
}

pub fn title_equals_description(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    let title = page.title.trim();
    indexable(page) && !title.is_empty() && title.eq_ignore_ascii_case(page.description.trim())
}

pub fn no_favicon(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::links_with_rel(doc, "icon").is_empty()
}
