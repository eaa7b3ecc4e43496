//! Hreflang annotation rules

use super::{indexable, is_valid_lang_code, primary_lang};
use crate::page::{dom, PageReport};
use reqwest::header::HeaderMap;
use scraper::Html;
use std::collections::HashSet;
use url::Url;

const X_DEFAULT: &str = "x-default";

pub fn missing_self_reference(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && !page.hreflangs.is_empty()
        && !page.hreflangs.iter().any(|h| h.url == page.url)
}

/// The self-referencing alternate declares a different language than `<html lang>`
pub fn self_reference_lang_mismatch(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    if !indexable(page) || page.lang.is_empty() {
        return false;
    }
    let page_lang = primary_lang(&page.lang);
    page.hreflangs
        .iter()
        .filter(|h| h.url == page.url && !h.lang.eq_ignore_ascii_case(X_DEFAULT))
        .any(|h| primary_lang(&h.lang) != page_lang)
}

pub fn relative(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::links_with_rel(doc, "alternate")
            .iter()
            .filter(|l| l.value().attr("hreflang").is_some())
            .filter_map(|l| l.value().attr("href"))
            .any(|href| Url::parse(href.trim()).is_err())
}

pub fn invalid_code(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page
            .hreflangs
            .iter()
            .any(|h| !h.lang.eq_ignore_ascii_case(X_DEFAULT) && !is_valid_lang_code(&h.lang))
}

pub fn duplicated_lang(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    if !indexable(page) {
        return false;
    }
    let mut seen = HashSet::new();
    page.hreflangs
        .iter()
        .any(|h| !seen.insert(h.lang.to_ascii_lowercase()))
}
