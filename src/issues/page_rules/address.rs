//! URL shape rules

use super::indexable;
use crate::page::PageReport;
use reqwest::header::HeaderMap;
use scraper::Html;

const MAX_URL_CHARS: usize = 200;
const MAX_QUERY_PARAMS: usize = 3;

fn path(page: &PageReport) -> &str {
    page.parsed_url.as_ref().map_or("", |u| u.path())
}

pub fn underscore(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && path(page).contains('_')
}

pub fn space(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && (path(page).contains("%20") || path(page).contains(' '))
}

pub fn multiple_slashes(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && path(page).contains("//")
}

pub fn too_long(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.url.chars().count() > MAX_URL_CHARS
}

pub fn uppercase(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && path(page).chars().any(|c| c.is_ascii_uppercase())
}

pub fn http_page(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.scheme() == "http"
}

pub fn many_query_params(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && page
            .parsed_url
            .as_ref()
            .map_or(false, |u| u.query_pairs().count() > MAX_QUERY_PARAMS)
}
