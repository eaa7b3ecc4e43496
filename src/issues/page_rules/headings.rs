//! Heading structure rules

use super::indexable;
use crate::page::{dom, PageReport};
use reqwest::header::HeaderMap;
use scraper::Html;

const MAX_H1_CHARS: usize = 70;
const HEADINGS: &str = "h1, h2, h3, h4, h5, h6";

pub fn no_h1(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::count(doc, "h1") == 0
}

pub fn multiple_h1(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && dom::count(doc, "h1") > 1
}

/// A heading level is skipped going down, e.g. an h4 directly after an h2
pub fn invalid_heading_order(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    if !indexable(page) {
        return false;
    }
    let levels: Vec<u8> = dom::select(doc, HEADINGS)
        .iter()
        .filter_map(|h| h.value().name().strip_prefix('h')?.parse().ok())
        .collect();
    levels.windows(2).any(|w| w[1] > w[0] + 1)
}

/// A heading with neither text nor an image alt inside
pub fn empty_heading(page: &PageReport, doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page)
        && dom::select(doc, HEADINGS).iter().any(|h| {
            dom::text_of(h).is_empty()
                && !dom::select_within(h, "img[alt]")
                    .iter()
                    .any(|i| i.value().attr("alt").map_or(false, |a| !a.trim().is_empty()))
        })
}

pub fn long_h1(page: &PageReport, _doc: &Html, _headers: &HeaderMap) -> bool {
    indexable(page) && page.h1.chars().count() > MAX_H1_CHARS
}

#[cfg(test)]
mod tests {
    use super::super::test_support::observe;
    use super::*;

    #[test]
    fn test_h1_counts() {
        let (page, doc, headers) = observe("https://example.com/", "<body><h2>x</h2></body>");
        assert!(no_h1(&page, &doc, &headers));
        assert!(!multiple_h1(&page, &doc, &headers));

        let (page, doc, headers) = observe("https://example.com/", "<body><h1>a</h1><h1>b</h1></body>");
        assert!(!no_h1(&page, &doc, &headers));
        assert!(multiple_h1(&page, &doc, &headers));
    }

    #[test]
    fn test_heading_order() {
        let (page, doc, headers) =
            observe("https://example.com/", "<body><h1>a</h1><h2>b</h2><h3>c</h3><h2>d</h2></body>");
        assert!(!invalid_heading_order(&page, &doc, &headers));

        let (page, doc, headers) = observe("https://example.com/", "<body><h1>a</h1><h3>c</h3></body>");
        assert!(invalid_heading_order(&page, &doc, &headers));
    }

    #[test]
    fn test_empty_heading() {
        let (page, doc, headers) =
            observe("https://example.com/", r#"<body><h1><img src="/l.png" alt="Logo"></h1></body>"#);
        assert!(!empty_heading(&page, &doc, &headers));

        let (page, doc, headers) = observe("https://example.com/", "<body><h1>a</h1><h2> </h2></body>");
        assert!(empty_heading(&page, &doc, &headers));
    }

    #[test]
    fn test_long_h1() {
        let body = format!("<body><h1>{}</h1></body>", "word ".repeat(20));
        let (page, doc, headers) = observe("https://example.com/", &body);
        assert!(long_h1(&page, &doc, &headers));
    }
}
