//! Small selection helpers over `scraper` documents
//!
//! Selectors that fail to parse select nothing, so callers never need to
//! handle a selector error for the fixed CSS strings used in this crate.

use scraper::{ElementRef, Html, Selector};

/// All elements matching `css`
pub fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Descendants of `element` matching `css`
pub fn select_within<'a>(element: &ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => element.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Number of elements matching `css`
pub fn count(document: &Html, css: &str) -> usize {
    select(document, css).len()
}

/// Trimmed text content of an element with whitespace runs collapsed
pub fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matching `css`, empty if none
pub fn first_text(document: &Html, css: &str) -> String {
    select(document, css)
        .first()
        .map(text_of)
        .unwrap_or_default()
}

/// `content` of every `<meta name=...>` whose name matches case-insensitively
pub fn meta_contents(document: &Html, name: &str) -> Vec<String> {
    select(document, "meta[name]")
        .into_iter()
        .filter(|m| {
            m.value()
                .attr("name")
                .map_or(false, |n| n.trim().eq_ignore_ascii_case(name))
        })
        .map(|m| m.value().attr("content").unwrap_or("").trim().to_string())
        .collect()
}

/// True if the space-separated `rel` attribute contains `token`
pub fn has_rel(element: &ElementRef<'_>, token: &str) -> bool {
    element
        .value()
        .attr("rel")
        .map_or(false, |rel| {
            rel.split_ascii_whitespace()
                .any(|t| t.eq_ignore_ascii_case(token))
        })
}

/// Elements of a `<link rel=...>` type, matched case-insensitively
pub fn links_with_rel<'a>(document: &'a Html, rel: &str) -> Vec<ElementRef<'a>> {
    select(document, "link[rel]")
        .into_iter()
        .filter(|l| has_rel(l, rel))
        .collect()
}

/// Counts words in the document body, ignoring script and style text
pub fn word_count(document: &Html) -> u32 {
    let body = match select(document, "body").into_iter().next() {
        Some(b) => b,
        None => return 0,
    };

    let mut words = 0usize;
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map_or(false, |name| {
                matches!(name.as_str(), "script" | "style" | "noscript" | "template")
            });
        if !skipped {
            words += text.split_whitespace().count();
        }
    }
    u32::try_from(words).unwrap_or(u32::MAX)
}

/// Robots directives whose value follows a colon
const VALUED_DIRECTIVES: &[&str] = &[
    "max-snippet",
    "max-image-preview",
    "max-video-preview",
    "unavailable_after",
];

/// Whether a robots meta or `X-Robots-Tag` value carries `directive`
///
/// The value is a comma separated list compared token by token. A leading
/// `agent:` on a token is skipped, and `none` stands for both `noindex` and
/// `nofollow`.
pub fn has_robots_directive(value: &str, directive: &str) -> bool {
    value.split(',').any(|token| {
        let token = token.trim();
        let token = match token.split_once(':') {
            Some((key, rest))
                if !VALUED_DIRECTIVES.contains(&key.trim().to_ascii_lowercase().as_str()) =>
            {
                rest.trim()
            }
            _ => token,
        };
        token.eq_ignore_ascii_case(directive) || token.eq_ignore_ascii_case("none")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_collapses_whitespace() {
        let doc = Html::parse_document("<title>  A \n  title </title>");
        assert_eq!(first_text(&doc, "title"), "A title");
        assert_eq!(first_text(&doc, "h1"), "");
    }

    #[test]
    fn test_meta_contents_case_insensitive() {
        let doc = Html::parse_document(
            r#"<head><meta name="Description" content=" hi "><meta name="robots" content="noindex"></head>"#,
        );
        assert_eq!(meta_contents(&doc, "description"), vec!["hi".to_string()]);
        assert_eq!(meta_contents(&doc, "ROBOTS"), vec!["noindex".to_string()]);
    }

    #[test]
    fn test_word_count_skips_scripts() {
        let doc = Html::parse_document(
            "<body><p>one two three</p><script>var a = 1; var b = 2;</script><style>p { }</style></body>",
        );
        assert_eq!(word_count(&doc), 3);
    }

    #[test]
    fn test_robots_directives() {
        assert!(has_robots_directive("noindex, follow", "noindex"));
        assert!(has_robots_directive("NONE", "nofollow"));
        assert!(has_robots_directive("googlebot: noindex", "noindex"));
        assert!(!has_robots_directive("index, follow", "noindex"));
        assert!(!has_robots_directive("max-image-preview:none", "noindex"));
        assert!(!has_robots_directive("max-snippet:-1, max-video-preview:none", "nofollow"));
        assert!(!has_robots_directive("noindexed", "noindex"));
        assert!(!has_robots_directive("", "noindex"));
    }

    #[test]
    fn test_empty_document() {
        let doc = Html::new_document();
        assert_eq!(word_count(&doc), 0);
        assert!(select(&doc, "a").is_empty());
    }

    #[test]
    fn test_invalid_selector_selects_nothing() {
        let doc = Html::parse_document("<p>x</p>");
        assert!(select(&doc, "p[").is_empty());
    }
}
