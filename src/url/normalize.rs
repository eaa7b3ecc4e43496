use crate::UrlError;
use url::Url;

/// Schemes that are never followed when found in an `href`
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

/// Normalizes a URL for frontier deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Require a host
/// 4. Remove fragment (everything after #)
///
/// Host lowercasing and default-port removal come from the URL parser.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse the URL or unsupported scheme
///
/// # Examples
///
/// ```
/// use sumi_audit::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.COM:443/Page/#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/Page/");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    Ok(url)
}

/// Resolves an `href` found on a page against that page's URL
///
/// Returns `None` for empty values, non-navigational schemes (javascript,
/// mailto, tel, data), same-page anchors and anything that does not resolve
/// to an HTTP(S) URL.
pub fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved)
}
