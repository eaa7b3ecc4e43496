use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_audit::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a domain matches a wildcard pattern
///
/// `"example.com"` matches only itself, `"*.example.com"` matches the bare
/// domain and any subdomain at any depth.
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns true if `host` belongs to the audited site
///
/// # Arguments
///
/// * `seed_host` - Host of the project URL
/// * `host` - Host of the candidate URL
/// * `allow_subdomains` - Whether subdomains of the seed host are in scope
///
/// A leading `www.` on the seed host is ignored when subdomains are allowed,
/// so `www.example.com` also admits `shop.example.com`.
pub fn is_in_scope(seed_host: &str, host: &str, allow_subdomains: bool) -> bool {
    let seed_host = seed_host.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    if !allow_subdomains {
        return matches_wildcard(&seed_host, &host);
    }

    let base = seed_host.strip_prefix("www.").unwrap_or(&seed_host);
    matches_wildcard(&format!("*.{}", base), &host)
}
