use crate::config::ProjectConfig;
use url::Url;

/// The audited site and the policies its crawls run with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub url: String,
    pub ignore_robots_txt: bool,
    pub follow_nofollow: bool,
    pub include_noindex: bool,
    pub crawl_sitemap: bool,
    pub allow_subdomains: bool,
    pub check_external_links: bool,
}

impl Project {
    /// Builds an unsaved project from its configuration section
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            id: 0,
            url: config.url.clone(),
            ignore_robots_txt: config.ignore_robots_txt,
            follow_nofollow: config.follow_nofollow,
            include_noindex: config.include_noindex,
            crawl_sitemap: config.crawl_sitemap,
            allow_subdomains: config.allow_subdomains,
            check_external_links: config.check_external_links,
        }
    }

    /// Unsaved project with every policy off
    pub fn with_url(url: &str) -> Self {
        Self {
            id: 0,
            url: url.to_string(),
            ignore_robots_txt: false,
            follow_nofollow: false,
            include_noindex: false,
            crawl_sitemap: false,
            allow_subdomains: false,
            check_external_links: false,
        }
    }

    /// Lowercase host of the project URL, if it parses
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| crate::url::extract_domain(&u))
    }
}
