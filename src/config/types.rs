use serde::Deserialize;

/// Main configuration structure for Sumi-Audit
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub project: ProjectConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of fetch workers pulling from the frontier
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Delay between two requests of the same worker (milliseconds)
    #[serde(rename = "crawl-delay", default = "default_crawl_delay")]
    pub crawl_delay: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Maximum number of URLs accepted into one crawl
    #[serde(rename = "max-urls", default = "default_max_urls")]
    pub max_urls: u32,

    /// Number of issue records written per storage batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            crawl_delay: default_crawl_delay(),
            request_timeout: default_request_timeout(),
            max_urls: default_max_urls(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_workers() -> u32 {
    2
}

fn default_crawl_delay() -> u64 {
    250
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_urls() -> u32 {
    5000
}

fn default_batch_size() -> usize {
    100
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Renders the `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// Token matched against robots.txt user-agent groups
    pub fn robots_token(&self) -> &str {
        &self.crawler_name
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// The site being audited and its crawl policies
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Seed URL; its host defines the crawl scope
    pub url: String,

    #[serde(rename = "ignore-robots-txt", default)]
    pub ignore_robots_txt: bool,

    /// Follow links marked nofollow (page-level or per link)
    #[serde(rename = "follow-nofollow", default)]
    pub follow_nofollow: bool,

    /// Treat noindex pages as crawlable
    #[serde(rename = "include-noindex", default)]
    pub include_noindex: bool,

    #[serde(rename = "crawl-sitemap", default)]
    pub crawl_sitemap: bool,

    #[serde(rename = "allow-subdomains", default)]
    pub allow_subdomains: bool,

    /// Send a HEAD request to every distinct external link
    #[serde(rename = "check-external-links", default)]
    pub check_external_links: bool,
}
