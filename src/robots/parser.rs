//! Robots.txt rules
//!
//! Allow/deny matching is delegated to the robotstxt crate; `Sitemap:` and
//! `Crawl-delay:` lines are read directly from the file.

use robotstxt::DefaultMatcher;

/// Robots.txt content for one origin
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    allow_all: bool,
}

impl RobotsRules {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Rules that allow everything, used when robots.txt is missing or ignored
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check (e.g., "/page.html")
    /// * `user_agent` - The robots.txt product token of the crawler
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns every `Sitemap:` URL declared in the file, in file order
    ///
    /// Sitemap lines are not tied to a user-agent group.
    pub fn sitemaps(&self) -> Vec<String> {
        self.content
            .lines()
            .filter_map(|line| {
                let (key, value) = line.trim().split_once(':')?;
                if key.trim().eq_ignore_ascii_case("sitemap") {
                    let value = value.trim();
                    (!value.is_empty()).then(|| value.to_string())
                } else {
                    None
                }
            })
            .collect()
    }

    /// `Crawl-delay` in seconds of the group matching `user_agent`
    ///
    /// A group naming the agent wins over the `*` group. Unparsable values
    /// are ignored.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all {
            return None;
        }

        let agent = user_agent.to_ascii_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_open = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share one group
                    if !group_open {
                        group.clear();
                        group_open = true;
                    }
                    group.push(value.to_ascii_lowercase());
                }
                "crawl-delay" => {
                    group_open = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group.iter().any(|ua| !ua.is_empty() && ua != "*" && agent.contains(ua.as_str())) {
                        specific = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = Some(delay);
                    }
                }
                _ => group_open = false,
            }
        }

        specific.or(wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "\
User-agent: BadBot
Disallow: /

User-agent: *
Disallow: /private
Allow: /private/press
Crawl-delay: 2.5
";

    #[test]
    fn test_allow_all() {
        let robots = RobotsRules::allow_all();
        assert!(robots.is_allowed("https://example.com/admin", "TestAudit"));
        assert_eq!(robots.crawl_delay("TestAudit"), None);
        assert!(robots.sitemaps().is_empty());
    }

    #[test]
    fn test_groups() {
        let robots = RobotsRules::from_content(SITE);
        assert!(robots.is_allowed("https://example.com/", "TestAudit"));
        assert!(!robots.is_allowed("https://example.com/private/report", "TestAudit"));
        assert!(robots.is_allowed("https://example.com/private/press", "TestAudit"));
        assert!(!robots.is_allowed("https://example.com/", "BadBot"));
    }

    #[test]
    fn test_garbage_allows_everything() {
        for content in ["", "This is not valid robots.txt {{{"] {
            let robots = RobotsRules::from_content(content);
            assert!(robots.is_allowed("https://example.com/any/path", "TestAudit"));
        }
    }

    #[test]
    fn test_sitemap_lines() {
        let content = "User-agent: *\nDisallow: /tmp\nSitemap: https://example.com/sitemap.xml\nsitemap:https://example.com/news.xml\n";
        let robots = RobotsRules::from_content(content);
        assert_eq!(
            robots.sitemaps(),
            vec![
                "https://example.com/sitemap.xml".to_string(),
                "https://example.com/news.xml".to_string()
            ]
        );
    }

    #[test]
    fn test_crawl_delay() {
        let robots = RobotsRules::from_content(SITE);
        assert_eq!(robots.crawl_delay("TestAudit"), Some(2.5));

        let content = "User-agent: OtherBot\nUser-agent: TestAudit\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10";
        let robots = RobotsRules::from_content(content);
        assert_eq!(robots.crawl_delay("TestAudit/1.0"), Some(5.0));
        assert_eq!(robots.crawl_delay("Elsewhere"), Some(10.0));

        let robots = RobotsRules::from_content("User-agent: *\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestAudit"), None);
    }
}
