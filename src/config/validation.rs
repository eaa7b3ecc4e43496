use crate::config::types::{Config, CrawlerConfig, ProjectConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

const MAX_WORKERS: u32 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    if config.output.database_path.trim().is_empty() {
        return Err(invalid("database-path cannot be empty"));
    }
    validate_project_config(&config.project)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if !(1..=MAX_WORKERS).contains(&config.workers) {
        return Err(invalid(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    let at_least_one = [
        ("request-timeout", config.request_timeout),
        ("max-urls", u64::from(config.max_urls)),
        ("batch-size", config.batch_size as u64),
    ];
    for (key, value) in at_least_one {
        if value == 0 {
            return Err(invalid(format!("{} must be at least 1", key)));
        }
    }

    Ok(())
}

/// The crawler name doubles as the robots.txt product token, so it is kept
/// to letters, digits and hyphens
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    let name = &config.crawler_name;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(format!(
            "crawler-name must be a non-empty run of letters, digits and hyphens, got '{}'",
            name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("contact-url: {}", e)))?;

    if !is_plausible_email(&config.contact_email) {
        return Err(invalid(format!(
            "contact-email is not an email address: '{}'",
            config.contact_email
        )));
    }

    Ok(())
}

fn validate_project_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("project url '{}': {}", config.url, e)))?;

    let web = matches!(url.scheme(), "http" | "https");
    if !web || url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "project url '{}' must be an http(s) URL with a host",
            config.url
        )));
    }

    Ok(())
}

/// One `@`, non-empty local part, dotted domain
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(url: &str) -> ProjectConfig {
        ProjectConfig {
            url: url.to_string(),
            ignore_robots_txt: false,
            follow_nofollow: false,
            include_noindex: false,
            crawl_sitemap: false,
            allow_subdomains: false,
            check_external_links: false,
        }
    }

    #[test]
    fn test_project_url() {
        for ok in ["https://example.com/", "http://example.com/blog"] {
            assert!(validate_project_config(&project(ok)).is_ok(), "{}", ok);
        }
        for bad in ["", "ftp://example.com/", "mailto:a@example.com", "example.com"] {
            assert!(validate_project_config(&project(bad)).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_crawler_bounds() {
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());

        let zero_workers = CrawlerConfig {
            workers: 0,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&zero_workers).is_err());

        let too_many = CrawlerConfig {
            workers: MAX_WORKERS + 1,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&too_many).is_err());

        let no_batch = CrawlerConfig {
            batch_size: 0,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&no_batch).is_err());
    }

    #[test]
    fn test_contact_email() {
        assert!(is_plausible_email("user@example.com"));
        assert!(is_plausible_email("admin@sub.example.com"));

        for bad in ["", "invalid", "@example.com", "user@", "user@domain", "a@b@example.com", "a@.com"] {
            assert!(!is_plausible_email(bad), "{}", bad);
        }
    }
}
