use crate::config::types::{Config, CrawlerConfig, SourceConfig};
use crate::transform::Transformer;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.crawler.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[crawler]] section is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let mut output_dirs = HashSet::new();
    for crawler in &config.crawler {
        validate_crawler(crawler)?;

        if !names.insert(crawler.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate crawler name {:?}",
                crawler.name
            )));
        }
        if !output_dirs.insert(crawler.output_dir()) {
            return Err(ConfigError::Validation(format!(
                "crawler {:?} shares its output directory with another crawler",
                crawler.name
            )));
        }
    }
    Ok(())
}

fn validate_crawler(crawler: &CrawlerConfig) -> Result<(), ConfigError> {
    if crawler.name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler name cannot be empty".to_string(),
        ));
    }

    if crawler.tasks < 1 {
        return Err(ConfigError::Validation(format!(
            "crawler {:?}: tasks must be at least 1",
            crawler.name
        )));
    }

    if crawler.downloads() < 1 || crawler.downloads() > crawler.tasks {
        return Err(ConfigError::Validation(format!(
            "crawler {:?}: downloads must be between 1 and tasks",
            crawler.name
        )));
    }

    if crawler.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "crawler {:?}: retry-attempts must be at least 1",
            crawler.name
        )));
    }

    // Catch broken rules at startup instead of mid-run
    Transformer::new(&crawler.transform)?;

    if let SourceConfig::Http { base_url, .. } = &crawler.source {
        let url = Url::parse(base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "crawler {:?}: invalid base-url {base_url:?}: {e}",
                crawler.name
            ))
        })?;
        if !url.path().ends_with('/') {
            return Err(ConfigError::Validation(format!(
                "crawler {:?}: base-url must end in a slash",
                crawler.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OnConflict, Redownload};

    fn crawler(name: &str) -> CrawlerConfig {
        CrawlerConfig {
            name: name.to_string(),
            output_dir: None,
            tasks: 2,
            downloads: None,
            task_delay_ms: 0,
            redownload: Redownload::NeverSmart,
            on_conflict: OnConflict::Prompt,
            report_orphans: true,
            transform: String::new(),
            retry_attempts: 3,
            retry_delay_ms: 1000,
            source: SourceConfig::Local {
                path: "/tmp/remote".into(),
                crawl_delay_ms: 0,
            },
        }
    }

    fn config(crawlers: Vec<CrawlerConfig>) -> Config {
        Config {
            sync: Default::default(),
            crawler: crawlers,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&config(vec![crawler("a"), crawler("b")])).is_ok());
    }

    #[test]
    fn test_no_crawlers() {
        assert!(matches!(
            validate(&config(vec![])),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_names() {
        assert!(validate(&config(vec![crawler("a"), crawler("a")])).is_err());
    }

    #[test]
    fn test_shared_output_dir() {
        let mut b = crawler("b");
        b.output_dir = Some("a".into());
        assert!(validate(&config(vec![crawler("a"), b])).is_err());
    }

    #[test]
    fn test_downloads_above_tasks() {
        let mut c = crawler("a");
        c.downloads = Some(5);
        assert!(validate(&config(vec![c])).is_err());
    }

    #[test]
    fn test_broken_transform_rules() {
        let mut c = crawler("a");
        c.transform = "left -bogus-> right".to_string();
        assert!(matches!(
            validate(&config(vec![c])),
            Err(ConfigError::Rules(_))
        ));
    }

    #[test]
    fn test_http_base_url_must_end_in_slash() {
        let mut c = crawler("a");
        c.source = SourceConfig::Http {
            base_url: "https://example.com/base".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        assert!(validate(&config(vec![c.clone()])).is_err());

        c.source = SourceConfig::Http {
            base_url: "https://example.com/base/".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        assert!(validate(&config(vec![c])).is_ok());
    }
}
