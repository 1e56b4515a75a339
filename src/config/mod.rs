//! Configuration for the livegraph aggregator

mod crawler;
mod engines;
mod http;
mod logging;
mod publish;

pub use crawler::CrawlerConfig;
pub use engines::{EngineCommandConfig, EnginesConfig};
pub use http::HttpConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use publish::PublishConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for all HTTP requests (crawling and robots.txt)
pub const DEFAULT_USER_AGENT: &str = "LiveGraphScraper/1.0 (+https://github.com/livegraph)";

/// Main configuration for the aggregator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP crawler configuration
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// External subprocess engine configuration
    #[serde(default)]
    pub engines: EnginesConfig,
    /// Canonical document / mirror publication configuration
    #[serde(default)]
    pub publish: PublishConfig,
    /// Control-plane HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.crawler.max_depth == 0 {
            errors.push("crawler max_depth must be at least 1".to_string());
        }
        if self.crawler.max_depth > CrawlerConfig::MAX_DEPTH_LIMIT {
            errors.push(format!(
                "crawler max_depth must be <= {}",
                CrawlerConfig::MAX_DEPTH_LIMIT
            ));
        }
        if self.crawler.max_links_per_page == 0 {
            errors.push("crawler max_links_per_page must be at least 1".to_string());
        }
        if self.crawler.max_links_per_page > CrawlerConfig::MAX_LINKS_LIMIT {
            errors.push(format!(
                "crawler max_links_per_page must be <= {}",
                CrawlerConfig::MAX_LINKS_LIMIT
            ));
        }
        if self.crawler.max_concurrent_requests == 0 {
            errors.push("crawler max_concurrent_requests must be at least 1".to_string());
        }
        if self.crawler.request_timeout_secs == 0 {
            errors.push("crawler request_timeout_secs must be positive".to_string());
        }
        if self.crawler.user_agent.trim().is_empty() {
            errors.push("crawler user_agent must not be empty".to_string());
        }

        if self.engines.timeout_secs == 0 {
            errors.push("engines timeout_secs must be positive".to_string());
        }

        if self.publish.primary.as_os_str().is_empty() {
            errors.push("publish primary path must not be empty".to_string());
        }
        if self.publish.mirror.as_os_str().is_empty() {
            errors.push("publish mirror path must not be empty".to_string());
        }
        if self.publish.primary == self.publish.mirror {
            errors.push("publish primary and mirror paths must differ".to_string());
        }

        if !self.http.listen_addr.is_empty() {
            if let Some(port_str) = self.http.listen_addr.rsplit(':').next() {
                if let Ok(port) = port_str.parse::<u32>() {
                    if port == 0 || port > 65535 {
                        errors.push(format!(
                            "HTTP listen port must be between 1 and 65535, got {}",
                            port
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_max_depth() {
        let mut cfg = valid_config();
        cfg.crawler.max_depth = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_depth must be at least 1"));
    }

    #[test]
    fn validate_rejects_oversized_max_depth() {
        let mut cfg = valid_config();
        cfg.crawler.max_depth = 11;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_depth must be <= 10"));
    }

    #[test]
    fn validate_accepts_limit_values() {
        let mut cfg = valid_config();
        cfg.crawler.max_depth = 10;
        cfg.crawler.max_links_per_page = 20;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_links_per_page() {
        let mut cfg = valid_config();
        cfg.crawler.max_links_per_page = 21;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_links_per_page must be <= 20"));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = valid_config();
        cfg.crawler.max_concurrent_requests = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_requests"));
    }

    #[test]
    fn validate_rejects_equal_publish_paths() {
        let mut cfg = valid_config();
        cfg.publish.primary = PathBuf::from("data/data.json");
        cfg.publish.mirror = PathBuf::from("data/data.json");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn validate_rejects_bad_http_port() {
        let mut cfg = valid_config();
        cfg.http.listen_addr = "0.0.0.0:0".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("HTTP listen port"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.crawler.max_depth = 0;
        cfg.crawler.max_links_per_page = 0;
        cfg.engines.timeout_secs = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("max_depth"));
        assert!(msg.contains("max_links_per_page"));
        assert!(msg.contains("timeout_secs"));
    }

    #[test]
    fn default_crawler_values() {
        let c = CrawlerConfig::default();
        assert_eq!(c.max_depth, 3);
        assert_eq!(c.max_links_per_page, 5);
        assert_eq!(c.request_delay_ms, 1000);
        assert_eq!(c.request_timeout_secs, 10);
        assert!(c.respect_robots);
        assert!(!c.follow_external_links);
        assert_eq!(c.max_concurrent_requests, 4);
        assert!(c.progressive);
        assert_eq!(c.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn default_engine_values() {
        let e = EnginesConfig::default();
        assert_eq!(e.timeout_secs, 600);
        assert_eq!(e.socks_host, "127.0.0.1");
        assert_eq!(e.socks_port, 9050);
    }

    #[test]
    fn config_parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
[crawler]
max_depth = 2

[publish]
primary = "a/data.json"
mirror = "b/data.json"
"#,
        )
        .unwrap();
        assert_eq!(cfg.crawler.max_depth, 2);
        assert_eq!(cfg.crawler.max_links_per_page, 5);
        assert_eq!(cfg.publish.primary, PathBuf::from("a/data.json"));
    }
}
