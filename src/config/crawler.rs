//! HTTP crawler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DEFAULT_USER_AGENT;

/// Configuration for the breadth-limited HTTP crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum crawl depth from the seed (1 fetches the seed only)
    pub max_depth: usize,
    /// Maximum accepted outlinks per page
    pub max_links_per_page: usize,
    /// Minimum interval between fetches of the same host (milliseconds)
    pub request_delay_ms: u64,
    /// Whole-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
    /// Consult robots.txt before fetching
    pub respect_robots: bool,
    /// Follow links off the seed host
    pub follow_external_links: bool,
    /// Size of the crawl worker pool
    pub max_concurrent_requests: usize,
    /// Publish a snapshot after each page's attachments
    pub progressive: bool,
    /// Per-host robots.txt verdict cache capacity
    pub robots_cache_size: usize,
}

impl CrawlerConfig {
    /// Hard limit on configurable depth
    pub const MAX_DEPTH_LIMIT: usize = 10;
    /// Hard limit on accepted links per page
    pub const MAX_LINKS_LIMIT: usize = 20;

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply per-request overrides from an API start call, clamped to the
    /// hard limits.
    pub fn with_overrides(
        &self,
        max_depth: Option<usize>,
        max_links_per_page: Option<usize>,
        progressive: Option<bool>,
    ) -> Self {
        let mut cfg = self.clone();
        if let Some(depth) = max_depth {
            cfg.max_depth = depth.clamp(1, Self::MAX_DEPTH_LIMIT);
        }
        if let Some(links) = max_links_per_page {
            cfg.max_links_per_page = links.clamp(1, Self::MAX_LINKS_LIMIT);
        }
        if let Some(progressive) = progressive {
            cfg.progressive = progressive;
        }
        cfg
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_links_per_page: 5,
            request_delay_ms: 1000,
            request_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            respect_robots: true,
            follow_external_links: false,
            max_concurrent_requests: 4,
            progressive: true,
            robots_cache_size: 1024,
        }
    }
}
