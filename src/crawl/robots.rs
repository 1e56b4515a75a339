//! robots.txt gate
//!
//! Fetches `/robots.txt` once per host per session, caches the parsed rules,
//! and applies them against request paths. A robots document that cannot be
//! fetched defaults to allow-all.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use url::Url;

use crate::config::CrawlerConfig;

/// Parsed allow/disallow rules for one host, scoped to our user agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsRules {
    /// Parse robots.txt content, keeping the rule group that applies to
    /// `user_agent` (a specific group wins over the `*` wildcard group).
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let ua_lower = user_agent.to_lowercase();
        let mut disallow = Vec::new();
        let mut allow = Vec::new();
        let mut current_applies = false;
        let mut found_specific = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if agent == "*" {
                        current_applies = !found_specific;
                    } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                        current_applies = true;
                        if !found_specific {
                            // First specific group overrides accumulated wildcard rules.
                            disallow.clear();
                            allow.clear();
                        }
                        found_specific = true;
                    } else {
                        current_applies = false;
                    }
                }
                "disallow" if current_applies && !value.is_empty() => {
                    disallow.push(value.to_string());
                }
                "allow" if current_applies && !value.is_empty() => {
                    allow.push(value.to_string());
                }
                _ => {}
            }
        }

        Self { disallow, allow }
    }

    /// Allow-all rules, used when robots.txt itself cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Longest-match-wins; allow wins ties.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| Self::path_matches(path, p))
                .map(|p| p.len())
                .max()
                .unwrap_or(0)
        };
        longest(&self.allow) >= longest(&self.disallow)
    }

    fn path_matches(path: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        let (pattern, must_end) = match pattern.strip_suffix('$') {
            Some(p) => (p, true),
            None => (pattern, false),
        };

        if pattern.contains('*') {
            let mut pos = 0;
            for (i, part) in pattern.split('*').enumerate() {
                if part.is_empty() {
                    continue;
                }
                match path[pos..].find(part) {
                    Some(found) if i > 0 || found == 0 => pos += found + part.len(),
                    _ => return false,
                }
            }
            return !must_end || pos == path.len();
        }

        if must_end {
            path == pattern
        } else {
            path.starts_with(pattern)
        }
    }
}

/// Per-host robots.txt verdict cache. The robots document is fetched once
/// per host-session; concurrent workers hitting an uncached host await the
/// same in-flight fetch instead of re-issuing it.
pub struct RobotsGate {
    cache: Mutex<LruCache<String, RobotsRules>>,
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    client: reqwest::Client,
    user_agent: String,
    enabled: bool,
}

impl RobotsGate {
    pub fn new(cfg: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .user_agent(&cfg.user_agent)
            .build()?;

        let capacity =
            NonZeroUsize::new(cfg.robots_cache_size.max(1)).expect("max(1) is non-zero");

        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
            fetch_locks: Mutex::new(HashMap::new()),
            client,
            user_agent: cfg.user_agent.clone(),
            enabled: cfg.respect_robots,
        })
    }

    /// Whether `url` may be fetched. Always true when robots checking is
    /// disabled or the robots document is unreachable.
    pub async fn allowed(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(host) = url.host_str() else {
            return true;
        };
        let key = format!("{}://{}", url.scheme(), host);

        if let Some(rules) = self.cache.lock().await.get(&key) {
            return rules.is_allowed(url.path());
        }

        // Serialize the miss path per host: the first caller fetches, later
        // callers block on the host lock and then find the cache populated.
        let host_lock = {
            let mut locks = self.fetch_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let _fetching = host_lock.lock().await;

        if let Some(rules) = self.cache.lock().await.get(&key) {
            return rules.is_allowed(url.path());
        }

        let rules = self.fetch_rules(url.scheme(), host, url.port()).await;
        let verdict = rules.is_allowed(url.path());
        self.cache.lock().await.put(key, rules);
        verdict
    }

    async fn fetch_rules(&self, scheme: &str, host: &str, port: Option<u16>) -> RobotsRules {
        let robots_url = match port {
            Some(port) => format!("{scheme}://{host}:{port}/robots.txt"),
            None => format!("{scheme}://{host}/robots.txt"),
        };

        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => RobotsRules::parse(&body, &self.user_agent),
                Err(e) => {
                    tracing::debug!("robots.txt body read failed for {robots_url}: {e}");
                    RobotsRules::allow_all()
                }
            },
            Ok(response) => {
                tracing::debug!("robots.txt for {robots_url} returned {}", response.status());
                RobotsRules::allow_all()
            }
            Err(e) => {
                tracing::debug!("robots.txt fetch failed for {robots_url}: {e}");
                RobotsRules::allow_all()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specific_agent_group_overrides_wildcard() {
        let content = r#"
User-agent: *
Disallow: /private/

User-agent: LiveGraphScraper
Disallow: /admin/
"#;
        let rules = RobotsRules::parse(content, "LiveGraphScraper/1.0");
        assert!(rules.is_allowed("/public/page"));
        assert!(!rules.is_allowed("/admin/settings"));
        // The wildcard group's rule does not apply to the specific agent.
        assert!(rules.is_allowed("/private/page"));
    }

    #[test]
    fn allow_wins_longest_match() {
        let content = r#"
User-agent: *
Disallow: /private/
Allow: /private/readme
"#;
        let rules = RobotsRules::parse(content, "AnyBot");
        assert!(!rules.is_allowed("/private/secret"));
        assert!(rules.is_allowed("/private/readme"));
        assert!(rules.is_allowed("/other"));
    }

    #[test]
    fn wildcard_and_end_anchor_patterns() {
        let content = r#"
User-agent: *
Disallow: /*.php$
Disallow: /images/*.bin
"#;
        let rules = RobotsRules::parse(content, "AnyBot");
        assert!(!rules.is_allowed("/index.php"));
        assert!(rules.is_allowed("/index.php?x=1"));
        assert!(!rules.is_allowed("/images/cat.bin"));
        assert!(rules.is_allowed("/docs/cat.bin"));
    }

    #[test]
    fn empty_rules_allow_everything() {
        let rules = RobotsRules::allow_all();
        assert!(rules.is_allowed("/anything"));
        assert!(rules.is_allowed("/"));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let content = "# nothing to see\n\nUser-agent: *\n# still nothing\nDisallow: /x\n";
        let rules = RobotsRules::parse(content, "AnyBot");
        assert!(!rules.is_allowed("/x/y"));
        assert!(rules.is_allowed("/y"));
    }

    #[tokio::test]
    async fn robots_fetch_is_single_flight_per_host() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/robots.txt",
            axum::routing::get(move || {
                let hits = Arc::clone(&hits_handler);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "User-agent: *\nDisallow: /private/\n"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let gate = Arc::new(RobotsGate::new(&CrawlerConfig::default()).unwrap());
        let public = Url::parse(&format!("http://{addr}/page")).unwrap();
        let private = Url::parse(&format!("http://{addr}/private/page")).unwrap();

        // Eight workers race the cold cache; only one robots.txt fetch may
        // reach the server.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let url = public.clone();
            handles.push(tokio::spawn(async move { gate.allowed(&url).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The cached rules still answer further checks without refetching.
        assert!(!gate.allowed(&private).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
