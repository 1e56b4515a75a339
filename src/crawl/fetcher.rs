//! Page fetching with per-host pacing
//!
//! One `reqwest` client shared by all workers. Each fetch reserves its
//! host's pacing slot, applies the request timeout, and classifies failures
//! into the taxonomy the scheduler maps onto error nodes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use crate::config::CrawlerConfig;

/// Why a fetch failed. Per-page failures never abort a crawl; the scheduler
/// materializes them as error nodes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("non-HTML content type: {0}")]
    NonHtml(String),
    #[error("failed to read response body")]
    Parse,
}

impl FetchError {
    /// Short machine-readable reason used in error node names.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::HttpStatus(_) => "http_status",
            Self::NonHtml(_) => "non_html",
            Self::Parse => "parse",
        }
    }
}

/// A fetched, parsed page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub final_url: Url,
    /// `<title>` text, falling back to the first `<h1>`; absent if neither.
    pub title: Option<String>,
    /// Raw `href` values of anchor elements, in document order.
    pub links: Vec<String>,
}

/// Per-host minimum-interval enforcement.
///
/// Each host has one fetch slot: an async lock whose protected value is the
/// instant the previous fetch *completed*. Acquiring the slot serializes
/// same-host fetches across the worker pool and sleeps out whatever remains
/// of the interval since that completion, so successive completed fetches of
/// one host are always at least `delay` apart.
#[derive(Debug)]
pub struct HostPacer {
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<Instant>>>>>,
    delay: Duration,
}

/// Exclusive claim on a host's fetch slot. Dropping it records the fetch
/// completion time the next claim waits from.
pub struct HostSlot {
    guard: tokio::sync::OwnedMutexGuard<Option<Instant>>,
}

impl Drop for HostSlot {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

impl HostPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            delay,
        }
    }

    /// Take the host's slot, waiting for any in-flight fetch of the same
    /// host and then for the remainder of the interval since the last
    /// completion. Returns `None` when pacing is disabled (zero delay).
    pub async fn acquire(&self, host: &str) -> Option<HostSlot> {
        if self.delay.is_zero() {
            return None;
        }
        let cell = {
            let mut hosts = self.lock();
            Arc::clone(hosts.entry(host.to_string()).or_default())
        };
        let guard = cell.lock_owned().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        Some(HostSlot { guard })
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<Option<Instant>>>>> {
        self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// HTTP fetch engine shared by the crawl workers.
pub struct FetchEngine {
    client: reqwest::Client,
    pacer: HostPacer,
    timeout: Duration,
}

impl FetchEngine {
    pub fn new(cfg: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let timeout = cfg.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(&cfg.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            pacer: HostPacer::new(cfg.request_delay()),
            timeout,
        })
    }

    /// Fetch one page under the configured timeout and pacing. The host
    /// slot is held for the duration of the request; releasing it on return
    /// records the completion the next same-host fetch is spaced from.
    pub async fn fetch(&self, url: &Url) -> Result<Page, FetchError> {
        let host = url.host_str().unwrap_or_default();
        let _slot = self.pacer.acquire(host).await;
        self.fetch_inner(url).await
    }

    async fn fetch_inner(&self, url: &Url) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(FetchError::NonHtml(content_type));
        }

        let final_url = Url::parse(response.url().as_str()).map_err(|_| FetchError::Parse)?;
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Parse
            }
        })?;

        Ok(parse_page(final_url, &body))
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }

    pub fn pacer(&self) -> &HostPacer {
        &self.pacer
    }
}

/// Parse a page body into title and anchor hrefs. Synchronous: `Html` is
/// not `Send`, so it must not live across an await point.
pub fn parse_page(final_url: Url, body: &str) -> Page {
    let document = Html::parse_document(body);

    let title_selector = Selector::parse("title").expect("static selector");
    let h1_selector = Selector::parse("h1").expect("static selector");
    let anchor_selector = Selector::parse("a[href]").expect("static selector");

    let element_text = |el: scraper::ElementRef<'_>| {
        let text = el.text().collect::<String>().trim().to_string();
        (!text.is_empty()).then_some(text)
    };

    let title = document
        .select(&title_selector)
        .next()
        .and_then(element_text)
        .or_else(|| document.select(&h1_selector).next().and_then(element_text));

    let links = document
        .select(&anchor_selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect();

    Page {
        final_url,
        title,
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_links_in_document_order() {
        let body = r#"
            <html><head><title> Example Domain </title></head>
            <body>
                <a href="/a">A</a>
                <a href="/b">B</a>
                <a href="mailto:x">mail</a>
                <a href="/c.pdf">doc</a>
                <a href="/d">D</a>
            </body></html>
        "#;
        let page = parse_page(Url::parse("http://h.test/").unwrap(), body);
        assert_eq!(page.title.as_deref(), Some("Example Domain"));
        assert_eq!(page.links, vec!["/a", "/b", "mailto:x", "/c.pdf", "/d"]);
    }

    #[test]
    fn falls_back_to_h1_then_none() {
        let page = parse_page(
            Url::parse("http://h.test/").unwrap(),
            "<html><body><h1>Heading</h1></body></html>",
        );
        assert_eq!(page.title.as_deref(), Some("Heading"));

        let page = parse_page(Url::parse("http://h.test/").unwrap(), "<html><body></body></html>");
        assert!(page.title.is_none());
    }

    #[test]
    fn empty_title_is_absent() {
        let page = parse_page(
            Url::parse("http://h.test/").unwrap(),
            "<html><head><title>   </title></head><body></body></html>",
        );
        assert!(page.title.is_none());
    }

    #[tokio::test]
    async fn pacer_spaces_fetches_from_completion() {
        let pacer = HostPacer::new(Duration::from_millis(50));

        // First claim has no predecessor and proceeds immediately; dropping
        // it records the completion the second claim must wait from.
        let slot = pacer.acquire("h.test").await;
        drop(slot);

        let start = Instant::now();
        let slot = pacer.acquire("h.test").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        drop(slot);
    }

    #[tokio::test]
    async fn concurrent_workers_space_same_host_completions() {
        const DELAY: Duration = Duration::from_millis(50);

        let pacer = Arc::new(HostPacer::new(DELAY));
        let completions = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for worker in 0..4u64 {
            let pacer = Arc::clone(&pacer);
            let completions = Arc::clone(&completions);
            handles.push(tokio::spawn(async move {
                let slot = pacer.acquire("h.test").await;
                // Fetches of uneven duration, some longer than the delay's
                // remainder, some nearly instant.
                tokio::time::sleep(Duration::from_millis(5 * worker)).await;
                drop(slot);
                completions.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = completions.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            // Wall-clock spacing between successive completed fetches of one
            // host honors the interval (small tolerance for the time between
            // the drop and the timestamp).
            assert!(gap >= Duration::from_millis(45), "completions too close: {gap:?}");
        }
    }

    #[tokio::test]
    async fn pacer_does_not_delay_distinct_hosts() {
        let pacer = HostPacer::new(Duration::from_millis(200));
        let slot = pacer.acquire("a.test").await;
        drop(slot);

        let start = Instant::now();
        let slot = pacer.acquire("b.test").await;
        assert!(start.elapsed() < Duration::from_millis(100));
        drop(slot);
    }

    #[tokio::test]
    async fn zero_delay_pacer_is_unpaced() {
        let pacer = HostPacer::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            assert!(pacer.acquire("h.test").await.is_none());
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
