//! Breadth-limited hierarchical HTTP crawler
//!
//! The crawl pipeline: canonicalize and filter URLs, gate on robots.txt,
//! fetch under per-host pacing, and grow the session tree with a bounded
//! worker pool.
//!
//! Key components:
//! - `url_filter`: canonicalization, suffix denylist, same-host policy
//! - `fetcher`: paced HTTP fetching with a typed failure taxonomy
//! - `robots`: per-host robots.txt verdict cache
//! - `scheduler`: the worker pool driving the crawl

pub mod fetcher;
pub mod robots;
pub mod scheduler;
pub mod url_filter;

pub use fetcher::{FetchEngine, FetchError, Page};
pub use robots::RobotsGate;
pub use scheduler::{CrawlCounters, CrawlError, CrawlScheduler, SnapshotSink};
