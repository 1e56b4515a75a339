//! Crawl scheduler
//!
//! Drives a fixed pool of worker tasks over a shared FIFO of work items.
//! Each item is a tree node whose URL still needs fetching; processing a
//! page attaches freshly-claimed outlinks as children and enqueues them.
//! Completion is detected by an exact pending counter (queued + in-flight),
//! cancellation by a watch flag observed at the dequeue, post-fetch, and
//! pre-enqueue checkpoints.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{watch, Notify};
use url::Url;

use crate::config::CrawlerConfig;
use crate::tree::{Node, NodeId, SharedTree, VisitSet};

use super::fetcher::{FetchEngine, Page};
use super::robots::RobotsGate;
use super::url_filter;

/// Receives tree snapshots as the crawl progresses. The publisher is the
/// production implementation; tests substitute collecting sinks.
pub trait SnapshotSink: Send + Sync {
    fn publish_snapshot(&self, tree: &Node);
}

/// Errors that prevent a crawl from starting at all. Everything after a
/// successful start is absorbed into error nodes.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid seed URL: {0}")]
    InvalidSeed(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Live progress counters shared with the control plane.
#[derive(Debug, Default)]
pub struct CrawlCounters {
    pages_fetched: AtomicU64,
    nodes_attached: AtomicU64,
    failures: AtomicU64,
    max_depth_seen: AtomicU64,
}

impl CrawlCounters {
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    pub fn nodes_attached(&self) -> u64 {
        self.nodes_attached.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn max_depth_seen(&self) -> u64 {
        self.max_depth_seen.load(Ordering::Relaxed)
    }

    fn note_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    fn note_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn note_attach(&self, depth: u64) {
        self.nodes_attached.fetch_add(1, Ordering::Relaxed);
        self.max_depth_seen.fetch_max(depth, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct WorkItem {
    node: NodeId,
    url: Url,
    depth: usize,
}

/// Shared FIFO with an exact pending count (queued + in-flight). When the
/// count reaches zero no further work can appear, and the `done` flag
/// releases every idle worker.
struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    notify: Notify,
    pending: AtomicUsize,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl WorkQueue {
    fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            pending: AtomicUsize::new(0),
            done_tx,
            done_rx,
        }
    }

    fn push(&self, item: WorkItem) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.lock().push_back(item);
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<WorkItem> {
        self.lock().pop_front()
    }

    /// Called once per processed item, after its children are enqueued.
    fn finish_item(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.done_tx.send(true);
        }
        // Wake a waiter in case the finished item enqueued work while every
        // other worker was already parked.
        self.notify.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkItem>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Breadth-limited hierarchical crawl over one seed.
pub struct CrawlScheduler {
    cfg: CrawlerConfig,
    seed: Url,
    fetcher: FetchEngine,
    robots: RobotsGate,
    visited: Arc<VisitSet>,
    tree: SharedTree,
    counters: Arc<CrawlCounters>,
    sink: Option<Arc<dyn SnapshotSink>>,
    /// Progressive snapshots from concurrent workers must reach the sink in
    /// snapshot order, or the published document could briefly regress.
    snapshot_lock: Mutex<()>,
    queue: WorkQueue,
}

impl std::fmt::Debug for CrawlScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlScheduler").finish_non_exhaustive()
    }
}

impl CrawlScheduler {
    /// Canonicalize the seed and set up the session state. Fails fast on an
    /// unusable seed; everything later degrades into error nodes.
    pub fn new(
        seed_url: &str,
        cfg: CrawlerConfig,
        sink: Option<Arc<dyn SnapshotSink>>,
    ) -> Result<Self, CrawlError> {
        let seed = url_filter::canonicalize_absolute(seed_url)
            .ok_or_else(|| CrawlError::InvalidSeed(seed_url.to_string()))?;

        let fetcher = FetchEngine::new(&cfg)?;
        let robots = RobotsGate::new(&cfg)?;
        let tree = SharedTree::new(seed.as_str(), seed.as_str());

        Ok(Self {
            cfg,
            seed,
            fetcher,
            robots,
            visited: Arc::new(VisitSet::new()),
            tree,
            counters: Arc::new(CrawlCounters::default()),
            sink,
            snapshot_lock: Mutex::new(()),
            queue: WorkQueue::new(),
        })
    }

    pub fn counters(&self) -> Arc<CrawlCounters> {
        Arc::clone(&self.counters)
    }

    pub fn visited(&self) -> Arc<VisitSet> {
        Arc::clone(&self.visited)
    }

    /// Run the crawl to completion or cancellation, returning the final
    /// snapshot (which has also been published through the sink).
    pub async fn run(self: Arc<Self>, cancel: watch::Receiver<bool>) -> Node {
        self.visited.claim(self.seed.as_str());
        self.queue.push(WorkItem {
            node: self.tree.root_id(),
            url: self.seed.clone(),
            depth: 0,
        });

        let workers = self.cfg.max_concurrent_requests.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let sched = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                sched.worker_loop(worker, cancel).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        let snapshot = self.tree.snapshot();
        self.publish(&snapshot);
        tracing::info!(
            pages = self.counters.pages_fetched(),
            nodes = self.tree.len(),
            failures = self.counters.failures(),
            "crawl finished for {}",
            self.seed
        );
        snapshot
    }

    async fn worker_loop(&self, worker: usize, mut cancel: watch::Receiver<bool>) {
        let mut done = self.queue.done_rx.clone();
        loop {
            if *cancel.borrow() {
                break;
            }
            let Some(item) = self.next_item(&mut cancel, &mut done).await else {
                break;
            };
            tracing::debug!(worker, depth = item.depth, "processing {}", item.url);
            self.process(item, &cancel).await;
            self.queue.finish_item();
        }
    }

    async fn next_item(
        &self,
        cancel: &mut watch::Receiver<bool>,
        done: &mut watch::Receiver<bool>,
    ) -> Option<WorkItem> {
        loop {
            if let Some(item) = self.queue.try_pop() {
                return Some(item);
            }
            if self.queue.pending.load(Ordering::SeqCst) == 0 {
                return None;
            }
            tokio::select! {
                biased;
                _ = cancel.changed() => return None,
                _ = done.changed() => return None,
                _ = self.queue.notify.notified() => {}
            }
        }
    }

    /// Process one work item: robots gate, fetch, attach accepted outlinks.
    /// Per-page failures mark the node and never escape.
    async fn process(&self, item: WorkItem, cancel: &watch::Receiver<bool>) {
        if !self.robots.allowed(&item.url).await {
            self.fail_node(&item, "robots_denied", &format!("Blocked by robots.txt: {}", item.url));
            return;
        }

        let page = match self.fetcher.fetch(&item.url).await {
            Ok(page) => page,
            Err(e) => {
                self.fail_node(&item, e.reason(), &format!("Fetch failed for {}: {}", item.url, e));
                return;
            }
        };
        self.counters.note_page();

        if item.depth == 0 {
            self.tree
                .set_root_name(page.title.as_deref().unwrap_or(self.seed.as_str()));
        }

        // A cancelled worker may finish its fetch but must not grow the tree.
        if *cancel.borrow() {
            return;
        }

        // The deepest attachable node sits at max_depth - 1.
        if item.depth + 1 >= self.cfg.max_depth {
            if item.depth == 0 {
                self.publish_progressive();
            }
            return;
        }

        let mut attached = false;
        for url in select_links(&page, &self.seed, &self.cfg) {
            if *cancel.borrow() {
                break;
            }
            if !self.visited.claim(url.as_str()) {
                continue;
            }
            let child = self
                .tree
                .attach(item.node, url.as_str(), url.as_str(), item.depth + 1);
            self.counters.note_attach((item.depth + 1) as u64);
            attached = true;
            self.queue.push(WorkItem {
                node: child,
                url,
                depth: item.depth + 1,
            });
        }

        if attached || item.depth == 0 {
            self.publish_progressive();
        }
    }

    fn fail_node(&self, item: &WorkItem, reason: &str, detail: &str) {
        tracing::warn!("{detail}");
        self.tree.mark_failure(item.node, reason, detail);
        self.counters.note_failure();
        self.publish_progressive();
    }

    fn publish_progressive(&self) {
        if self.cfg.progressive && self.sink.is_some() {
            let _guard = self
                .snapshot_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.publish(&self.tree.snapshot());
        }
    }

    fn publish(&self, snapshot: &Node) {
        if let Some(sink) = &self.sink {
            sink.publish_snapshot(snapshot);
        }
    }
}

/// Select up to `max_links_per_page` crawlable outlinks from a page, in
/// document order. Acceptance is canonicalization plus the same-host policy;
/// duplicates count toward the cap and are dropped later by the visit set.
fn select_links(page: &Page, seed: &Url, cfg: &CrawlerConfig) -> Vec<Url> {
    let mut accepted = Vec::new();
    for href in &page.links {
        if accepted.len() >= cfg.max_links_per_page {
            break;
        }
        let Some(url) = url_filter::canonicalize(&page.final_url, href) else {
            continue;
        };
        if !cfg.follow_external_links && !url_filter::same_host(seed, &url) {
            continue;
        }
        accepted.push(url);
    }
    accepted
}
