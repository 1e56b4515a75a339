//! Engine supervisor
//!
//! Owns the four engine slots, enforces global exclusivity (at most one
//! running or stopping slot), and performs the session reset every start
//! requires: a fresh visit set and counters, and both published documents
//! truncated to the empty tree so the visualizer clears immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::adapters::OsintStats;
use crate::config::Config;
use crate::crawl::{CrawlCounters, CrawlError, CrawlScheduler, SnapshotSink};
use crate::crawl::url_filter;
use crate::publish::Publisher;
use crate::tree::Node;

use super::external::{self, ArtifactKind, EngineError, ExternalCommand, TorBotParams};
use super::tor::TorProxy;
use super::{EngineSlot, SlotStatus};

/// Errors surfaced to the control plane when a start is refused.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Another slot is running or stopping.
    #[error("busy")]
    Busy,
    /// Bad client input.
    #[error("{0}")]
    Validation(String),
    /// The engine could not be brought up.
    #[error("{0}")]
    Engine(String),
}

/// HTTP crawler start parameters.
#[derive(Debug, Clone)]
pub struct HttpCrawlParams {
    pub url: String,
    pub max_depth: Option<usize>,
    pub max_links_per_page: Option<usize>,
    pub progressive: Option<bool>,
}

/// TOC start parameters.
#[derive(Debug, Clone)]
pub struct TocParams {
    pub url: String,
    pub socks_host: Option<String>,
    pub socks_port: Option<u16>,
}

/// OnionSearch start parameters.
#[derive(Debug, Clone)]
pub struct OnionSearchParams {
    pub query: String,
    pub engines: Vec<String>,
    pub limit: Option<usize>,
}

/// TorBot start parameters as accepted by the API.
#[derive(Debug, Clone)]
pub struct TorBotStartParams {
    pub url: String,
    pub depth: Option<usize>,
    pub socks_host: Option<String>,
    pub socks_port: Option<u16>,
    pub disable_socks5: bool,
    pub info_mode: bool,
    pub output_format: Option<String>,
}

/// One engine run. Dropped when the slot returns to rest.
#[derive(Debug)]
struct Session {
    id: Uuid,
    slot: EngineSlot,
    started_at: DateTime<Utc>,
    cancel_tx: watch::Sender<bool>,
    crawl_counters: Option<Arc<CrawlCounters>>,
    osint_stats: Mutex<Option<OsintStats>>,
}

impl Session {
    fn set_osint_stats(&self, stats: OsintStats) {
        *self.osint_stats.lock().unwrap_or_else(|p| p.into_inner()) = Some(stats);
    }

    fn osint_stats(&self) -> Option<OsintStats> {
        *self.osint_stats.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, Default)]
struct SlotCell {
    status: Option<SlotStatus>,
    last_error: Option<String>,
}

struct State {
    slots: [SlotCell; 4],
    session: Option<Arc<Session>>,
    last_error: Option<String>,
    last_osint_stats: Option<OsintStats>,
}

impl State {
    fn new() -> Self {
        Self {
            slots: Default::default(),
            session: None,
            last_error: None,
            last_osint_stats: None,
        }
    }

    fn cell(&self, slot: EngineSlot) -> &SlotCell {
        &self.slots[Self::idx(slot)]
    }

    fn cell_mut(&mut self, slot: EngineSlot) -> &mut SlotCell {
        &mut self.slots[Self::idx(slot)]
    }

    fn status(&self, slot: EngineSlot) -> SlotStatus {
        self.cell(slot).status.unwrap_or(SlotStatus::Idle)
    }

    fn any_active(&self) -> bool {
        EngineSlot::ALL.iter().any(|&s| self.status(s).is_active())
    }

    fn active_slot(&self) -> Option<EngineSlot> {
        EngineSlot::ALL.iter().copied().find(|&s| self.status(s).is_active())
    }

    fn idx(slot: EngineSlot) -> usize {
        match slot {
            EngineSlot::Http => 0,
            EngineSlot::Toc => 1,
            EngineSlot::OnionSearch => 2,
            EngineSlot::TorBot => 3,
        }
    }
}

/// Per-slot view in a status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub slot: EngineSlot,
    pub status: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Crawl progress counters in serializable form.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountersView {
    pub pages_fetched: u64,
    pub nodes_attached: u64,
    pub failures: u64,
    pub max_depth: u64,
}

/// Snapshot of the whole supervisor, read by the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<EngineSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<CountersView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub slots: Vec<SlotView>,
}

/// TorBot live counters for the progress endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TorBotProgress {
    pub status: &'static str,
    pub links: u64,
    pub emails: u64,
    pub phones: u64,
    pub depth: u64,
}

/// Process-wide engine registry and lifecycle authority.
pub struct EngineSupervisor {
    config: Config,
    publisher: Arc<Publisher>,
    state: Mutex<State>,
}

impl EngineSupervisor {
    pub fn new(config: Config, publisher: Arc<Publisher>) -> Self {
        Self {
            config,
            publisher,
            state: Mutex::new(State::new()),
        }
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Start the HTTP crawler. Returns once the slot is running; the crawl
    /// itself proceeds in a background task.
    pub fn start_http(self: &Arc<Self>, params: HttpCrawlParams) -> Result<Uuid, SupervisorError> {
        let seed = validate_http_url(&params.url)?;

        let cfg = self.config.crawler.with_overrides(
            params.max_depth,
            params.max_links_per_page,
            params.progressive,
        );
        let sink: Arc<dyn SnapshotSink> = Arc::clone(&self.publisher) as Arc<dyn SnapshotSink>;
        let scheduler = CrawlScheduler::new(&seed, cfg, Some(sink)).map_err(|e| match e {
            CrawlError::InvalidSeed(url) => {
                SupervisorError::Validation(format!("invalid URL: {url}"))
            }
            CrawlError::Client(e) => SupervisorError::Engine(format!("HTTP client setup failed: {e}")),
        })?;

        let counters = scheduler.counters();
        let (session, cancel_rx) = self.begin(EngineSlot::Http, Some(counters))?;
        let session_id = session.id;

        let supervisor = Arc::clone(self);
        let scheduler = Arc::new(scheduler);
        tokio::spawn(async move {
            // Per-page failures become error nodes inside the crawl; the
            // slot itself only errors on publish problems, and those are
            // already logged by the sink.
            scheduler.run(cancel_rx).await;
            supervisor.finish(EngineSlot::Http, Ok(()));
        });

        tracing::info!("HTTP crawl session {session_id} started for {seed}");
        Ok(session_id)
    }

    /// Start the TOC deep crawler subprocess.
    pub fn start_toc(self: &Arc<Self>, params: TocParams) -> Result<Uuid, SupervisorError> {
        let url = validate_http_url(&params.url)?;
        require_onion_host(&url)?;

        let command = external::toc_command(&self.config.engines, &url);
        self.spawn_external(
            EngineSlot::Toc,
            command,
            ArtifactKind::TreeJson,
            self.socks_endpoint(params.socks_host, params.socks_port),
        )
    }

    /// Start the OnionSearch subprocess.
    pub fn start_onionsearch(
        self: &Arc<Self>,
        params: OnionSearchParams,
    ) -> Result<Uuid, SupervisorError> {
        let query = params.query.trim().to_string();
        if query.is_empty() {
            return Err(SupervisorError::Validation("query is required".to_string()));
        }

        let command = external::onionsearch_command(
            &self.config.engines,
            &query,
            &params.engines,
            params.limit,
        );
        self.spawn_external(
            EngineSlot::OnionSearch,
            command,
            ArtifactKind::SearchCsv { query },
            self.socks_endpoint(None, None),
        )
    }

    /// Start the TorBot OSINT subprocess.
    pub fn start_torbot(self: &Arc<Self>, params: TorBotStartParams) -> Result<Uuid, SupervisorError> {
        let url = validate_http_url(&params.url)?;

        let socks_host = params
            .socks_host
            .clone()
            .unwrap_or_else(|| self.config.engines.socks_host.clone());
        let socks_port = params.socks_port.unwrap_or(self.config.engines.socks_port);

        let torbot = TorBotParams {
            url: url.clone(),
            depth: params.depth.unwrap_or(2),
            socks_host: socks_host.clone(),
            socks_port,
            disable_socks5: params.disable_socks5,
            info_mode: params.info_mode,
            output_format: params.output_format.unwrap_or_else(|| "json".to_string()),
        };
        let command = external::torbot_command(&self.config.engines, &torbot);
        self.spawn_external(
            EngineSlot::TorBot,
            command,
            ArtifactKind::OsintJson { starting_url: url },
            (socks_host, socks_port),
        )
    }

    /// Signal cancellation for a running slot. Returns immediately; poll
    /// status to observe the stopping → idle transition.
    pub fn stop(&self, slot: EngineSlot) -> bool {
        let mut state = self.lock();
        if state.status(slot) != SlotStatus::Running {
            return false;
        }
        state.cell_mut(slot).status = Some(SlotStatus::Stopping);
        if let Some(session) = &state.session {
            if session.slot == slot {
                let _ = session.cancel_tx.send(true);
            }
        }
        tracing::info!("stop requested for {slot} slot");
        true
    }

    /// Snapshot of slot statuses and the active session.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.lock();
        let active = state.active_slot();
        let session = state.session.as_ref();

        StatusSnapshot {
            running: active.is_some(),
            slot: active,
            session_id: session.map(|s| s.id),
            started_at: session.map(|s| s.started_at),
            counters: session.and_then(|s| s.crawl_counters.as_ref()).map(|c| CountersView {
                pages_fetched: c.pages_fetched(),
                nodes_attached: c.nodes_attached(),
                failures: c.failures(),
                max_depth: c.max_depth_seen(),
            }),
            last_error: state.last_error.clone(),
            slots: EngineSlot::ALL
                .iter()
                .map(|&slot| SlotView {
                    slot,
                    status: state.status(slot),
                    last_error: state.cell(slot).last_error.clone(),
                })
                .collect(),
        }
    }

    /// Live counters for the torbot slot.
    pub fn torbot_progress(&self) -> TorBotProgress {
        let state = self.lock();
        let stats_of = |stats: Option<OsintStats>| stats.unwrap_or_default();

        match state.status(EngineSlot::TorBot) {
            SlotStatus::Running | SlotStatus::Stopping => {
                let stats = stats_of(state.session.as_ref().and_then(|s| s.osint_stats()));
                TorBotProgress {
                    status: "running",
                    links: stats.links,
                    emails: stats.emails,
                    phones: stats.phones,
                    depth: stats.depth,
                }
            }
            SlotStatus::Error => TorBotProgress {
                status: "error",
                links: 0,
                emails: 0,
                phones: 0,
                depth: 0,
            },
            SlotStatus::Idle => match state.last_osint_stats {
                Some(stats) => TorBotProgress {
                    status: "completed",
                    links: stats.links,
                    emails: stats.emails,
                    phones: stats.phones,
                    depth: stats.depth,
                },
                None => TorBotProgress {
                    status: "idle",
                    links: 0,
                    emails: 0,
                    phones: 0,
                    depth: 0,
                },
            },
        }
    }

    /// Cancel any running engine and wait for drain, bounded by `grace`.
    /// Subprocesses die with their task (kill-on-drop); the wait here is for
    /// slot bookkeeping to settle.
    pub async fn shutdown(&self, grace: Duration) {
        let active = {
            let mut state = self.lock();
            let active = state.active_slot();
            if let Some(slot) = active {
                state.cell_mut(slot).status = Some(SlotStatus::Stopping);
                if let Some(session) = &state.session {
                    let _ = session.cancel_tx.send(true);
                }
            }
            active
        };
        let Some(slot) = active else { return };

        tracing::info!("waiting for {slot} slot to drain");
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if !self.lock().any_active() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("{slot} slot did not drain within {grace:?}");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn spawn_external(
        self: &Arc<Self>,
        slot: EngineSlot,
        command: ExternalCommand,
        kind: ArtifactKind,
        socks: (String, u16),
    ) -> Result<Uuid, SupervisorError> {
        let (session, cancel_rx) = self.begin(slot, None)?;
        let session_id = session.id;
        let timeout = self.config.engines.timeout();
        let supervisor = Arc::clone(self);
        let publisher = Arc::clone(&self.publisher);

        tokio::spawn(async move {
            let proxy = TorProxy::new(socks.0, socks.1);
            if !proxy.check_running().await {
                tracing::warn!(
                    "Tor SOCKS endpoint {} unreachable; {slot} may fail",
                    proxy.endpoint()
                );
            }

            let outcome = match external::run_to_tree(command, kind, timeout, cancel_rx).await {
                Ok((tree, stats)) => {
                    if let Some(stats) = stats {
                        session.set_osint_stats(stats);
                    }
                    publish_result(&publisher, &tree)
                }
                Err(EngineError::Cancelled) => Ok(()),
                Err(e) => Err(e.to_string()),
            };
            supervisor.finish(slot, outcome);
        });

        tracing::info!("{slot} session {session_id} started");
        Ok(session_id)
    }

    /// Transition a slot to running under the exclusivity guard and perform
    /// the session reset. The fresh visit set and counters live in the
    /// engine itself; the reset here truncates the published documents.
    fn begin(
        &self,
        slot: EngineSlot,
        crawl_counters: Option<Arc<CrawlCounters>>,
    ) -> Result<(Arc<Session>, watch::Receiver<bool>), SupervisorError> {
        let mut state = self.lock();
        if state.any_active() {
            return Err(SupervisorError::Busy);
        }

        self.publisher
            .reset()
            .map_err(|e| SupervisorError::Engine(format!("session reset failed: {e}")))?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            slot,
            started_at: Utc::now(),
            cancel_tx,
            crawl_counters,
            osint_stats: Mutex::new(None),
        });

        let cell = state.cell_mut(slot);
        cell.status = Some(SlotStatus::Running);
        cell.last_error = None;
        state.session = Some(Arc::clone(&session));
        state.last_osint_stats = None;

        Ok((session, cancel_rx))
    }

    fn finish(&self, slot: EngineSlot, result: Result<(), String>) {
        let mut state = self.lock();
        let was_stopping = state.status(slot) == SlotStatus::Stopping;

        if let Some(session) = state.session.take() {
            if let Some(stats) = session.osint_stats() {
                state.last_osint_stats = Some(stats);
            }
        }

        match result {
            Ok(()) => {
                state.cell_mut(slot).status = Some(SlotStatus::Idle);
                tracing::info!("{slot} slot finished");
            }
            Err(e) if was_stopping => {
                // A cancelled engine reports whatever it was doing when the
                // signal landed; after a requested stop that's a clean exit.
                tracing::info!("{slot} slot stopped: {e}");
                state.cell_mut(slot).status = Some(SlotStatus::Idle);
            }
            Err(e) => {
                tracing::error!("{slot} slot failed: {e}");
                let cell = state.cell_mut(slot);
                cell.status = Some(SlotStatus::Error);
                cell.last_error = Some(e.clone());
                state.last_error = Some(e);
            }
        }
    }

    fn socks_endpoint(&self, host: Option<String>, port: Option<u16>) -> (String, u16) {
        (
            host.unwrap_or_else(|| self.config.engines.socks_host.clone()),
            port.unwrap_or(self.config.engines.socks_port),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn publish_result(publisher: &Publisher, tree: &Node) -> Result<(), String> {
    publisher
        .publish(tree)
        .map_err(|e| format!("publish failed: {e}"))
}

fn validate_http_url(raw: &str) -> Result<String, SupervisorError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SupervisorError::Validation("url is required".to_string()));
    }
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(SupervisorError::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    match url_filter::canonicalize_absolute(raw) {
        Some(url) => Ok(url.to_string()),
        None => Err(SupervisorError::Validation(format!("invalid URL: {raw}"))),
    }
}

fn require_onion_host(url: &str) -> Result<(), SupervisorError> {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    if host.ends_with(".onion") {
        Ok(())
    } else {
        Err(SupervisorError::Validation(
            "Please provide a valid .onion URL".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor(dir: &TempDir) -> Arc<EngineSupervisor> {
        let publisher = Arc::new(Publisher::new(
            dir.path().join("data/data.json"),
            dir.path().join("frontend/data/data.json"),
        ));
        Arc::new(EngineSupervisor::new(Config::default(), publisher))
    }

    #[test]
    fn url_validation() {
        assert!(validate_http_url("").is_err());
        assert!(validate_http_url("example.com").is_err());
        assert!(validate_http_url("ftp://h.test/").is_err());
        assert_eq!(
            validate_http_url("http://h.test/").unwrap(),
            "http://h.test/"
        );
    }

    #[test]
    fn onion_host_requirement() {
        assert!(require_onion_host("http://abc.onion/").is_ok());
        assert!(require_onion_host("http://h.test/").is_err());
    }

    #[tokio::test]
    async fn begin_enforces_global_exclusivity() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let (_session, _rx) = supervisor.begin(EngineSlot::Http, None).unwrap();
        let err = supervisor.begin(EngineSlot::Toc, None).unwrap_err();
        assert!(matches!(err, SupervisorError::Busy));

        // The exclusivity violation leaves the running slot untouched.
        let status = supervisor.status();
        assert!(status.running);
        assert_eq!(status.slot, Some(EngineSlot::Http));
    }

    #[tokio::test]
    async fn begin_resets_published_documents() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let mut tree = Node::new("old", 0, "http://h.test/", "");
        tree.children.push(Node::new("child", 1, "http://h.test/a", ""));
        supervisor.publisher().publish(&tree).unwrap();

        let (_session, _rx) = supervisor.begin(EngineSlot::Http, None).unwrap();

        let doc: Node = serde_json::from_slice(
            &std::fs::read(supervisor.publisher().primary_path()).unwrap(),
        )
        .unwrap();
        assert_eq!(doc, Node::empty_root());
        assert!(supervisor.publisher().sync_status().hashes_equal);
    }

    #[tokio::test]
    async fn finish_transitions_to_idle_or_error() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let (_s, _rx) = supervisor.begin(EngineSlot::Toc, None).unwrap();
        supervisor.finish(EngineSlot::Toc, Err("boom".to_string()));
        let status = supervisor.status();
        assert!(!status.running);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
        let toc = status.slots.iter().find(|s| s.slot == EngineSlot::Toc).unwrap();
        assert_eq!(toc.status, SlotStatus::Error);

        // An errored slot is startable again.
        let (_s, _rx) = supervisor.begin(EngineSlot::Toc, None).unwrap();
        supervisor.finish(EngineSlot::Toc, Ok(()));
        let status = supervisor.status();
        let toc = status.slots.iter().find(|s| s.slot == EngineSlot::Toc).unwrap();
        assert_eq!(toc.status, SlotStatus::Idle);
    }

    #[tokio::test]
    async fn stop_marks_slot_stopping_and_signals_cancel() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let (_session, mut rx) = supervisor.begin(EngineSlot::Http, None).unwrap();
        assert!(supervisor.stop(EngineSlot::Http));
        assert!(*rx.borrow_and_update());

        let status = supervisor.status();
        assert!(status.running); // stopping still holds exclusivity
        let http = status.slots.iter().find(|s| s.slot == EngineSlot::Http).unwrap();
        assert_eq!(http.status, SlotStatus::Stopping);

        // A failure reported after a requested stop is a clean exit.
        supervisor.finish(EngineSlot::Http, Err("cancelled mid-flight".to_string()));
        let status = supervisor.status();
        assert!(!status.running);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn stop_on_an_idle_slot_reports_not_running() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);
        assert!(!supervisor.stop(EngineSlot::TorBot));
    }

    #[tokio::test]
    async fn start_http_validates_before_touching_state() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let err = supervisor
            .start_http(HttpCrawlParams {
                url: "notaurl".to_string(),
                max_depth: None,
                max_links_per_page: None,
                progressive: None,
            })
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Validation(_)));
        assert!(!supervisor.status().running);
    }

    #[tokio::test]
    async fn torbot_progress_tracks_slot_state() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        assert_eq!(supervisor.torbot_progress().status, "idle");

        let (session, _rx) = supervisor.begin(EngineSlot::TorBot, None).unwrap();
        assert_eq!(supervisor.torbot_progress().status, "running");

        session.set_osint_stats(OsintStats {
            links: 7,
            emails: 2,
            phones: 1,
            depth: 2,
        });
        let progress = supervisor.torbot_progress();
        assert_eq!(progress.links, 7);

        supervisor.finish(EngineSlot::TorBot, Ok(()));
        let progress = supervisor.torbot_progress();
        assert_eq!(progress.status, "completed");
        assert_eq!(progress.emails, 2);
    }
}
