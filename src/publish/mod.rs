//! Publication pipeline
//!
//! Serializes the canonical tree and writes it atomically to the primary
//! document path, then mirrors it to the location the visualizer polls.
//! Both writes go through temp-file-then-rename so the visualizer never
//! observes a torn document.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::crawl::SnapshotSink;
use crate::tree::Node;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result of a mirror comparison.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub primary_exists: bool,
    pub mirror_exists: bool,
    pub hashes_equal: bool,
}

/// Writes the canonical document and keeps the mirror in step. All writes
/// are serialized through one lock so concurrent publishers cannot
/// interleave primary and mirror updates.
#[derive(Debug, Clone)]
pub struct Publisher {
    primary: PathBuf,
    mirror: PathBuf,
    write_lock: std::sync::Arc<std::sync::Mutex<()>>,
}

impl Publisher {
    pub fn new(primary: impl Into<PathBuf>, mirror: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            mirror: mirror.into(),
            write_lock: std::sync::Arc::new(std::sync::Mutex::new(())),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn mirror_path(&self) -> &Path {
        &self.mirror
    }

    /// Serialize `tree` and write it to the primary path, then the mirror.
    pub fn publish(&self, tree: &Node) -> Result<(), PublishError> {
        let bytes = serde_json::to_vec_pretty(tree)?;
        let _guard = self.lock();
        self.write_with_retry(&self.primary, &bytes)?;
        self.write_with_retry(&self.mirror, &bytes)?;
        Ok(())
    }

    /// Truncate both documents to the empty-root form (session reset).
    pub fn reset(&self) -> Result<(), PublishError> {
        self.publish(&Node::empty_root())
    }

    /// Compare primary and mirror without writing.
    pub fn sync_status(&self) -> SyncStatus {
        let primary = file_hash(&self.primary);
        let mirror = file_hash(&self.mirror);
        SyncStatus {
            primary_exists: primary.is_some(),
            mirror_exists: mirror.is_some(),
            hashes_equal: match (primary, mirror) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Force one mirror pass: copy the primary over the mirror when their
    /// contents differ. Reports the state after the pass. Never writes the
    /// primary.
    pub fn sync_now(&self) -> Result<SyncStatus, PublishError> {
        let _guard = self.lock();
        let status = self.sync_status();
        if status.primary_exists && !status.hashes_equal {
            let bytes = std::fs::read(&self.primary).map_err(|source| PublishError::Write {
                path: self.primary.clone(),
                source,
            })?;
            self.write_with_retry(&self.mirror, &bytes)?;
            return Ok(self.sync_status());
        }
        Ok(status)
    }

    /// Long-running mirror watcher: polls the primary at `interval` (already
    /// clamped to >= 500 ms by config) and re-mirrors on content change.
    /// Never writes the primary.
    pub async fn watch(&self, interval: std::time::Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            "mirror watch started: {} -> {}",
            self.primary.display(),
            self.mirror.display()
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_now() {
                        tracing::warn!("mirror sync failed: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("mirror watch stopped");
                    break;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomic write with one retry (transient filesystem errors are common
    /// when the mirror directory lives on slower storage).
    fn write_with_retry(&self, path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
        if let Err(first) = write_atomic(path, bytes) {
            tracing::warn!("write to {} failed, retrying once: {first}", path.display());
            write_atomic(path, bytes).map_err(|source| PublishError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

impl SnapshotSink for Publisher {
    fn publish_snapshot(&self, tree: &Node) {
        if let Err(e) = self.publish(tree) {
            tracing::error!("progressive publish failed: {e}");
        }
    }
}

/// Write via a temp file in the target directory followed by a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn file_hash(path: &Path) -> Option<u64> {
    std::fs::read(path)
        .ok()
        .map(|bytes| xxhash_rust::xxh3::xxh3_64(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeType;
    use tempfile::TempDir;

    fn publisher(dir: &TempDir) -> Publisher {
        Publisher::new(
            dir.path().join("data/data.json"),
            dir.path().join("frontend/data/data.json"),
        )
    }

    fn sample_tree() -> Node {
        let mut root = Node::new("Example", 0, "http://h.test/", "URL: http://h.test/");
        root.children
            .push(Node::new("A", 1, "http://h.test/a", "URL: http://h.test/a"));
        root
    }

    #[test]
    fn publish_writes_both_paths_identically() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher(&dir);
        publisher.publish(&sample_tree()).unwrap();

        let primary = std::fs::read(publisher.primary_path()).unwrap();
        let mirror = std::fs::read(publisher.mirror_path()).unwrap();
        assert_eq!(primary, mirror);

        let read_back: Node = serde_json::from_slice(&primary).unwrap();
        assert_eq!(read_back.name, "Example");
        assert_eq!(read_back.children.len(), 1);
    }

    #[test]
    fn publish_read_back_publish_is_byte_idempotent() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher(&dir);
        publisher.publish(&sample_tree()).unwrap();
        let first = std::fs::read(publisher.primary_path()).unwrap();

        let read_back: Node = serde_json::from_slice(&first).unwrap();
        publisher.publish(&read_back).unwrap();
        let second = std::fs::read(publisher.primary_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reset_truncates_to_the_empty_root_document() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher(&dir);
        publisher.publish(&sample_tree()).unwrap();
        publisher.reset().unwrap();

        let doc: Node = serde_json::from_slice(&std::fs::read(publisher.primary_path()).unwrap()).unwrap();
        assert_eq!(doc.name, "");
        assert_eq!(doc.node_type, NodeType::Root);
        assert!(doc.children.is_empty());
        assert!(publisher.sync_status().hashes_equal);
    }

    #[test]
    fn sync_status_reflects_divergence() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher(&dir);

        let status = publisher.sync_status();
        assert!(!status.primary_exists);
        assert!(!status.mirror_exists);
        assert!(!status.hashes_equal);

        publisher.publish(&sample_tree()).unwrap();
        assert!(publisher.sync_status().hashes_equal);

        // External change to the mirror diverges the pair.
        std::fs::write(publisher.mirror_path(), b"{}").unwrap();
        assert!(!publisher.sync_status().hashes_equal);
    }

    #[test]
    fn sync_now_remirrors_divergent_content() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher(&dir);
        publisher.publish(&sample_tree()).unwrap();
        std::fs::write(publisher.mirror_path(), b"stale").unwrap();

        let status = publisher.sync_now().unwrap();
        assert!(status.hashes_equal);
        let mirror = std::fs::read(publisher.mirror_path()).unwrap();
        let primary = std::fs::read(publisher.primary_path()).unwrap();
        assert_eq!(mirror, primary);
    }

    #[test]
    fn sync_now_without_primary_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher(&dir);
        let status = publisher.sync_now().unwrap();
        assert!(!status.primary_exists);
        assert!(!status.mirror_exists);
    }
}
