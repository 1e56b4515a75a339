//! Publication pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Minimum mirror poll interval; the watcher never spins faster than this.
const MIN_WATCH_INTERVAL_MS: u64 = 500;

/// Canonical document and mirror locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Primary canonical document path
    pub primary: PathBuf,
    /// Mirror path the visualizer polls
    pub mirror: PathBuf,
    /// Mirror watch poll interval (milliseconds, clamped to >= 500)
    pub watch_interval_ms: u64,
}

impl PublishConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(MIN_WATCH_INTERVAL_MS))
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            primary: PathBuf::from("data/data.json"),
            mirror: PathBuf::from("frontend/data/data.json"),
            watch_interval_ms: 1000,
        }
    }
}
