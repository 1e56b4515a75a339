//! Engine slots and supervision
//!
//! Four engines produce the canonical tree: the in-process HTTP crawler and
//! three external subprocesses (TOC, OnionSearch, TorBot). The supervisor
//! owns the slot state machine, enforces one-active-engine, and performs the
//! session reset every start requires.

pub mod external;
pub mod supervisor;
pub mod tor;

pub use supervisor::{EngineSupervisor, StatusSnapshot, SupervisorError};
pub use tor::TorProxy;

use serde::Serialize;

/// The four engine slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSlot {
    Http,
    Toc,
    OnionSearch,
    TorBot,
}

impl EngineSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Toc => "toc",
            Self::OnionSearch => "onionsearch",
            Self::TorBot => "torbot",
        }
    }

    pub const ALL: [EngineSlot; 4] = [Self::Http, Self::Toc, Self::OnionSearch, Self::TorBot];
}

impl std::fmt::Display for EngineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-slot lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Idle,
    Running,
    Stopping,
    Error,
}

impl SlotStatus {
    /// Running and stopping slots hold the global exclusivity lock.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}
