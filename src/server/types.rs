//! Control-plane request/response types
//!
//! Every response carries `success`; failures add `error`. Request bodies
//! mirror the operator-facing API of the original system.

use serde::{Deserialize, Serialize};

use crate::engines::supervisor::{StatusSnapshot, TorBotProgress};
use crate::publish::SyncStatus;

/// `POST /api/start` body
#[derive(Debug, Clone, Deserialize)]
pub struct StartCrawlRequest {
    pub url: String,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_links_per_page: Option<usize>,
    #[serde(default)]
    pub progressive: Option<bool>,
}

/// `POST /api/toc/start` body
#[derive(Debug, Clone, Deserialize)]
pub struct TocStartRequest {
    pub url: String,
    #[serde(default)]
    pub socks_host: Option<String>,
    #[serde(default)]
    pub socks_port: Option<u16>,
}

/// `POST /api/onionsearch/start` body
#[derive(Debug, Clone, Deserialize)]
pub struct OnionSearchStartRequest {
    pub query: String,
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `POST /api/torbot/start` body
#[derive(Debug, Clone, Deserialize)]
pub struct TorBotStartRequest {
    pub url: String,
    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub socks_host: Option<String>,
    #[serde(default)]
    pub socks_port: Option<u16>,
    #[serde(default)]
    pub disable_socks5: bool,
    #[serde(default)]
    pub info_mode: bool,
    #[serde(default)]
    pub output_format: Option<String>,
}

/// Engine start acknowledgement
#[derive(Debug, Clone, Serialize)]
pub struct StartedResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Failure payload
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// `GET /api/status` payload
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: StatusSnapshot,
}

/// `GET /api/torbot/progress` payload
#[derive(Debug, Clone, Serialize)]
pub struct TorBotProgressResponse {
    pub success: bool,
    #[serde(flatten)]
    pub progress: TorBotProgress,
}

/// `GET /api/sync/status` and `POST /api/sync/force` payload
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: SyncStatus,
}
