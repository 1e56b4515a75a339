//! Control-plane HTTP server configuration

use serde::{Deserialize, Serialize};

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, `host:port`
    pub listen_addr: String,
    /// Enable permissive CORS (the visualizer is served from elsewhere)
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5000".to_string(),
            cors_enabled: true,
        }
    }
}
