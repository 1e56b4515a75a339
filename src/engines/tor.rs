//! Tor SOCKS endpoint probe
//!
//! The subprocess engines route through a local Tor SOCKS5 proxy. Before
//! launching one we probe the endpoint so an unreachable proxy shows up in
//! the logs rather than as an opaque subprocess failure.

use std::time::Duration;

use tokio::net::TcpStream;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A Tor SOCKS5 endpoint.
#[derive(Debug, Clone)]
pub struct TorProxy {
    host: String,
    port: u16,
}

impl TorProxy {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether something is listening on the SOCKS endpoint. A TCP connect
    /// is enough of a liveness signal; the engines negotiate SOCKS
    /// themselves.
    pub async fn check_running(&self) -> bool {
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((self.host.as_str(), self.port)))
                .await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn detects_a_listening_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let proxy = TorProxy::new("127.0.0.1", port);
        assert!(proxy.check_running().await);
    }

    #[tokio::test]
    async fn reports_a_dead_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let proxy = TorProxy::new("127.0.0.1", port);
        assert!(!proxy.check_running().await);
    }

    #[test]
    fn endpoint_formats_host_and_port() {
        assert_eq!(TorProxy::new("127.0.0.1", 9050).endpoint(), "127.0.0.1:9050");
    }
}
