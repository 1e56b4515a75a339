//! Control-plane HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::Method;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HttpConfig;
use crate::engines::EngineSupervisor;

use super::handlers::AppState;
use super::routes::create_router;

/// Axum server exposing the engine control plane.
pub struct HttpServer {
    config: HttpConfig,
    supervisor: Arc<EngineSupervisor>,
}

impl HttpServer {
    pub fn new(config: HttpConfig, supervisor: Arc<EngineSupervisor>) -> Self {
        Self { config, supervisor }
    }

    /// Run until the shutdown channel fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .context("Invalid HTTP listen address")?;

        let state = AppState {
            supervisor: self.supervisor.clone(),
        };

        let mut app = create_router(state);

        if self.config.cors_enabled {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .allow_origin(Any);
            app = app.layer(cors);
        }

        app = app.layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&addr)
            .await
            .context("Failed to bind HTTP server")?;

        info!("control plane listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("control plane shutting down");
            })
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen_addr_parses() {
        let addr: SocketAddr = HttpConfig::default().listen_addr.parse().unwrap();
        assert_eq!(addr.port(), 5000);
    }
}
