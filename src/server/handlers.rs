//! Control-plane endpoint handlers
//!
//! Thin request-validation and response-formatting layer over the
//! supervisor. Status mapping: validation and busy errors are 400, engine
//! and publish failures are 500.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::engines::supervisor::{
    HttpCrawlParams, OnionSearchParams, SupervisorError, TocParams, TorBotStartParams,
};
use crate::engines::{EngineSlot, EngineSupervisor};

use super::types::*;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<EngineSupervisor>,
}

fn started(message: &str, session_id: uuid::Uuid) -> Response {
    (
        StatusCode::OK,
        Json(StartedResponse {
            success: true,
            message: message.to_string(),
            session_id: session_id.to_string(),
        }),
    )
        .into_response()
}

fn supervisor_error(err: SupervisorError) -> Response {
    let status = match err {
        SupervisorError::Busy | SupervisorError::Validation(_) => StatusCode::BAD_REQUEST,
        SupervisorError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Missing or malformed JSON bodies become 400s whose message names the
/// offending field (serde's rejection text does).
fn body_rejection(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(rejection.body_text())),
    )
        .into_response()
}

fn stop_response(slot: EngineSlot, was_running: bool) -> Response {
    let message = if was_running {
        format!("{slot} engine stopping")
    } else {
        format!("{slot} engine is not running")
    };
    (
        StatusCode::OK,
        Json(MessageResponse {
            success: true,
            message,
        }),
    )
        .into_response()
}

/// `POST /api/start`
pub async fn start_crawl(
    State(state): State<AppState>,
    payload: Result<Json<StartCrawlRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return body_rejection(rejection),
    };
    debug!("HTTP crawl start request for {}", req.url);

    match state.supervisor.start_http(HttpCrawlParams {
        url: req.url,
        max_depth: req.max_depth,
        max_links_per_page: req.max_links_per_page,
        progressive: req.progressive,
    }) {
        Ok(id) => started("Scraping started successfully", id),
        Err(e) => supervisor_error(e),
    }
}

/// `POST /api/stop`
pub async fn stop_crawl(State(state): State<AppState>) -> Response {
    stop_response(EngineSlot::Http, state.supervisor.stop(EngineSlot::Http))
}

/// `POST /api/toc/start`
pub async fn start_toc(
    State(state): State<AppState>,
    payload: Result<Json<TocStartRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return body_rejection(rejection),
    };

    match state.supervisor.start_toc(TocParams {
        url: req.url,
        socks_host: req.socks_host,
        socks_port: req.socks_port,
    }) {
        Ok(id) => started("TOC crawling started successfully", id),
        Err(e) => supervisor_error(e),
    }
}

/// `POST /api/toc/stop`
pub async fn stop_toc(State(state): State<AppState>) -> Response {
    stop_response(EngineSlot::Toc, state.supervisor.stop(EngineSlot::Toc))
}

/// `POST /api/onionsearch/start`
pub async fn start_onionsearch(
    State(state): State<AppState>,
    payload: Result<Json<OnionSearchStartRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return body_rejection(rejection),
    };

    match state.supervisor.start_onionsearch(OnionSearchParams {
        query: req.query,
        engines: req.engines,
        limit: req.limit,
    }) {
        Ok(id) => started("OnionSearch started successfully", id),
        Err(e) => supervisor_error(e),
    }
}

/// `POST /api/onionsearch/stop`
pub async fn stop_onionsearch(State(state): State<AppState>) -> Response {
    stop_response(
        EngineSlot::OnionSearch,
        state.supervisor.stop(EngineSlot::OnionSearch),
    )
}

/// `POST /api/torbot/start`
pub async fn start_torbot(
    State(state): State<AppState>,
    payload: Result<Json<TorBotStartRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return body_rejection(rejection),
    };

    match state.supervisor.start_torbot(TorBotStartParams {
        url: req.url,
        depth: req.depth,
        socks_host: req.socks_host,
        socks_port: req.socks_port,
        disable_socks5: req.disable_socks5,
        info_mode: req.info_mode,
        output_format: req.output_format,
    }) {
        Ok(id) => started("TorBot crawling started successfully", id),
        Err(e) => supervisor_error(e),
    }
}

/// `POST /api/torbot/stop`
pub async fn stop_torbot(State(state): State<AppState>) -> Response {
    stop_response(EngineSlot::TorBot, state.supervisor.stop(EngineSlot::TorBot))
}

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            success: true,
            status: state.supervisor.status(),
        }),
    )
        .into_response()
}

/// `GET /api/torbot/progress`
pub async fn torbot_progress(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(TorBotProgressResponse {
            success: true,
            progress: state.supervisor.torbot_progress(),
        }),
    )
        .into_response()
}

/// `GET /api/sync/status`
pub async fn sync_status(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(SyncStatusResponse {
            success: true,
            status: state.supervisor.publisher().sync_status(),
        }),
    )
        .into_response()
}

/// `POST /api/sync/force`
pub async fn sync_force(State(state): State<AppState>) -> Response {
    match state.supervisor.publisher().sync_now() {
        Ok(status) => (
            StatusCode::OK,
            Json(SyncStatusResponse {
                success: true,
                status,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to synchronize data: {e}"))),
        )
            .into_response(),
    }
}
