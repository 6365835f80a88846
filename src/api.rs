//! HTTP surface (spec §6) — axum routes wiring the orchestrator and session
//! registry behind an `X-API-Key` gate.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::core::config::ProxyConfig;
use crate::core::error::ProxyError;
use crate::core::types::{
    ErrorEnvelope, HealthResponse, RequestDescriptor, SessionCookiesResponse, SessionCreatedResponse,
    SessionDeletedResponse,
};
use crate::orchestrator::Orchestrator;
use crate::session::SessionRegistry;

pub struct AppState {
    pub config: ProxyConfig,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.session_ttl, config.max_sessions));
        Self { config, registry }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/proxy/request", post(proxy_request))
        .route("/proxy/session/create", post(create_session))
        .route("/proxy/session/{id}", delete(delete_session))
        .route("/proxy/session/{id}/cookies", get(session_cookies))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if state.config.api_key.is_empty() {
        return next.run(request).await;
    }
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(state.config.api_key.as_str()) {
        next.run(request).await
    } else {
        warn!("api: rejected request with missing or invalid X-API-Key");
        error_response(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid X-API-Key")
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.registry.active_count().await,
        max_sessions: state.config.max_sessions,
        session_ttl_secs: state.config.session_ttl.as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn proxy_request(State(state): State<Arc<AppState>>, Json(req): Json<RequestDescriptor>) -> Response {
    let orchestrator = Orchestrator::new(&state.registry, request_timeout(&state));
    match orchestrator.handle(req).await {
        Ok(descriptor) => Json(descriptor).into_response(),
        Err(e) => {
            error!("api: proxy_request failed: {}", e);
            error_response(e.status_code(), e.kind(), &e.to_string())
        }
    }
}

async fn create_session(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.create().await {
        Ok(session_id) => Json(SessionCreatedResponse {
            session_id,
            message: "session created",
        })
        .into_response(),
        Err(e) => error_response(e.status_code(), e.kind(), &e.to_string()),
    }
}

async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.registry.delete(&id).await {
        Ok(()) => Json(SessionDeletedResponse {
            session_id: id,
            message: "session deleted",
        })
        .into_response(),
        // The registry's delete is idempotent (spec §4.5); the HTTP contract
        // is not — a repeat delete of an already-gone handle surfaces as the
        // ordinary session_not_found 404 (spec §11).
        Err(e) => error_response(e.status_code(), e.kind(), &e.to_string()),
    }
}

async fn session_cookies(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.registry.cookies(&id).await {
        Ok(cookies) => Json(SessionCookiesResponse {
            session_id: id,
            cookies,
        })
        .into_response(),
        Err(e) => error_response(e.status_code(), e.kind(), &e.to_string()),
    }
}

fn request_timeout(state: &AppState) -> Duration {
    state.config.request_timeout
}

fn error_response(status: StatusCode, kind: &str, detail: &str) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            error: kind.to_string(),
            detail: detail.to_string(),
        }),
    )
        .into_response()
}
