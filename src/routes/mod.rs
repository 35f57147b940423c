//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Abuse guard
        .route("/api/v1/safety/check", post(http::http_post_safety_check))
        .route("/api/v1/request/validate", post(http::http_post_request_validate))
        .route("/api/v1/usage", get(http::http_get_usage))
        // Diagnosis
        .route("/api/v1/diagnose", post(http::http_post_diagnose))
        .route("/api/v1/diagnose/weak_areas", post(http::http_post_weak_areas))
        .route("/api/v1/diagnose/suitability", post(http::http_post_suitability))
        // Hint validation + chain
        .route("/api/v1/hint/validate", post(http::http_post_hint_validate))
        .route("/api/v1/hint/autofix", post(http::http_post_hint_autofix))
        .route("/api/v1/hint/record", post(http::http_post_hint_record))
        .route("/api/v1/hint/history", get(http::http_get_hint_history))
        .route("/api/v1/hint/escalation", get(http::http_get_hint_escalation))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
