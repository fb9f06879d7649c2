//! # Oculex Server
//!
//! The server half of the Oculex analysis platform: accepts one multipart
//! submission per request and streams the whole receive/resolve/analyze
//! lifecycle back over Server-Sent Events, ending with the report or a
//! single error event.
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - `oculex-core` for the orchestrator, retry policy, and submission codec
//! - PostgreSQL (optional) for best-effort result persistence
//! - A hosted vision LLM API as the analysis backend

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::AppState;

/// Permissive when no origins are configured; an allow-list otherwise.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Assembles the full application router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/ping", get(handlers::health::ping_handler))
        .route("/health", get(handlers::health::health_handler))
        .merge(routes::create_api_router())
        .layer(DefaultBodyLimit::max(state.body_limit_bytes))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
