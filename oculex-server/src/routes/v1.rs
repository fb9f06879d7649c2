use axum::Router;
use axum::routing::post;

use crate::handlers::analysis::analyze_stream_handler;
use crate::infra::AppState;

pub fn create_v1_router() -> Router<AppState> {
    Router::new().route("/analysis/sse", post(analyze_stream_handler))
}
