//! Liveness and readiness endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::infra::AppState;

pub async fn ping_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: database connectivity (when configured) and staging-dir
/// writability. Reports 503 with per-check detail when anything fails.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match &state.db {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => json!({ "status": "ok" }),
            Err(err) => json!({ "status": "error", "detail": err.to_string() }),
        },
        None => json!({ "status": "disabled" }),
    };

    let staging = match tokio::fs::create_dir_all(&state.staging_dir).await {
        Ok(()) => json!({ "status": "ok" }),
        Err(err) => json!({ "status": "error", "detail": err.to_string() }),
    };

    let healthy = [&database, &staging]
        .iter()
        .all(|check| check["status"] != "error");
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "checks": {
                "database": database,
                "staging": staging,
            },
        })),
    )
}
