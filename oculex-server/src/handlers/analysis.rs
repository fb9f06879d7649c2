//! The streaming analysis endpoint.
//!
//! One multipart POST in, one long-lived SSE response out. The handler
//! drains the form into flat text fields, hands them to the orchestrator
//! on a spawned task, and bridges the orchestrator's progress channel onto
//! the response stream. When the client disconnects the receiver drops,
//! the orchestrator's next send fails, and the run winds down through the
//! same path as normal completion.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream;
use oculex_core::submission::FormFields;
use oculex_model::progress::ProgressEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::infra::AppState;

/// Events buffered between the orchestrator and a slow consumer.
const CHANNEL_CAPACITY: usize = 32;
/// Comment interval keeping idle proxies from cutting the stream during
/// the long backend call.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub async fn analyze_stream_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> impl IntoResponse {
    let form = drain_multipart(multipart).await;
    info!(fields = form.len(), "analysis submission received");

    let (tx, rx) = mpsc::channel::<ProgressEvent>(CHANNEL_CAPACITY);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let mut tx = tx;
        orchestrator.run(form, &mut tx).await;
    });

    let stream = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Some(event) => {
                let sse: Result<Event, Infallible> = Ok(match Event::default().json_data(&event) {
                    Ok(sse) => sse,
                    // ProgressEvent serialization is infallible in
                    // practice; keep the stream alive regardless.
                    Err(err) => Event::default().data(error_payload(&err.to_string())),
                });
                Some((sse, rx))
            }
            None => None,
        }
    });

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    )
}

/// Serializes a bare error message as an `error` event body; the message
/// goes through the JSON encoder so quotes and control characters cannot
/// break the framing.
fn error_payload(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Collects every text field of the multipart body.
///
/// Field-level failures stop the drain but are not fatal here; whatever is
/// missing will surface as a decode error on the stream, which is the only
/// error channel left once the response has committed to SSE.
async fn drain_multipart(mut multipart: Multipart) -> FormFields {
    let mut form = FormFields::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                match field.text().await {
                    Ok(value) => form.insert(name, value),
                    Err(err) => {
                        warn!(field = %name, error = %err, "unreadable multipart field");
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "multipart drain aborted");
                break;
            }
        }
    }
    form
}
