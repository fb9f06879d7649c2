//! The server-push channel abstraction the orchestrator writes to.

use async_trait::async_trait;
use oculex_model::progress::ProgressEvent;
use thiserror::Error;

/// The consumer went away; there is nobody left to report to.
///
/// The orchestrator treats this as cancellation: it stops work and runs no
/// further phases, since the connection closing is the only cancellation
/// signal the protocol has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("progress stream closed by the consumer")]
pub struct SinkClosed;

/// Accepts progress events for delivery to the client.
///
/// Implementations decide the framing (SSE lines, a test vector); the
/// orchestrator only promises ordering and a single terminal event.
#[async_trait]
pub trait ProgressSink: Send {
    async fn send(&mut self, event: ProgressEvent) -> Result<(), SinkClosed>;
}

#[async_trait]
impl ProgressSink for tokio::sync::mpsc::Sender<ProgressEvent> {
    async fn send(&mut self, event: ProgressEvent) -> Result<(), SinkClosed> {
        tokio::sync::mpsc::Sender::send(self, event)
            .await
            .map_err(|_| SinkClosed)
    }
}
