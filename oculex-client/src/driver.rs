//! End-to-end submission driver: prepare frames, post, consume the stream.

use futures_util::StreamExt;
use oculex_core::frame::Frame;
use oculex_core::ports::BlobStore;
use oculex_core::submission::{EncodeError, EncodeOptions, ValidationError, encode_submission};
use oculex_core::uploader::{BatchUploader, UploadError, UploadItem};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::stream::{ProgressSpan, StreamConsumer, StreamOutcome};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("frame encoding failed: {0}")]
    Frame(#[from] oculex_core::frame::FrameError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {0} instead of a stream")]
    UnexpectedStatus(u16),
    #[error("stream ended without a terminal event")]
    NoTerminalEvent,
}

/// Talks to one Oculex server.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/v1/analysis/sse", self.base_url)
    }

    /// Posts encoded submission fields and consumes the progress stream
    /// to its end. `on_update` fires after every chunk with the remapped
    /// progress and the latest step.
    ///
    /// A stream that closes without a terminal event is an error: per the
    /// protocol that only happens on an unexpected disconnect.
    pub async fn submit(
        &self,
        fields: Vec<(String, String)>,
        span: ProgressSpan,
        mut on_update: impl FnMut(u8, Option<&str>),
    ) -> Result<StreamOutcome, ClientError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }

        let response = self.http.post(self.endpoint()).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus(status.as_u16()));
        }

        let mut consumer = StreamConsumer::new(span);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            consumer.feed(&chunk?);
            on_update(
                consumer.progress(),
                consumer.steps().last().map(String::as_str),
            );
        }
        consumer.finish();
        on_update(
            consumer.progress(),
            consumer.steps().last().map(String::as_str),
        );

        match consumer.outcome() {
            Some(outcome) => Ok(outcome.clone()),
            None => Err(ClientError::NoTerminalEvent),
        }
    }
}

/// Uploads extracted frames to blob storage under the session's prefix,
/// attaching the resulting asset to each frame so the encoder sends them
/// by reference instead of inline.
pub async fn stage_remote_frames(
    store: &dyn BlobStore,
    session_id: Uuid,
    frames: &mut [Frame],
    mut on_progress: impl FnMut(usize, usize),
) -> Result<(), ClientError> {
    let mut items = Vec::with_capacity(frames.len());
    for frame in frames.iter() {
        items.push(UploadItem {
            key: format!("sessions/{session_id}/frame_{}.png", frame.frame_number),
            bytes: frame.image.to_png()?,
            content_type: "image/png".to_string(),
            frame_number: frame.frame_number,
        });
    }

    let total = items.len();
    let assets = BatchUploader::new(store)
        .upload_all(items, |uploaded, _| {
            debug!(target: "upload", uploaded, total, "upload batch complete");
            on_progress(uploaded, total);
        })
        .await?;

    for asset in assets {
        if let Some(frame) = frames
            .iter_mut()
            .find(|f| f.frame_number == asset.frame_number)
        {
            frame.remote = Some(asset);
        }
    }
    info!(target: "upload", total, session = %session_id, "frames staged remotely");
    Ok(())
}

/// Builds the wire fields for a prepared frame set.
pub fn encode_fields(
    options: &EncodeOptions<'_>,
    frames: &[Frame],
) -> Result<Vec<(String, String)>, ClientError> {
    Ok(encode_submission(options, frames)?)
}
