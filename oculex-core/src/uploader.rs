//! Batched blob upload with per-item transient retry.
//!
//! Uploads run in fixed-size batches; every item in a batch goes up
//! concurrently and the next batch starts only after the whole batch has
//! resolved, which keeps the progress callback honest and bounds
//! concurrent connections. This retry policy is deliberately separate
//! from the backend one: fewer patterns, uncapped delay growth, and a
//! hard stop on key collisions.

use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use oculex_model::submission::UploadedAsset;
use thiserror::Error;
use tracing::warn;

use crate::ports::{BlobError, BlobStore};

/// Items uploaded concurrently per batch.
pub const UPLOAD_BATCH_SIZE: usize = 10;
/// Retries per item on transient failures.
pub const UPLOAD_MAX_RETRIES: u32 = 3;
/// Base for the per-item backoff: `base * 2^attempt`.
pub const UPLOAD_RETRY_BASE: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of {key} failed: {source}")]
    Item { key: String, source: BlobError },
}

/// One pending upload.
pub struct UploadItem {
    /// Object key within the bucket, e.g. `sessions/<id>/frame_3.png`.
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub frame_number: u32,
}

impl fmt::Debug for UploadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadItem")
            .field("key", &self.key)
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

/// Uploads items in batches against a [`BlobStore`].
pub struct BatchUploader<'a> {
    store: &'a dyn BlobStore,
    batch_size: usize,
}

impl fmt::Debug for BatchUploader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchUploader")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl<'a> BatchUploader<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self {
            store,
            batch_size: UPLOAD_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Uploads everything, invoking `on_progress(uploaded, total)` after
    /// each completed batch. The first hard failure aborts the remainder.
    pub async fn upload_all(
        &self,
        items: Vec<UploadItem>,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<Vec<UploadedAsset>, UploadError> {
        let total = items.len();
        let mut uploaded = 0;
        let mut assets = Vec::with_capacity(total);

        for batch in items.chunks(self.batch_size) {
            let results = join_all(batch.iter().map(|item| self.upload_one(item))).await;
            for result in results {
                assets.push(result?);
            }
            uploaded += batch.len();
            on_progress(uploaded, total);
        }
        Ok(assets)
    }

    async fn upload_one(&self, item: &UploadItem) -> Result<UploadedAsset, UploadError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .store
                .put_object(&item.key, &item.bytes, &item.content_type)
                .await
            {
                Ok(path) => {
                    return Ok(UploadedAsset {
                        frame_number: item.frame_number,
                        url: self.store.public_url(&path),
                        path,
                    });
                }
                Err(err) if attempt < UPLOAD_MAX_RETRIES && is_transient(&err) => {
                    attempt += 1;
                    let delay = UPLOAD_RETRY_BASE * 2u32.pow(attempt);
                    warn!(
                        key = %item.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upload failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(UploadError::Item {
                        key: item.key.clone(),
                        source: err,
                    });
                }
            }
        }
    }
}

/// Transient: gateway unavailability (503/504) or error text mentioning a
/// timeout or network problem. Key conflicts are never transient.
fn is_transient(err: &BlobError) -> bool {
    match err {
        BlobError::Conflict(_) => false,
        BlobError::Status { status: 503, .. } | BlobError::Status { status: 504, .. } => true,
        other => {
            let message = other.to_string().to_ascii_lowercase();
            ["timeout", "network", "503", "504"]
                .iter()
                .any(|pattern| message.contains(pattern))
        }
    }
}
