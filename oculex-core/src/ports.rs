//! Ports to the outside world: blob storage, frame fetching, persistence.
//!
//! The orchestrator and uploader are written against these traits so tests
//! can script failures without a network or database.

use async_trait::async_trait;
use oculex_model::record::{FrameResultRecord, SessionRecord};
use thiserror::Error;
use tracing::debug;

/// Blob storage failures. `Conflict` is the upsert-disabled collision case
/// and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("object already exists at {0}")]
    Conflict(String),
    #[error("storage request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("storage transport error: {0}")]
    Transport(String),
}

/// A bucket-style object store.
///
/// `put_object` returns the object path; `public_url` is pure URL
/// assembly and never performs I/O.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError>;

    fn public_url(&self, path: &str) -> String;

    async fn remove_objects(&self, paths: &[String]) -> Result<(), BlobError>;

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// Failures while fetching a referenced frame's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch returned status {0}")]
    Status(u16),
    #[error("fetch transport error: {0}")]
    Transport(String),
}

/// Retrieves the bytes behind a frame reference URL.
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Persistence failure; callers treat writes as best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record store error: {0}")]
pub struct StoreError(pub String);

/// Stores completed analyses. Both writes are append-only inserts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError>;
    async fn insert_frame_result(&self, record: &FrameResultRecord) -> Result<(), StoreError>;
}

/// Store used when no database is configured: accepts and discards.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecordStore;

#[async_trait]
impl RecordStore for NullRecordStore {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        debug!(session_id = %record.id, "persistence disabled, discarding session record");
        Ok(())
    }

    async fn insert_frame_result(&self, _record: &FrameResultRecord) -> Result<(), StoreError> {
        Ok(())
    }
}
