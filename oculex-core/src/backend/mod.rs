//! The vision analysis backend port and its error classification.

use async_trait::async_trait;
use oculex_model::analysis::OverallAnalysis;
use oculex_model::submission::{DicomContext, UploadMode};
use thiserror::Error;

use crate::retry::Retryable;

pub mod parse;
pub mod vision_api;

pub use vision_api::{VisionApiBackend, VisionApiConfig};

/// One frame as submitted to the backend.
pub struct BackendFrame {
    pub frame_number: u32,
    pub timestamp: f64,
    pub png: Vec<u8>,
}

impl std::fmt::Debug for BackendFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFrame")
            .field("frame_number", &self.frame_number)
            .field("timestamp", &self.timestamp)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Everything the backend needs for one analysis call.
#[derive(Debug)]
pub struct AnalysisRequest {
    pub problem: String,
    pub mode: UploadMode,
    pub dicom: Option<DicomContext>,
    pub frames: Vec<BackendFrame>,
}

/// What came back: a report that already parsed, or raw text to salvage.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    Structured(OverallAnalysis),
    Unstructured(String),
}

/// Backend call failures, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("analysis service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("analysis service timed out: {0}")]
    Timeout(String),
    #[error("could not reach analysis service: {0}")]
    Connect(String),
    #[error("analysis service returned an unusable reply: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl Retryable for BackendError {
    /// Retryable: rate limiting (429), server-side failures (5xx),
    /// transport timeouts and connect failures, and replies whose text
    /// signals a transient outage. A malformed reply body is not; the
    /// service answered, it just answered badly.
    fn is_retryable(&self) -> bool {
        match self {
            BackendError::Status { status, message } => {
                *status == 429 || *status >= 500 || transient_message(message)
            }
            BackendError::Timeout(_) | BackendError::Connect(_) => true,
            BackendError::Malformed(_) => false,
            BackendError::Other(message) => transient_message(message),
        }
    }
}

fn transient_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("timeout") || message.contains("service is currently unavailable")
}

/// Performs the (single) analysis call; retry lives in the caller.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<BackendResponse, BackendError>;
}
