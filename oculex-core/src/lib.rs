//! # Oculex Core
//!
//! Core library for the Oculex streaming analysis platform. Everything
//! transport-agnostic lives here; the server and client crates wire these
//! pieces to axum and reqwest respectively.
//!
//! ## Overview
//!
//! - **Frame extraction**: timestamped frame sampling from video and
//!   ordered rendering of DICOM sets, including window/level mapping
//! - **Submission protocol**: validation, multipart field encoding, and the
//!   server-side decoder for analysis submissions
//! - **Analysis orchestrator**: the phase machine that resolves frames,
//!   invokes the vision backend, and emits the progress stream
//! - **Retry policy**: capped exponential backoff with jitter for the
//!   backend call
//! - **Blob upload**: batched, concurrency-bounded upload of frames and raw
//!   inputs to a bucket-style object store
//!
//! ## Feature Flags
//!
//! - `ffmpeg`: enables the FFmpeg-backed video sampler. Off by default so
//!   the workspace builds without system FFmpeg libraries; any
//!   [`frame::VideoSampler`] implementation can stand in.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Streaming analysis orchestrator: phases, progress sink, run loop.
pub mod analysis;

/// Vision backend port, the hosted-API implementation, and reply parsing.
pub mod backend;

/// Frame types and the video/DICOM extraction paths.
pub mod frame;

/// Delegate ports for storage, fetching, and persistence.
pub mod ports;

/// Retry policy for the backend invocation.
pub mod retry;

/// Bucket-style HTTP object store client.
pub mod storage;

/// Submission validation, encoding, and decoding.
pub mod submission;

/// Batched blob upload engine.
pub mod uploader;

// Intentionally curated re-exports for downstream consumers.
pub use analysis::{AnalysisSettings, Orchestrator, ProgressSink, SinkClosed};
pub use backend::{AnalysisBackend, AnalysisRequest, BackendError, BackendResponse};
pub use frame::{Frame, FrameError, FrameExtractor, RasterFrame};
pub use ports::{BlobStore, FrameFetcher, RecordStore};
pub use retry::RetryPolicy;
pub use submission::{FormFields, ParsedSubmission};
