//! Frame extraction: shared frame types plus the video and DICOM paths.

use async_trait::async_trait;
use oculex_model::submission::{DicomFileMeta, UploadedAsset};
use thiserror::Error;

pub mod dicom;
#[cfg(feature = "ffmpeg")]
#[cfg_attr(docsrs, doc(cfg(feature = "ffmpeg")))]
pub mod ffmpeg;
pub mod raster;
pub mod video;
pub mod window;

pub use dicom::{DicomDecoder, DicomInput, DicomSetExtractor};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSampler;
pub use raster::RasterFrame;
pub use video::{LocalSamplingExtractor, SamplingPolicy, VideoSampler};

/// Errors raised while extracting or encoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("video could not be opened: {0}")]
    VideoOpen(String),
    #[error("frame sampling failed at {timestamp:.3}s: {message}")]
    Sample { timestamp: f64, message: String },
    #[error("frames-per-second must be positive, got {0}")]
    InvalidRate(f64),
    #[error("raster buffer does not match {width}x{height} RGBA ({len} bytes)")]
    RasterShape { width: u32, height: u32, len: usize },
    #[error("png encoding failed: {0}")]
    PngEncode(String),
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// One extracted frame, ready for preview, upload, or submission.
///
/// `frame_number` is 1-based and survives the round trip to the server so
/// per-frame findings can be matched back to what the user saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_number: u32,
    /// Seconds from the start of the study; the file index for DICOM sets.
    pub timestamp: f64,
    pub image: RasterFrame,
    /// Original file name, when the frame came from a named input.
    pub source_name: Option<String>,
    /// Set once the frame has been uploaded to blob storage.
    pub remote: Option<UploadedAsset>,
    /// Per-file DICOM header fields, for DICOM-sourced frames.
    pub dicom: Option<DicomFileMeta>,
}

impl Frame {
    pub fn new(frame_number: u32, timestamp: f64, image: RasterFrame) -> Self {
        Self {
            frame_number,
            timestamp,
            image,
            source_name: None,
            remote: None,
            dicom: None,
        }
    }
}

/// A strategy that turns one submission's inputs into an ordered frame list.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self) -> Result<Vec<Frame>, FrameError>;
}
