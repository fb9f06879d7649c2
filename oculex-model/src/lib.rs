//! Core data model definitions shared across Oculex crates.
#![allow(missing_docs)]

pub mod analysis;
pub mod progress;
pub mod record;
pub mod submission;
pub mod wire;

// Intentionally curated re-exports for downstream consumers.
pub use analysis::{FrameAnalysis, OverallAnalysis, Urgency};
pub use progress::ProgressEvent;
pub use record::{FrameResultRecord, SessionRecord};
pub use submission::{DicomContext, DicomFileMeta, UploadMode, UploadedAsset};
