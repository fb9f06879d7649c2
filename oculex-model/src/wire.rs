//! Multipart field names shared by the client encoder and server decoder.
//!
//! Per-frame fields are suffixed with the zero-based submission index, not
//! the 1-based frame number; `frameNumber_<i>` carries the latter when a
//! frame is sent by reference.

pub const UPLOAD_MODE: &str = "uploadMode";
pub const PROBLEM: &str = "problem";
pub const FRAME_COUNT: &str = "frameCount";
pub const SESSION_ID: &str = "sessionId";
pub const DICOM_FOLDER: &str = "dicomFolder";
pub const MODALITY: &str = "modality";
pub const PATIENT_ID: &str = "patientID";

/// Inline frame payload (`data:image/png;base64,...`).
pub fn frame(index: usize) -> String {
    format!("frame_{index}")
}

pub fn timestamp(index: usize) -> String {
    format!("timestamp_{index}")
}

/// Public URL of a pre-uploaded frame.
pub fn frame_url(index: usize) -> String {
    format!("frameUrl_{index}")
}

/// Storage object path of a pre-uploaded frame.
pub fn frame_path(index: usize) -> String {
    format!("framePath_{index}")
}

pub fn frame_number(index: usize) -> String {
    format!("frameNumber_{index}")
}

/// JSON-encoded [`DicomFileMeta`](crate::submission::DicomFileMeta).
pub fn metadata(index: usize) -> String {
    format!("metadata_{index}")
}

pub fn file_name(index: usize) -> String {
    format!("fileName_{index}")
}
