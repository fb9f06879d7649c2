//! Submission-side types: upload modes, DICOM context, stored assets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of study being submitted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Video,
    Dicom,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Video => "video",
            UploadMode::Dicom => "dicom",
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(UploadMode::Video),
            "dicom" => Ok(UploadMode::Dicom),
            other => Err(format!("unknown upload mode: {other}")),
        }
    }
}

/// Header fields read from a single DICOM file.
///
/// Everything is optional; real exports are frequently missing tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomFileMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    // DICOM exports write the header key as `patientID`, not `patientId`.
    #[serde(default, rename = "patientID", skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_number: Option<i32>,
}

/// Study-level DICOM fields attached to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomContext {
    /// Logical folder/series name the files were selected from.
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

/// A frame or raw input that has been placed in remote blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedAsset {
    pub frame_number: u32,
    /// Object path within the bucket, stable across URL scheme changes.
    pub path: String,
    /// Public URL the server can fetch the bytes from.
    pub url: String,
}
