//! Client-side encoding of a submission into multipart text fields.
//!
//! The output is a plain ordered `(name, value)` list so the HTTP layer
//! can map it onto whatever form builder it uses, and tests can assert on
//! the exact wire layout without a network stack.

use chrono::Utc;
use oculex_model::submission::{DicomContext, UploadMode};
use oculex_model::wire;
use thiserror::Error;
use uuid::Uuid;

use crate::frame::{Frame, FrameError};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("metadata serialization failed: {0}")]
    Metadata(String),
}

/// Submission-level fields accompanying the frames.
#[derive(Debug, Clone)]
pub struct EncodeOptions<'a> {
    pub mode: UploadMode,
    pub problem: &'a str,
    /// Client-chosen session id; the server generates one when absent.
    pub session_id: Option<Uuid>,
    pub dicom: Option<&'a DicomContext>,
}

/// Encodes a submission as ordered multipart text fields.
///
/// Frames that carry a `remote` asset are sent by reference
/// (`frameUrl_<i>`/`framePath_<i>`/`frameNumber_<i>`); the rest are
/// inlined as PNG data URLs. Indices are zero-based and dense regardless
/// of which layout each frame uses.
pub fn encode_submission(
    options: &EncodeOptions<'_>,
    frames: &[Frame],
) -> Result<Vec<(String, String)>, EncodeError> {
    let mut fields = Vec::with_capacity(frames.len() * 3 + 8);
    fields.push((wire::UPLOAD_MODE.to_string(), options.mode.to_string()));
    fields.push((wire::PROBLEM.to_string(), options.problem.to_string()));
    fields.push((wire::FRAME_COUNT.to_string(), frames.len().to_string()));
    if let Some(session_id) = options.session_id {
        fields.push((wire::SESSION_ID.to_string(), session_id.to_string()));
    }

    if let Some(dicom) = options.dicom {
        fields.push((wire::DICOM_FOLDER.to_string(), dicom.folder.clone()));
        if let Some(modality) = &dicom.modality {
            fields.push((wire::MODALITY.to_string(), modality.clone()));
        }
        let patient_id = dicom
            .patient_id
            .clone()
            .unwrap_or_else(|| format!("patient-{}", Utc::now().timestamp_millis()));
        fields.push((wire::PATIENT_ID.to_string(), patient_id));
    }

    for (i, frame) in frames.iter().enumerate() {
        match &frame.remote {
            Some(asset) => {
                fields.push((wire::frame_url(i), asset.url.clone()));
                fields.push((wire::frame_path(i), asset.path.clone()));
                fields.push((wire::frame_number(i), frame.frame_number.to_string()));
            }
            None => {
                fields.push((wire::frame(i), frame.image.to_data_url()?));
            }
        }
        fields.push((wire::timestamp(i), frame.timestamp.to_string()));
        if let Some(name) = &frame.source_name {
            fields.push((wire::file_name(i), name.clone()));
        }
        if let Some(meta) = &frame.dicom {
            let json = serde_json::to_string(meta)
                .map_err(|e| EncodeError::Metadata(e.to_string()))?;
            fields.push((wire::metadata(i), json));
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use oculex_model::submission::{DicomFileMeta, UploadedAsset};

    use super::*;
    use crate::frame::RasterFrame;

    fn lookup<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn inline_frame(number: u32, timestamp: f64) -> Frame {
        Frame::new(number, timestamp, RasterFrame::placeholder())
    }

    #[test]
    fn video_frames_are_inlined_as_data_urls() {
        let frames = vec![inline_frame(1, 0.0), inline_frame(2, 0.5)];
        let options = EncodeOptions {
            mode: UploadMode::Video,
            problem: "shoulder instability",
            session_id: None,
            dicom: None,
        };
        let fields = encode_submission(&options, &frames).unwrap();

        assert_eq!(lookup(&fields, "uploadMode"), Some("video"));
        assert_eq!(lookup(&fields, "frameCount"), Some("2"));
        assert!(lookup(&fields, "sessionId").is_none());
        assert!(
            lookup(&fields, "frame_0")
                .unwrap()
                .starts_with("data:image/png;base64,")
        );
        assert_eq!(lookup(&fields, "timestamp_1"), Some("0.5"));
        assert!(lookup(&fields, "frameUrl_0").is_none());
    }

    #[test]
    fn uploaded_frames_are_sent_by_reference() {
        let mut frame = inline_frame(7, 1.25);
        frame.remote = Some(UploadedAsset {
            frame_number: 7,
            path: "sessions/abc/frame_7.png".to_string(),
            url: "https://store.example/object/public/frames/sessions/abc/frame_7.png"
                .to_string(),
        });
        let options = EncodeOptions {
            mode: UploadMode::Video,
            problem: "problem",
            session_id: None,
            dicom: None,
        };
        let fields = encode_submission(&options, &[frame]).unwrap();

        assert!(lookup(&fields, "frame_0").is_none());
        assert_eq!(
            lookup(&fields, "framePath_0"),
            Some("sessions/abc/frame_7.png")
        );
        assert_eq!(lookup(&fields, "frameNumber_0"), Some("7"));
        assert_eq!(lookup(&fields, "timestamp_0"), Some("1.25"));
    }

    #[test]
    fn dicom_context_fills_a_patient_id_placeholder() {
        let dicom = DicomContext {
            folder: "series-12".to_string(),
            modality: Some("CT".to_string()),
            patient_id: None,
        };
        let mut frame = inline_frame(1, 0.0);
        frame.source_name = Some("IM0001.dcm".to_string());
        frame.dicom = Some(DicomFileMeta {
            instance_number: Some(1),
            ..Default::default()
        });
        let options = EncodeOptions {
            mode: UploadMode::Dicom,
            problem: "follow-up",
            session_id: Some(Uuid::nil()),
            dicom: Some(&dicom),
        };
        let fields = encode_submission(&options, &[frame]).unwrap();

        assert_eq!(lookup(&fields, "dicomFolder"), Some("series-12"));
        assert_eq!(lookup(&fields, "modality"), Some("CT"));
        assert!(lookup(&fields, "patientID").unwrap().starts_with("patient-"));
        assert_eq!(lookup(&fields, "fileName_0"), Some("IM0001.dcm"));
        assert_eq!(
            lookup(&fields, "metadata_0"),
            Some(r#"{"instanceNumber":1}"#)
        );
        assert_eq!(
            lookup(&fields, "sessionId"),
            Some("00000000-0000-0000-0000-000000000000")
        );
    }
}
