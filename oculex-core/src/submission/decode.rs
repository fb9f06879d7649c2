//! Server-side decoding of the multipart submission fields.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use oculex_model::submission::{DicomContext, DicomFileMeta, UploadMode};
use oculex_model::wire;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Decode failures. These end the run as a terminal error event, so the
/// messages stay client-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {message}")]
    InvalidField { field: String, message: String },
    #[error("frame {index} is missing both inline data and reference fields")]
    MissingFrame { index: usize },
    #[error("No frames were provided for analysis")]
    NoFrames,
}

/// Text fields drained from the multipart body, keyed by field name.
///
/// Every field in the submission protocol is text (inline frames travel
/// as data URLs), so a flat string map is the whole payload.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: HashMap<String, String>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for FormFields {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Where one frame's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// PNG bytes inline as a `data:` URL.
    Inline { data_url: String },
    /// Pre-uploaded frame to fetch from blob storage.
    Remote { url: String, path: Option<String> },
}

/// One frame slot of the submission, still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHandle {
    /// Zero-based wire index.
    pub index: usize,
    /// 1-based display number carried through to the results.
    pub frame_number: u32,
    pub timestamp: f64,
    pub payload: FramePayload,
    pub file_name: Option<String>,
    pub metadata: Option<DicomFileMeta>,
}

/// A fully decoded submission, ready for frame resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSubmission {
    pub session_id: Uuid,
    pub mode: UploadMode,
    pub problem: String,
    pub dicom: Option<DicomContext>,
    pub frames: Vec<FrameHandle>,
}

/// Decodes the drained form into a [`ParsedSubmission`].
///
/// A declared `frameCount` of zero (or a missing count) is fatal; field
/// indices beyond the declared count are ignored. Malformed optional
/// metadata is dropped with a warning rather than failing the run.
pub fn decode_submission(form: &FormFields) -> Result<ParsedSubmission, DecodeError> {
    let mode: UploadMode = required(form, wire::UPLOAD_MODE)?
        .parse()
        .map_err(|message| DecodeError::InvalidField {
            field: wire::UPLOAD_MODE.to_string(),
            message,
        })?;
    let problem = required(form, wire::PROBLEM)?.to_string();

    let frame_count: usize = required(form, wire::FRAME_COUNT)?.trim().parse().map_err(
        |e: std::num::ParseIntError| DecodeError::InvalidField {
            field: wire::FRAME_COUNT.to_string(),
            message: e.to_string(),
        },
    )?;
    if frame_count == 0 {
        return Err(DecodeError::NoFrames);
    }

    let session_id = match form.get(wire::SESSION_ID) {
        Some(raw) => Uuid::parse_str(raw.trim()).map_err(|e| DecodeError::InvalidField {
            field: wire::SESSION_ID.to_string(),
            message: e.to_string(),
        })?,
        None => Uuid::new_v4(),
    };

    let dicom = form.get(wire::DICOM_FOLDER).map(|folder| DicomContext {
        folder: folder.to_string(),
        modality: form.get(wire::MODALITY).map(str::to_string),
        patient_id: form.get(wire::PATIENT_ID).map(str::to_string),
    });

    let mut frames = Vec::with_capacity(frame_count);
    for index in 0..frame_count {
        frames.push(decode_frame(form, index)?);
    }

    Ok(ParsedSubmission {
        session_id,
        mode,
        problem,
        dicom,
        frames,
    })
}

fn decode_frame(form: &FormFields, index: usize) -> Result<FrameHandle, DecodeError> {
    let (payload, frame_number) = if let Some(url) = form.get(&wire::frame_url(index)) {
        let frame_number = match form.get(&wire::frame_number(index)) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| DecodeError::InvalidField {
                    field: wire::frame_number(index),
                    message: e.to_string(),
                })?,
            None => index as u32 + 1,
        };
        (
            FramePayload::Remote {
                url: url.to_string(),
                path: form.get(&wire::frame_path(index)).map(str::to_string),
            },
            frame_number,
        )
    } else if let Some(data_url) = form.get(&wire::frame(index)) {
        (
            FramePayload::Inline {
                data_url: data_url.to_string(),
            },
            index as u32 + 1,
        )
    } else {
        return Err(DecodeError::MissingFrame { index });
    };

    let timestamp_field = wire::timestamp(index);
    let timestamp: f64 = form
        .get(&timestamp_field)
        .ok_or_else(|| DecodeError::MissingField(timestamp_field.clone()))?
        .trim()
        .parse()
        .map_err(|e: std::num::ParseFloatError| DecodeError::InvalidField {
            field: timestamp_field,
            message: e.to_string(),
        })?;

    let metadata = form.get(&wire::metadata(index)).and_then(|raw| {
        match serde_json::from_str::<DicomFileMeta>(raw) {
            Ok(meta) => Some(meta),
            Err(err) => {
                warn!(index, error = %err, "dropping malformed frame metadata");
                None
            }
        }
    });

    Ok(FrameHandle {
        index,
        frame_number,
        timestamp,
        payload,
        file_name: form.get(&wire::file_name(index)).map(str::to_string),
        metadata,
    })
}

fn required<'a>(form: &'a FormFields, name: &str) -> Result<&'a str, DecodeError> {
    form.get(name)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))
}

/// Decodes a `data:<mime>;base64,<payload>` URL to raw bytes.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, DecodeError> {
    let invalid = |message: &str| DecodeError::InvalidField {
        field: "frame".to_string(),
        message: message.to_string(),
    };

    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| invalid("not a data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("data URL has no payload separator"))?;
    if !header.ends_with(";base64") {
        return Err(invalid("data URL is not base64-encoded"));
    }
    BASE64
        .decode(payload.trim())
        .map_err(|e| invalid(&format!("base64 decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_form() -> FormFields {
        let mut form = FormFields::new();
        form.insert(wire::UPLOAD_MODE, "video");
        form.insert(wire::PROBLEM, "post-op swelling");
        form.insert(wire::FRAME_COUNT, "2");
        form.insert(wire::frame(0), "data:image/png;base64,aGk=");
        form.insert(wire::timestamp(0), "0");
        form.insert(wire::frame(1), "data:image/png;base64,aGk=");
        form.insert(wire::timestamp(1), "0.2");
        form
    }

    #[test]
    fn decodes_an_inline_video_submission() {
        let parsed = decode_submission(&base_form()).unwrap();
        assert_eq!(parsed.mode, UploadMode::Video);
        assert_eq!(parsed.frames.len(), 2);
        assert_eq!(parsed.frames[1].frame_number, 2);
        assert_eq!(parsed.frames[1].timestamp, 0.2);
        assert!(parsed.dicom.is_none());
        assert!(matches!(
            parsed.frames[0].payload,
            FramePayload::Inline { .. }
        ));
    }

    #[test]
    fn generates_a_session_id_when_absent() {
        let parsed = decode_submission(&base_form()).unwrap();
        assert!(!parsed.session_id.is_nil());

        let mut form = base_form();
        form.insert(wire::SESSION_ID, "00000000-0000-0000-0000-000000000000");
        let parsed = decode_submission(&form).unwrap();
        assert!(parsed.session_id.is_nil());
    }

    #[test]
    fn zero_frame_count_is_fatal() {
        let mut form = base_form();
        form.insert(wire::FRAME_COUNT, "0");
        assert_eq!(decode_submission(&form), Err(DecodeError::NoFrames));
    }

    #[test]
    fn referenced_frames_keep_their_numbers() {
        let mut form = FormFields::new();
        form.insert(wire::UPLOAD_MODE, "video");
        form.insert(wire::PROBLEM, "p");
        form.insert(wire::FRAME_COUNT, "1");
        form.insert(wire::frame_url(0), "https://store.example/f.png");
        form.insert(wire::frame_path(0), "sessions/s/f.png");
        form.insert(wire::frame_number(0), "17");
        form.insert(wire::timestamp(0), "3.2");

        let parsed = decode_submission(&form).unwrap();
        assert_eq!(parsed.frames[0].frame_number, 17);
        assert_eq!(
            parsed.frames[0].payload,
            FramePayload::Remote {
                url: "https://store.example/f.png".to_string(),
                path: Some("sessions/s/f.png".to_string()),
            }
        );
    }

    #[test]
    fn a_gap_in_frame_fields_is_an_error() {
        let mut form = base_form();
        form.insert(wire::FRAME_COUNT, "3");
        assert_eq!(
            decode_submission(&form),
            Err(DecodeError::MissingFrame { index: 2 })
        );
    }

    #[test]
    fn dicom_context_is_picked_up_from_folder() {
        let mut form = base_form();
        form.insert(wire::UPLOAD_MODE, "dicom");
        form.insert(wire::DICOM_FOLDER, "series-9");
        form.insert(wire::PATIENT_ID, "patient-123");
        form.insert(wire::metadata(0), r#"{"modality":"MR","instanceNumber":4}"#);

        let parsed = decode_submission(&form).unwrap();
        let dicom = parsed.dicom.unwrap();
        assert_eq!(dicom.folder, "series-9");
        assert_eq!(dicom.patient_id.as_deref(), Some("patient-123"));
        let meta = parsed.frames[0].metadata.as_ref().unwrap();
        assert_eq!(meta.instance_number, Some(4));
    }

    #[test]
    fn malformed_metadata_is_dropped_not_fatal() {
        let mut form = base_form();
        form.insert(wire::metadata(0), "{not json");
        let parsed = decode_submission(&form).unwrap();
        assert!(parsed.frames[0].metadata.is_none());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut form = base_form();
        form.insert(wire::UPLOAD_MODE, "xray");
        assert!(matches!(
            decode_submission(&form),
            Err(DecodeError::InvalidField { .. })
        ));
    }

    #[test]
    fn data_url_round_trip() {
        let bytes = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn non_base64_data_urls_are_rejected() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("http://example.com/x.png").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@@").is_err());
    }
}
