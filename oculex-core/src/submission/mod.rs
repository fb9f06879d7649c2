//! The analysis submission protocol: pre-flight validation, the multipart
//! field encoding produced by the client, and the server-side decoder.

pub mod decode;
pub mod encode;
pub mod validate;

pub use decode::{
    DecodeError, FormFields, FrameHandle, FramePayload, ParsedSubmission, decode_data_url,
    decode_submission,
};
pub use encode::{EncodeError, EncodeOptions, encode_submission};
pub use validate::{
    MAX_VIDEO_BYTES, ValidationError, VideoCandidate, validate_dicom_submission,
    validate_video_submission,
};
