//! Pre-flight checks run before any upload or extraction work starts.

use thiserror::Error;

/// Upper bound on accepted video files.
pub const MAX_VIDEO_BYTES: u64 = 100 * 1024 * 1024;

/// Accepted video MIME types: MP4, AVI (both registered names), QuickTime
/// MOV, and WMV.
pub const ALLOWED_VIDEO_MIME: [&str; 5] = [
    "video/mp4",
    "video/avi",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-ms-wmv",
];

/// Rejections surfaced directly to the user, so the messages stay in
/// plain language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a video file")]
    MissingVideo,
    #[error("Invalid file type: {0}. Please upload MP4, AVI, MOV, or WMV files.")]
    UnsupportedVideoType(String),
    #[error("File too large. Maximum size is 100MB.")]
    VideoTooLarge(u64),
    #[error("Please describe the medical problem or area of concern")]
    MissingProblem,
    #[error("No DICOM files were provided")]
    MissingDicomFiles,
}

/// What validation needs to know about a selected video file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCandidate {
    /// MIME type as declared by the picker, not sniffed from content.
    pub mime: String,
    pub size_bytes: u64,
}

/// Validates a video-mode submission: file present, allowed type, within
/// the size cap, and a non-empty problem description.
pub fn validate_video_submission(
    video: Option<&VideoCandidate>,
    problem: &str,
) -> Result<(), ValidationError> {
    let video = video.ok_or(ValidationError::MissingVideo)?;
    if !ALLOWED_VIDEO_MIME.contains(&video.mime.as_str()) {
        return Err(ValidationError::UnsupportedVideoType(video.mime.clone()));
    }
    if video.size_bytes > MAX_VIDEO_BYTES {
        return Err(ValidationError::VideoTooLarge(video.size_bytes));
    }
    require_problem(problem)
}

/// Validates a DICOM-mode submission: at least one file and a non-empty
/// problem description.
pub fn validate_dicom_submission(file_count: usize, problem: &str) -> Result<(), ValidationError> {
    if file_count == 0 {
        return Err(ValidationError::MissingDicomFiles);
    }
    require_problem(problem)
}

fn require_problem(problem: &str) -> Result<(), ValidationError> {
    if problem.trim().is_empty() {
        return Err(ValidationError::MissingProblem);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4(size_bytes: u64) -> VideoCandidate {
        VideoCandidate {
            mime: "video/mp4".to_string(),
            size_bytes,
        }
    }

    #[test]
    fn accepts_a_reasonable_video() {
        assert_eq!(
            validate_video_submission(Some(&mp4(5 * 1024 * 1024)), "persistent knee swelling"),
            Ok(())
        );
    }

    #[test]
    fn missing_video_is_reported_first() {
        assert_eq!(
            validate_video_submission(None, ""),
            Err(ValidationError::MissingVideo)
        );
    }

    #[test]
    fn rejects_types_outside_the_allow_list() {
        let candidate = VideoCandidate {
            mime: "video/webm".to_string(),
            size_bytes: 10,
        };
        assert_eq!(
            validate_video_submission(Some(&candidate), "problem"),
            Err(ValidationError::UnsupportedVideoType("video/webm".to_string()))
        );
    }

    #[test]
    fn size_cap_is_inclusive() {
        assert_eq!(
            validate_video_submission(Some(&mp4(MAX_VIDEO_BYTES)), "problem"),
            Ok(())
        );
        assert_eq!(
            validate_video_submission(Some(&mp4(MAX_VIDEO_BYTES + 1)), "problem"),
            Err(ValidationError::VideoTooLarge(MAX_VIDEO_BYTES + 1))
        );
    }

    #[test]
    fn whitespace_only_problem_is_rejected() {
        assert_eq!(
            validate_video_submission(Some(&mp4(10)), "   \n\t"),
            Err(ValidationError::MissingProblem)
        );
    }

    #[test]
    fn dicom_requires_files_before_problem() {
        assert_eq!(
            validate_dicom_submission(0, ""),
            Err(ValidationError::MissingDicomFiles)
        );
        assert_eq!(
            validate_dicom_submission(3, ""),
            Err(ValidationError::MissingProblem)
        );
        assert_eq!(validate_dicom_submission(3, "chest pain"), Ok(()));
    }
}
