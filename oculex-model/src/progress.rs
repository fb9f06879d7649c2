//! Progress messages streamed to the client over SSE.

use serde::{Deserialize, Serialize};

use crate::analysis::OverallAnalysis;

/// Step labels attached to intermediate status events.
pub mod steps {
    pub const RECEIVED_REQUEST: &str = "received_request";
    pub const PARSING_FORM_DATA: &str = "parsing_form_data";
    pub const FRAMES_SAVED: &str = "frames_saved";
    pub const PREPARING_MODEL: &str = "preparing_model";
    pub const PARSING_RESULTS: &str = "parsing_results";
    pub const FINALIZING: &str = "finalizing";
    pub const SAVING_TO_DATABASE: &str = "saving_to_database";
    pub const CLEANUP: &str = "cleanup";

    /// Label for the batch currently being resolved, 1-indexed.
    pub fn loading_batch(batch: usize) -> String {
        format!("loading_batch_{batch}")
    }
}

/// A single server-to-client message on the progress stream.
///
/// Serialized untagged; the client recovers the variant from the fields
/// present. `Results` and `Error` must stay declared before `Status`: an
/// untagged deserializer takes the first matching variant, and `Status`
/// ignores unknown fields, so it would otherwise swallow both terminal
/// shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    /// Terminal success: the finished report at a forced 100%.
    Results {
        progress: u8,
        results: OverallAnalysis,
    },
    /// Terminal failure, emitted from whichever phase failed.
    Error { error: String },
    /// Intermediate status update.
    Status {
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },
}

impl ProgressEvent {
    pub fn status(progress: u8, step: impl Into<String>) -> Self {
        ProgressEvent::Status {
            progress,
            step: Some(step.into()),
            count: None,
        }
    }

    pub fn status_with_count(
        progress: u8,
        step: impl Into<String>,
        count: u32,
    ) -> Self {
        ProgressEvent::Status {
            progress,
            step: Some(step.into()),
            count: Some(count),
        }
    }

    pub fn results(results: OverallAnalysis) -> Self {
        ProgressEvent::Results {
            progress: 100,
            results,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            error: message.into(),
        }
    }

    /// Terminal events end the stream; at most one is ever emitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Results { .. } | ProgressEvent::Error { .. }
        )
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            ProgressEvent::Results { progress, .. }
            | ProgressEvent::Status { progress, .. } => Some(*progress),
            ProgressEvent::Error { .. } => None,
        }
    }

    pub fn step(&self) -> Option<&str> {
        match self {
            ProgressEvent::Status { step, .. } => step.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Urgency;

    #[test]
    fn status_serializes_without_absent_fields() {
        let event = ProgressEvent::status(5, steps::RECEIVED_REQUEST);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"progress":5,"step":"received_request"}"#);
    }

    #[test]
    fn status_with_count_includes_count() {
        let event =
            ProgressEvent::status_with_count(20, steps::FRAMES_SAVED, 42);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"progress":20,"step":"frames_saved","count":42}"#
        );
    }

    #[test]
    fn results_event_deserializes_as_results_not_status() {
        let json = r#"{"progress":100,"results":{"summary":"ok","urgency":"low"}}"#;
        let event: ProgressEvent = serde_json::from_str(json).unwrap();
        match event {
            ProgressEvent::Results { progress, results } => {
                assert_eq!(progress, 100);
                assert_eq!(results.urgency, Urgency::Low);
            }
            other => panic!("expected results event, got {other:?}"),
        }
    }

    #[test]
    fn error_event_deserializes_as_error() {
        let event: ProgressEvent =
            serde_json::from_str(r#"{"error":"Invalid file type"}"#).unwrap();
        assert_eq!(
            event,
            ProgressEvent::Error {
                error: "Invalid file type".to_string()
            }
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn bare_progress_is_a_status_event() {
        let event: ProgressEvent =
            serde_json::from_str(r#"{"progress":98,"step":"cleanup"}"#)
                .unwrap();
        assert_eq!(event.progress(), Some(98));
        assert_eq!(event.step(), Some("cleanup"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn batch_labels_are_one_indexed() {
        assert_eq!(steps::loading_batch(1), "loading_batch_1");
        assert_eq!(steps::loading_batch(3), "loading_batch_3");
    }
}
