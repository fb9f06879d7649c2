//! Report types produced by the analysis backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Clinical urgency attached to a completed analysis.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[default]
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl Urgency {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Findings for a single submitted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysis {
    pub frame_number: u32,
    #[serde(default)]
    pub timestamp: f64,
    pub analysis: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub findings: Vec<String>,
    /// Storage object path, when the frame was uploaded ahead of submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// Public URL for the stored frame, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,
}

/// The full report returned to the client as the terminal `results` event.
///
/// `summary` and `urgency` are mandatory in the structured wire shape; the
/// two lists default to empty so a terse backend reply still deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallAnalysis {
    pub summary: String,
    pub urgency: Urgency,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub frame_analyses: Vec<FrameAnalysis>,
}

impl OverallAnalysis {
    /// Report with just a summary and urgency, no per-frame detail.
    pub fn new(summary: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            summary: summary.into(),
            urgency,
            recommendations: Vec::new(),
            frame_analyses: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_analysis_uses_camel_case_field_names() {
        let report = OverallAnalysis {
            summary: "No acute findings.".to_string(),
            urgency: Urgency::Low,
            recommendations: vec!["Routine follow-up.".to_string()],
            frame_analyses: vec![FrameAnalysis {
                frame_number: 3,
                timestamp: 0.4,
                analysis: "Clear".to_string(),
                confidence: 0.9,
                findings: vec![],
                storage_path: Some("sessions/a/frame_3.png".to_string()),
                storage_url: None,
            }],
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["urgency"], "low");
        assert_eq!(value["frameAnalyses"][0]["frameNumber"], 3);
        assert_eq!(
            value["frameAnalyses"][0]["storagePath"],
            "sessions/a/frame_3.png"
        );
        assert!(value["frameAnalyses"][0].get("storageUrl").is_none());
    }

    #[test]
    fn minimal_report_deserializes_with_defaults() {
        let report: OverallAnalysis = serde_json::from_str(
            r#"{"summary":"Stable appearance","urgency":"High"}"#,
        )
        .unwrap();
        assert_eq!(report.urgency, Urgency::High);
        assert!(report.recommendations.is_empty());
        assert!(report.frame_analyses.is_empty());
    }

    #[test]
    fn urgency_accepts_capitalized_aliases() {
        for (text, expected) in [
            ("\"low\"", Urgency::Low),
            ("\"Medium\"", Urgency::Medium),
            ("\"HIGH\"", Urgency::High),
        ] {
            let parsed: Urgency = serde_json::from_str(text).unwrap();
            assert_eq!(parsed, expected);
        }
    }
}
