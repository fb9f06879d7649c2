//! Persistence records written after a successful analysis.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::analysis::{FrameAnalysis, OverallAnalysis, Urgency};
use crate::submission::UploadMode;

/// One completed analysis session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub mode: UploadMode,
    pub problem: String,
    pub summary: String,
    pub urgency: Urgency,
    pub recommendations: Vec<String>,
    pub frame_count: i32,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_report(
        id: Uuid,
        mode: UploadMode,
        problem: impl Into<String>,
        frame_count: usize,
        report: &OverallAnalysis,
    ) -> Self {
        Self {
            id,
            mode,
            problem: problem.into(),
            summary: report.summary.clone(),
            urgency: report.urgency,
            recommendations: report.recommendations.clone(),
            frame_count: frame_count as i32,
            created_at: Utc::now(),
        }
    }
}

/// One per-frame finding row, keyed to its session.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResultRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub frame_number: i32,
    pub timestamp: f64,
    pub analysis: String,
    pub confidence: f64,
    pub findings: Vec<String>,
    pub storage_path: Option<String>,
    pub storage_url: Option<String>,
}

impl FrameResultRecord {
    pub fn from_frame(session_id: Uuid, frame: &FrameAnalysis) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            frame_number: frame.frame_number as i32,
            timestamp: frame.timestamp,
            analysis: frame.analysis.clone(),
            confidence: f64::from(frame.confidence),
            findings: frame.findings.clone(),
            storage_path: frame.storage_path.clone(),
            storage_url: frame.storage_url.clone(),
        }
    }
}
