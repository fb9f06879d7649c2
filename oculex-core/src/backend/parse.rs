//! Turning backend reply text into an [`OverallAnalysis`].
//!
//! Strict JSON first (bare, then fenced, then the outermost brace span);
//! when none of that holds, a lossy heuristic scrape keeps the run alive
//! rather than failing a finished analysis.

use std::sync::LazyLock;

use oculex_model::analysis::{OverallAnalysis, Urgency};
use regex::Regex;

use super::BackendResponse;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced-json pattern")
});

static HIGH_URGENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(critical|urgent|emergency|severe|immediate attention)\b")
        .expect("high-urgency pattern")
});

static LOW_URGENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(low urgency|routine|benign|unremarkable|no acute)\b")
        .expect("low-urgency pattern")
});

static BULLET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*\u{2022}]|\d+[.)])\s+(.+)$").expect("bullet-line pattern")
});

/// Attempts strict parsing of reply text as the report JSON shape.
pub fn try_structured(text: &str) -> Option<OverallAnalysis> {
    let trimmed = text.trim();
    if let Ok(report) = serde_json::from_str::<OverallAnalysis>(trimmed) {
        return Some(report);
    }
    if let Some(captures) = FENCED_JSON.captures(trimmed)
        && let Ok(report) = serde_json::from_str::<OverallAnalysis>(&captures[1])
    {
        return Some(report);
    }
    // Last resort: the outermost brace span, for replies that wrap JSON in
    // a sentence of prose.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        serde_json::from_str::<OverallAnalysis>(&trimmed[start..=end]).ok()
    } else {
        None
    }
}

/// Lossy fallback for prose replies: urgency from a keyword scan,
/// recommendations scraped from bullet or numbered lines, the whole text
/// as the summary, and no per-frame detail.
pub fn extract_from_prose(text: &str) -> OverallAnalysis {
    let urgency = if HIGH_URGENCY.is_match(text) {
        Urgency::High
    } else if LOW_URGENCY.is_match(text) {
        Urgency::Low
    } else {
        Urgency::Medium
    };

    let mut recommendations: Vec<String> = BULLET_LINE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if recommendations.is_empty() {
        recommendations.push("Review the findings with a qualified clinician.".to_string());
    }

    OverallAnalysis {
        summary: text.trim().to_string(),
        urgency,
        recommendations,
        frame_analyses: Vec::new(),
    }
}

/// Resolves a backend response to a report, salvaging prose when needed.
pub fn resolve_response(response: BackendResponse) -> OverallAnalysis {
    match response {
        BackendResponse::Structured(report) => report,
        BackendResponse::Unstructured(text) => {
            try_structured(&text).unwrap_or_else(|| extract_from_prose(&text))
        }
    }
}
