//! Incremental consumer for the server's progress stream.
//!
//! Hand-rolled line handling rather than an off-the-shelf SSE parser: the
//! protocol requires dispatching a final unterminated `data:` line when
//! the stream ends, which WHATWG-conformant parsers deliberately drop.

use oculex_model::analysis::OverallAnalysis;
use oculex_model::progress::ProgressEvent;
use tracing::warn;

/// Target range the server's 0-100 progress is remapped into, so it can
/// be spliced after locally-tracked extraction/upload progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSpan {
    lo: u8,
    hi: u8,
}

impl ProgressSpan {
    /// Full scale; no local work to splice with.
    pub const FULL: ProgressSpan = ProgressSpan { lo: 0, hi: 100 };

    pub fn new(lo: u8, hi: u8) -> Self {
        let hi = hi.clamp(lo, 100);
        Self { lo, hi }
    }

    fn remap(&self, progress: u8) -> u8 {
        let span = u32::from(self.hi - self.lo);
        self.lo + (u32::from(progress.min(100)) * span / 100) as u8
    }
}

/// How a consumed stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed(OverallAnalysis),
    Failed(String),
}

/// Decodes stream bytes into display state and a terminal outcome.
///
/// Bytes are buffered across chunk boundaries; a line only counts once its
/// newline arrives, except the final line, which [`Self::finish`]
/// dispatches unterminated. After the terminal event the consumer keeps
/// draining quietly but changes no further state.
#[derive(Debug)]
pub struct StreamConsumer {
    span: ProgressSpan,
    buffer: Vec<u8>,
    progress: u8,
    steps: Vec<String>,
    outcome: Option<StreamOutcome>,
}

impl StreamConsumer {
    pub fn new(span: ProgressSpan) -> Self {
        Self {
            span,
            buffer: Vec::new(),
            progress: span.lo,
            steps: Vec::new(),
            outcome: None,
        }
    }

    /// Remapped display progress.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Step log in arrival order, consecutive duplicates suppressed.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn outcome(&self) -> Option<&StreamOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Feeds one chunk of response bytes, dispatching every line the
    /// chunk completes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..newline]);
            self.handle_line(line.trim_end_matches('\r'));
        }
    }

    /// Dispatches the trailing unterminated line, if any. Call exactly
    /// once, after the stream ends.
    pub fn finish(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        self.handle_line(line.trim_end_matches('\r'));
    }

    fn handle_line(&mut self, line: &str) {
        // Keep-alive comments and blank separators carry no payload.
        let Some(json) = line.strip_prefix("data: ") else {
            return;
        };
        if self.is_finished() {
            return;
        }
        let event: ProgressEvent = match serde_json::from_str(json) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, line = json, "skipping malformed stream line");
                return;
            }
        };
        self.apply(event);
    }

    fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status { progress, step, .. } => {
                let mapped = self.span.remap(progress);
                self.progress = self.progress.max(mapped);
                if let Some(step) = step
                    && self.steps.last().map(String::as_str) != Some(step.as_str())
                {
                    self.steps.push(step);
                }
            }
            ProgressEvent::Results { results, .. } => {
                self.progress = self.span.hi;
                self.outcome = Some(StreamOutcome::Completed(results));
            }
            ProgressEvent::Error { error } => {
                self.outcome = Some(StreamOutcome::Failed(error));
            }
        }
    }
}
