//! The streaming analysis orchestrator.
//!
//! One submission in, one event stream out. The orchestrator walks a fixed
//! phase sequence (receive, parse, resolve frames, invoke the backend,
//! parse results, persist, clean up) and reports each phase to a
//! [`ProgressSink`], finishing with exactly one terminal event. The sink is
//! the server-push abstraction: the server binds it to an SSE channel,
//! tests bind it to a collecting vector.

mod orchestrator;
mod phase;
mod sink;

pub use orchestrator::{AnalysisSettings, Orchestrator};
pub use phase::AnalysisPhase;
pub use sink::{ProgressSink, SinkClosed};
