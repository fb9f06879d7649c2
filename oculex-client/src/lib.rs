//! # Oculex Client
//!
//! Driver library for submitting studies to an Oculex server: frame
//! preparation and optional remote staging, multipart submission, and the
//! incremental Server-Sent-Events consumer that turns the server's
//! progress stream into display state and a terminal outcome.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod driver;
pub mod stream;

pub use driver::{AnalysisClient, ClientError, encode_fields, stage_remote_frames};
pub use stream::{ProgressSpan, StreamConsumer, StreamOutcome};
