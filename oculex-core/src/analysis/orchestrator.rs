//! The run loop driving one submission from receipt to terminal event.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use oculex_model::analysis::OverallAnalysis;
use oculex_model::progress::{ProgressEvent, steps};
use oculex_model::record::{FrameResultRecord, SessionRecord};
use oculex_model::submission::{DicomContext, UploadMode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::phase::AnalysisPhase;
use super::sink::{ProgressSink, SinkClosed};
use crate::backend::{AnalysisBackend, AnalysisRequest, BackendFrame};
use crate::ports::{FrameFetcher, RecordStore};
use crate::retry::RetryPolicy;
use crate::submission::{
    FormFields, FrameHandle, FramePayload, ParsedSubmission, decode_data_url, decode_submission,
};

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Frames resolved concurrently per batch.
    pub resolve_batch_size: usize,
    /// Directory for best-effort staging of resolved frames; no staging
    /// when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            resolve_batch_size: 50,
            staging_dir: None,
        }
    }
}

/// Drives one submission at a time; owns no cross-run state.
///
/// Every failure after the stream opens becomes a single terminal error
/// event rather than an HTTP status, because by then the response has
/// already committed to the streaming content type.
pub struct Orchestrator {
    backend: Arc<dyn AnalysisBackend>,
    fetcher: Arc<dyn FrameFetcher>,
    records: Arc<dyn RecordStore>,
    retry: RetryPolicy,
    settings: AnalysisSettings,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retry", &self.retry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

struct ResolvedFrame {
    frame_number: u32,
    timestamp: f64,
    png: Vec<u8>,
    storage_path: Option<String>,
    storage_url: Option<String>,
}

/// Sink wrapper enforcing the monotonic-progress guarantee.
///
/// The resolution band (15-40) can overtake the fixed `frames_saved` and
/// `preparing_model` values on large submissions; clamping each emission
/// to the running maximum keeps the stream non-decreasing while leaving
/// the literal values untouched whenever they are already in order.
struct Emitter<'a, S: ProgressSink> {
    sink: &'a mut S,
    last: u8,
}

impl<'a, S: ProgressSink> Emitter<'a, S> {
    fn new(sink: &'a mut S) -> Self {
        Self { sink, last: 0 }
    }

    async fn status(&mut self, progress: u8, step: impl Into<String>) -> Result<(), SinkClosed> {
        let progress = progress.max(self.last);
        self.last = progress;
        self.sink.send(ProgressEvent::status(progress, step)).await
    }

    async fn status_with_count(
        &mut self,
        progress: u8,
        step: impl Into<String>,
        count: u32,
    ) -> Result<(), SinkClosed> {
        let progress = progress.max(self.last);
        self.last = progress;
        self.sink
            .send(ProgressEvent::status_with_count(progress, step, count))
            .await
    }

    async fn results(&mut self, report: OverallAnalysis) -> Result<(), SinkClosed> {
        self.last = 100;
        self.sink.send(ProgressEvent::results(report)).await
    }

    async fn error(&mut self, message: impl Into<String>) -> Result<(), SinkClosed> {
        self.sink.send(ProgressEvent::error(message)).await
    }
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        fetcher: Arc<dyn FrameFetcher>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            backend,
            fetcher,
            records,
            retry: RetryPolicy::default(),
            settings: AnalysisSettings::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = AnalysisSettings {
            resolve_batch_size: settings.resolve_batch_size.max(1),
            ..settings
        };
        self
    }

    /// Runs one submission to its terminal event.
    ///
    /// A closed sink means the client disconnected; the run is abandoned
    /// quietly and whatever phase it was in is its last. Staged frames are
    /// released here regardless of how the run ended, so a disconnect
    /// takes the same cleanup path as normal completion.
    pub async fn run<S: ProgressSink>(&self, form: FormFields, sink: &mut S) {
        let mut emitter = Emitter::new(sink);
        let mut staged = None;
        let outcome = self.drive(form, &mut emitter, &mut staged).await;
        self.cleanup_staging(staged.take().as_deref()).await;
        if outcome.is_err() {
            info!(
                target: "analysis::state",
                "consumer disconnected, abandoning run"
            );
        }
    }

    async fn drive<S: ProgressSink>(
        &self,
        form: FormFields,
        emitter: &mut Emitter<'_, S>,
        staged: &mut Option<PathBuf>,
    ) -> Result<(), SinkClosed> {
        let mut phase = AnalysisPhase::Received;
        emitter.status(5, steps::RECEIVED_REQUEST).await?;

        advance(&mut phase, AnalysisPhase::Parsing, None);
        let parsed = match decode_submission(&form) {
            Ok(parsed) => parsed,
            Err(err) => return self.fail(&mut phase, emitter, None, err.to_string()).await,
        };
        let session_id = parsed.session_id;
        info!(
            target: "analysis::state",
            session = %session_id,
            mode = %parsed.mode,
            frames = parsed.frames.len(),
            "submission accepted"
        );
        emitter.status(10, steps::PARSING_FORM_DATA).await?;

        advance(&mut phase, AnalysisPhase::ResolvingFrames, Some(session_id));
        let resolved = match self.resolve_frames(&parsed, emitter).await? {
            Ok(resolved) => resolved,
            Err(message) => {
                return self.fail(&mut phase, emitter, Some(session_id), message).await;
            }
        };
        *staged = self.stage_frames(session_id, &resolved).await;
        emitter
            .status_with_count(20, steps::FRAMES_SAVED, resolved.len() as u32)
            .await?;

        advance(&mut phase, AnalysisPhase::InvokingBackend, Some(session_id));
        emitter.status(30, steps::PREPARING_MODEL).await?;
        let request = build_request(&parsed, &resolved);
        let response = self
            .retry
            .run("vision_backend", || self.backend.analyze(&request))
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return self.fail(&mut phase, emitter, Some(session_id), err.to_string()).await;
            }
        };

        advance(&mut phase, AnalysisPhase::ParsingResults, Some(session_id));
        emitter.status(90, steps::PARSING_RESULTS).await?;
        let mut report = crate::backend::parse::resolve_response(response);
        attach_storage_refs(&mut report, &resolved);
        emitter.status(95, steps::FINALIZING).await?;

        advance(&mut phase, AnalysisPhase::Persisting, Some(session_id));
        emitter.status(96, steps::SAVING_TO_DATABASE).await?;
        self.persist(session_id, &parsed, &report).await;

        advance(&mut phase, AnalysisPhase::Cleanup, Some(session_id));
        emitter.status(98, steps::CLEANUP).await?;
        self.cleanup_staging(staged.take().as_deref()).await;

        advance(&mut phase, AnalysisPhase::Completed, Some(session_id));
        emitter.results(report).await
    }

    async fn fail<S: ProgressSink>(
        &self,
        phase: &mut AnalysisPhase,
        emitter: &mut Emitter<'_, S>,
        session_id: Option<Uuid>,
        message: String,
    ) -> Result<(), SinkClosed> {
        warn!(
            target: "analysis::state",
            session = session_id.map(|id| id.to_string()).unwrap_or_default(),
            from = phase.as_str(),
            error = %message,
            "run failed"
        );
        advance(phase, AnalysisPhase::Failed, session_id);
        emitter.error(message).await
    }

    /// Resolves every frame reference to PNG bytes, batch by batch.
    ///
    /// The outer `Result` is sink closure; the inner one is the run's
    /// fate. Any single unresolvable frame fails the whole run: silently
    /// dropping a frame could skew a medical analysis, so the per-item
    /// tolerance of client-side DICOM decoding does not apply here.
    async fn resolve_frames<S: ProgressSink>(
        &self,
        parsed: &ParsedSubmission,
        emitter: &mut Emitter<'_, S>,
    ) -> Result<Result<Vec<ResolvedFrame>, String>, SinkClosed> {
        let frame_count = parsed.frames.len();
        let mut resolved = Vec::with_capacity(frame_count);

        for (batch_index, batch) in parsed.frames.chunks(self.settings.resolve_batch_size).enumerate() {
            let batch_start = batch_index * self.settings.resolve_batch_size;
            let progress = 15 + (batch_start * 25 / frame_count) as u8;
            emitter
                .status(progress, steps::loading_batch(batch_index + 1))
                .await?;

            let results = join_all(batch.iter().map(|handle| self.resolve_one(handle))).await;
            for result in results {
                match result {
                    Ok(frame) => resolved.push(frame),
                    Err(message) => return Ok(Err(message)),
                }
            }
        }
        Ok(Ok(resolved))
    }

    async fn resolve_one(&self, handle: &FrameHandle) -> Result<ResolvedFrame, String> {
        let (png, storage_path, storage_url) = match &handle.payload {
            FramePayload::Remote { url, path } => {
                let bytes = self.fetcher.fetch(url).await.map_err(|err| {
                    format!("failed to fetch frame {}: {err}", handle.frame_number)
                })?;
                (bytes, path.clone(), Some(url.clone()))
            }
            FramePayload::Inline { data_url } => {
                let bytes = decode_data_url(data_url).map_err(|err| {
                    format!("failed to decode frame {}: {err}", handle.frame_number)
                })?;
                (bytes, None, None)
            }
        };
        Ok(ResolvedFrame {
            frame_number: handle.frame_number,
            timestamp: handle.timestamp,
            png,
            storage_path,
            storage_url,
        })
    }

    /// Writes resolved frames under the staging directory, best-effort.
    /// Returns the session's staging path when anything was written.
    async fn stage_frames(&self, session_id: Uuid, frames: &[ResolvedFrame]) -> Option<PathBuf> {
        let root = self.settings.staging_dir.as_ref()?;
        let dir = root.join(session_id.to_string());
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!(session = %session_id, error = %err, "could not create staging directory");
            return None;
        }
        for frame in frames {
            let path = dir.join(format!("frame_{}.png", frame.frame_number));
            if let Err(err) = tokio::fs::write(&path, &frame.png).await {
                warn!(session = %session_id, path = %path.display(), error = %err, "frame staging failed");
            }
        }
        Some(dir)
    }

    async fn cleanup_staging(&self, dir: Option<&std::path::Path>) {
        let Some(dir) = dir else { return };
        if let Err(err) = tokio::fs::remove_dir_all(dir).await {
            warn!(path = %dir.display(), error = %err, "staging cleanup failed");
        }
    }

    /// Best-effort persistence: failures are logged and swallowed so a
    /// finished analysis is never reported as an error.
    async fn persist(&self, session_id: Uuid, parsed: &ParsedSubmission, report: &OverallAnalysis) {
        let session = SessionRecord::from_report(
            session_id,
            parsed.mode,
            &parsed.problem,
            parsed.frames.len(),
            report,
        );
        if let Err(err) = self.records.insert_session(&session).await {
            warn!(session = %session_id, error = %err, "session record write failed");
            return;
        }
        for frame in &report.frame_analyses {
            let record = FrameResultRecord::from_frame(session_id, frame);
            if let Err(err) = self.records.insert_frame_result(&record).await {
                warn!(
                    session = %session_id,
                    frame = frame.frame_number,
                    error = %err,
                    "frame record write failed"
                );
            }
        }
    }
}

fn advance(phase: &mut AnalysisPhase, next: AnalysisPhase, session_id: Option<Uuid>) {
    if !phase.can_transition_to(next) {
        warn!(
            target: "analysis::state",
            from = phase.as_str(),
            to = next.as_str(),
            "illegal phase transition"
        );
    }
    debug!(
        target: "analysis::state",
        session = session_id.map(|id| id.to_string()).unwrap_or_default(),
        from = phase.as_str(),
        to = next.as_str(),
        "phase transition"
    );
    *phase = next;
}

fn build_request(parsed: &ParsedSubmission, resolved: &[ResolvedFrame]) -> AnalysisRequest {
    AnalysisRequest {
        problem: parsed.problem.clone(),
        mode: parsed.mode,
        dicom: merge_dicom_context(parsed),
        frames: resolved
            .iter()
            .map(|frame| BackendFrame {
                frame_number: frame.frame_number,
                timestamp: frame.timestamp,
                png: frame.png.clone(),
            })
            .collect(),
    }
}

/// Fills blank study-level DICOM fields from per-frame header metadata.
fn merge_dicom_context(parsed: &ParsedSubmission) -> Option<DicomContext> {
    let mut context = match (&parsed.dicom, parsed.mode) {
        (Some(context), _) => context.clone(),
        (None, UploadMode::Dicom) => DicomContext {
            folder: String::new(),
            modality: None,
            patient_id: None,
        },
        (None, UploadMode::Video) => return None,
    };

    if context.modality.as_deref().unwrap_or("").is_empty() {
        context.modality = parsed
            .frames
            .iter()
            .find_map(|f| f.metadata.as_ref().and_then(|m| m.modality.clone()));
    }
    if context.patient_id.as_deref().unwrap_or("").is_empty() {
        context.patient_id = parsed
            .frames
            .iter()
            .find_map(|f| f.metadata.as_ref().and_then(|m| m.patient_id.clone()));
    }
    Some(context)
}

/// Copies the submission's storage references onto matching per-frame
/// findings, where the backend (which never sees URLs) left them blank.
fn attach_storage_refs(report: &mut OverallAnalysis, resolved: &[ResolvedFrame]) {
    for finding in &mut report.frame_analyses {
        let Some(source) = resolved
            .iter()
            .find(|frame| frame.frame_number == finding.frame_number)
        else {
            continue;
        };
        if finding.storage_path.is_none() {
            finding.storage_path = source.storage_path.clone();
        }
        if finding.storage_url.is_none() {
            finding.storage_url = source.storage_url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use oculex_model::analysis::{FrameAnalysis, Urgency};
    use oculex_model::wire;

    use super::*;
    use crate::backend::{BackendError, BackendResponse};
    use crate::ports::{FetchError, StoreError};

    struct VecSink {
        events: Vec<ProgressEvent>,
        /// Closes the sink after this many accepted events, when set.
        close_after: Option<usize>,
    }

    impl VecSink {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                close_after: None,
            }
        }
    }

    #[async_trait]
    impl ProgressSink for VecSink {
        async fn send(&mut self, event: ProgressEvent) -> Result<(), SinkClosed> {
            if let Some(limit) = self.close_after
                && self.events.len() >= limit
            {
                return Err(SinkClosed);
            }
            self.events.push(event);
            Ok(())
        }
    }

    enum Script {
        Structured,
        Prose(&'static str),
        Fail(BackendError),
    }

    struct ScriptedBackend {
        script: Script,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn analyze(
            &self,
            request: &AnalysisRequest,
        ) -> Result<BackendResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Structured => {
                    let mut report =
                        OverallAnalysis::new("Stable appearance.", Urgency::Low);
                    report.frame_analyses = request
                        .frames
                        .iter()
                        .map(|frame| FrameAnalysis {
                            frame_number: frame.frame_number,
                            timestamp: frame.timestamp,
                            analysis: "Clear".to_string(),
                            confidence: 0.8,
                            findings: vec![],
                            storage_path: None,
                            storage_url: None,
                        })
                        .collect();
                    Ok(BackendResponse::Structured(report))
                }
                Script::Prose(text) => Ok(BackendResponse::Unstructured(text.to_string())),
                Script::Fail(err) => Err(err.clone()),
            }
        }
    }

    #[derive(Default)]
    struct MapFetcher {
        replies: Mutex<std::collections::HashMap<String, Result<Vec<u8>, FetchError>>>,
    }

    impl MapFetcher {
        fn with(url: &str, reply: Result<Vec<u8>, FetchError>) -> Arc<Self> {
            let fetcher = Self::default();
            fetcher
                .replies
                .lock()
                .unwrap()
                .insert(url.to_string(), reply);
            Arc::new(fetcher)
        }
    }

    #[async_trait]
    impl FrameFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.replies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchError::Status(404)))
        }
    }

    #[derive(Default)]
    struct CountingStore {
        sessions: Mutex<Vec<SessionRecord>>,
        frames: Mutex<Vec<FrameResultRecord>>,
        fail_sessions: bool,
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
            if self.fail_sessions {
                return Err(StoreError("connection refused".to_string()));
            }
            self.sessions.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn insert_frame_result(
            &self,
            record: &FrameResultRecord,
        ) -> Result<(), StoreError> {
            self.frames.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn orchestrator(
        backend: Arc<ScriptedBackend>,
        fetcher: Arc<MapFetcher>,
        records: Arc<CountingStore>,
    ) -> Orchestrator {
        Orchestrator::new(backend, fetcher, records)
            .with_retry(RetryPolicy::new(3, std::time::Duration::from_millis(1)))
    }

    fn inline_form(frame_count: usize) -> FormFields {
        let mut form = FormFields::new();
        form.insert(wire::UPLOAD_MODE, "video");
        form.insert(wire::PROBLEM, "persistent knee swelling");
        form.insert(wire::FRAME_COUNT, frame_count.to_string());
        for i in 0..frame_count {
            form.insert(wire::frame(i), "data:image/png;base64,aGk=");
            form.insert(wire::timestamp(i), format!("{}", i as f64 * 0.2));
        }
        form
    }

    fn progress_values(events: &[ProgressEvent]) -> Vec<u8> {
        events.iter().filter_map(|e| e.progress()).collect()
    }

    #[tokio::test]
    async fn happy_path_emits_monotonic_progress_ending_at_100() {
        let backend = ScriptedBackend::new(Script::Structured);
        let records = Arc::new(CountingStore::default());
        let orch = orchestrator(backend.clone(), Arc::new(MapFetcher::default()), records.clone());

        let mut sink = VecSink::new();
        orch.run(inline_form(3), &mut sink).await;

        let values = progress_values(&sink.events);
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(*values.last().unwrap(), 100);

        let terminal: Vec<_> = sink.events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert!(matches!(
            sink.events.last(),
            Some(ProgressEvent::Results { progress: 100, .. })
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn happy_path_walks_the_expected_steps() {
        let backend = ScriptedBackend::new(Script::Structured);
        let orch = orchestrator(
            backend,
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        );

        let mut sink = VecSink::new();
        orch.run(inline_form(2), &mut sink).await;

        let steps: Vec<_> = sink.events.iter().filter_map(|e| e.step()).collect();
        assert_eq!(
            steps,
            vec![
                "received_request",
                "parsing_form_data",
                "loading_batch_1",
                "frames_saved",
                "preparing_model",
                "parsing_results",
                "finalizing",
                "saving_to_database",
                "cleanup",
            ]
        );
    }

    #[tokio::test]
    async fn results_are_persisted_per_session_and_frame() {
        let backend = ScriptedBackend::new(Script::Structured);
        let records = Arc::new(CountingStore::default());
        let orch = orchestrator(backend, Arc::new(MapFetcher::default()), records.clone());

        let mut sink = VecSink::new();
        orch.run(inline_form(3), &mut sink).await;

        let sessions = records.sessions.lock().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].frame_count, 3);
        assert_eq!(records.frames.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn persistence_failure_never_becomes_a_stream_error() {
        let backend = ScriptedBackend::new(Script::Structured);
        let records = Arc::new(CountingStore {
            fail_sessions: true,
            ..Default::default()
        });
        let orch = orchestrator(backend, Arc::new(MapFetcher::default()), records.clone());

        let mut sink = VecSink::new();
        orch.run(inline_form(1), &mut sink).await;

        assert!(matches!(
            sink.events.last(),
            Some(ProgressEvent::Results { .. })
        ));
        assert!(records.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_frames_fails_before_any_resolution() {
        let backend = ScriptedBackend::new(Script::Structured);
        let orch = orchestrator(
            backend.clone(),
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        );

        let mut form = FormFields::new();
        form.insert(wire::UPLOAD_MODE, "video");
        form.insert(wire::PROBLEM, "p");
        form.insert(wire::FRAME_COUNT, "0");

        let mut sink = VecSink::new();
        orch.run(form, &mut sink).await;

        assert!(matches!(
            sink.events.last(),
            Some(ProgressEvent::Error { .. })
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn unresolvable_referenced_frame_fails_the_whole_run() {
        let backend = ScriptedBackend::new(Script::Structured);
        let records = Arc::new(CountingStore::default());
        let fetcher = MapFetcher::with(
            "https://store.example/a.png",
            Err(FetchError::Status(403)),
        );
        let orch = orchestrator(backend.clone(), fetcher, records.clone());

        let mut form = FormFields::new();
        form.insert(wire::UPLOAD_MODE, "video");
        form.insert(wire::PROBLEM, "p");
        form.insert(wire::FRAME_COUNT, "1");
        form.insert(wire::frame_url(0), "https://store.example/a.png");
        form.insert(wire::timestamp(0), "0");

        let mut sink = VecSink::new();
        orch.run(form, &mut sink).await;

        match sink.events.last() {
            Some(ProgressEvent::Error { error }) => {
                assert!(error.contains("fetch"), "{error}");
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(backend.calls(), 0);
        assert!(records.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn backend_retry_exhaustion_leaves_no_records() {
        let backend = ScriptedBackend::new(Script::Fail(BackendError::Status {
            status: 503,
            message: "unavailable".to_string(),
        }));
        let records = Arc::new(CountingStore::default());
        let orch = orchestrator(backend.clone(), Arc::new(MapFetcher::default()), records.clone());

        let mut sink = VecSink::new();
        orch.run(inline_form(1), &mut sink).await;

        assert!(matches!(
            sink.events.last(),
            Some(ProgressEvent::Error { .. })
        ));
        // 1 + max_retries attempts, then the run fails.
        assert_eq!(backend.calls(), 4);
        assert!(records.sessions.lock().unwrap().is_empty());
        assert!(records.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_retryable_backend_error_is_called_once() {
        let backend = ScriptedBackend::new(Script::Fail(BackendError::Status {
            status: 400,
            message: "bad request".to_string(),
        }));
        let orch = orchestrator(
            backend.clone(),
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        );

        let mut sink = VecSink::new();
        orch.run(inline_form(1), &mut sink).await;

        assert_eq!(backend.calls(), 1);
        assert!(matches!(
            sink.events.last(),
            Some(ProgressEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn prose_reply_is_salvaged_into_results() {
        let backend = ScriptedBackend::new(Script::Prose(
            "No acute abnormality.\n- Routine follow-up in six months",
        ));
        let orch = orchestrator(
            backend,
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        );

        let mut sink = VecSink::new();
        orch.run(inline_form(1), &mut sink).await;

        match sink.events.last() {
            Some(ProgressEvent::Results { results, .. }) => {
                assert_eq!(results.urgency, Urgency::Low);
                assert_eq!(
                    results.recommendations,
                    vec!["Routine follow-up in six months"]
                );
            }
            other => panic!("expected results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_submissions_keep_progress_monotonic_across_the_band() {
        let backend = ScriptedBackend::new(Script::Structured);
        let orch = orchestrator(
            backend,
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        )
        .with_settings(AnalysisSettings {
            resolve_batch_size: 2,
            staging_dir: None,
        });

        let mut sink = VecSink::new();
        orch.run(inline_form(8), &mut sink).await;

        let values = progress_values(&sink.events);
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");

        let steps: Vec<_> = sink.events.iter().filter_map(|e| e.step()).collect();
        assert!(steps.contains(&"loading_batch_4"));
        // Last batch starts at index 6 of 8: 15 + 6*25/8 = 33, so the
        // fixed frames_saved/preparing_model values get clamped up.
        assert!(values.contains(&33), "{values:?}");
        assert!(!values.contains(&20), "{values:?}");
    }

    #[tokio::test]
    async fn remote_references_are_attached_to_frame_findings() {
        let backend = ScriptedBackend::new(Script::Structured);
        let fetcher = MapFetcher::with("https://store.example/f7.png", Ok(b"png".to_vec()));
        let orch = orchestrator(backend, fetcher, Arc::new(CountingStore::default()));

        let mut form = FormFields::new();
        form.insert(wire::UPLOAD_MODE, "video");
        form.insert(wire::PROBLEM, "p");
        form.insert(wire::FRAME_COUNT, "1");
        form.insert(wire::frame_url(0), "https://store.example/f7.png");
        form.insert(wire::frame_path(0), "sessions/s/f7.png");
        form.insert(wire::frame_number(0), "7");
        form.insert(wire::timestamp(0), "1.4");

        let mut sink = VecSink::new();
        orch.run(form, &mut sink).await;

        match sink.events.last() {
            Some(ProgressEvent::Results { results, .. }) => {
                let finding = &results.frame_analyses[0];
                assert_eq!(finding.frame_number, 7);
                assert_eq!(finding.storage_path.as_deref(), Some("sessions/s/f7.png"));
                assert_eq!(
                    finding.storage_url.as_deref(),
                    Some("https://store.example/f7.png")
                );
            }
            other => panic!("expected results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn staged_frames_are_removed_during_cleanup() {
        let staging = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Script::Structured);
        let orch = orchestrator(
            backend,
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        )
        .with_settings(AnalysisSettings {
            resolve_batch_size: 50,
            staging_dir: Some(staging.path().to_path_buf()),
        });

        let mut sink = VecSink::new();
        orch.run(inline_form(2), &mut sink).await;

        assert!(matches!(
            sink.events.last(),
            Some(ProgressEvent::Results { .. })
        ));
        let leftovers: Vec<_> = std::fs::read_dir(staging.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn disconnect_after_staging_still_removes_the_session_dir() {
        let staging = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Script::Structured);
        let orch = orchestrator(
            backend.clone(),
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        )
        .with_settings(AnalysisSettings {
            resolve_batch_size: 50,
            staging_dir: Some(staging.path().to_path_buf()),
        });

        // The sink closes on the frames_saved emit, right after staging.
        let mut sink = VecSink::new();
        sink.close_after = Some(3);
        orch.run(inline_form(2), &mut sink).await;

        assert!(sink.events.iter().all(|e| !e.is_terminal()));
        assert_eq!(backend.calls(), 0);
        let leftovers: Vec<_> = std::fs::read_dir(staging.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn disconnected_consumer_abandons_the_run() {
        let backend = ScriptedBackend::new(Script::Structured);
        let orch = orchestrator(
            backend.clone(),
            Arc::new(MapFetcher::default()),
            Arc::new(CountingStore::default()),
        );

        let mut sink = VecSink::new();
        sink.close_after = Some(2);
        orch.run(inline_form(1), &mut sink).await;

        assert_eq!(sink.events.len(), 2);
        assert!(sink.events.iter().all(|e| !e.is_terminal()));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn dicom_context_falls_back_to_frame_metadata() {
        let mut form = inline_form(1);
        form.insert(wire::UPLOAD_MODE, "dicom");
        form.insert(wire::DICOM_FOLDER, "series-3");
        form.insert(
            wire::metadata(0),
            r#"{"modality":"US","patientID":"patient-55"}"#,
        );
        let parsed = decode_submission(&form).unwrap();

        let context = merge_dicom_context(&parsed).unwrap();
        assert_eq!(context.folder, "series-3");
        assert_eq!(context.modality.as_deref(), Some("US"));
        assert_eq!(context.patient_id.as_deref(), Some("patient-55"));
    }
}
