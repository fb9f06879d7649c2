//! Command-line submission driver for video studies.
//!
//! Extracts frames locally, optionally stages them in blob storage, posts
//! the submission, renders progress to stderr, and writes the final
//! report JSON to stdout.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use oculex_client::{AnalysisClient, ProgressSpan, StreamOutcome};
use oculex_core::submission::{
    EncodeOptions, VideoCandidate, validate_video_submission,
};
use oculex_model::submission::UploadMode;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "oculex-submit")]
#[command(about = "Submit a medical video for streaming analysis")]
struct Cli {
    /// Video file to analyze
    video: PathBuf,

    /// Clinical question or area of concern
    #[arg(long)]
    problem: String,

    /// Sampling rate in frames per second
    #[arg(long, default_value_t = 2.0)]
    fps: f64,

    /// Server base URL
    #[arg(long, default_value = "http://localhost:8420", env = "OCULEX_SERVER")]
    server: String,

    /// Send frames inline as data URLs instead of staging them in storage
    #[arg(long)]
    inline: bool,

    /// Storage REST endpoint; enables remote staging (env OCULEX_STORAGE_URL)
    #[arg(long, env = "OCULEX_STORAGE_URL")]
    storage_url: Option<String>,

    /// Storage bucket name
    #[arg(long, env = "OCULEX_STORAGE_BUCKET", default_value = "frames")]
    storage_bucket: String,

    /// Storage API key
    #[arg(long, env = "OCULEX_STORAGE_KEY", hide_env_values = true)]
    storage_key: Option<String>,
}

fn mime_for(path: &PathBuf) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        other => other.unwrap_or("unknown"),
    }
    .to_string()
}

#[cfg(feature = "ffmpeg")]
async fn extract_frames(
    path: &PathBuf,
    fps: f64,
) -> anyhow::Result<Vec<oculex_core::frame::Frame>> {
    use std::sync::Arc;

    use oculex_core::frame::{
        FfmpegSampler, FrameExtractor, LocalSamplingExtractor, SamplingPolicy,
    };

    let sampler = Arc::new(FfmpegSampler::open(path.clone())?);
    let extractor = LocalSamplingExtractor::new(sampler, SamplingPolicy::new(fps)?);
    Ok(extractor.extract().await?)
}

#[cfg(not(feature = "ffmpeg"))]
async fn extract_frames(
    _path: &PathBuf,
    _fps: f64,
) -> anyhow::Result<Vec<oculex_core::frame::Frame>> {
    anyhow::bail!(
        "this build has no video sampler; rebuild with `--features ffmpeg`"
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let size_bytes = std::fs::metadata(&cli.video)
        .with_context(|| format!("cannot read {}", cli.video.display()))?
        .len();
    let candidate = VideoCandidate {
        mime: mime_for(&cli.video),
        size_bytes,
    };
    validate_video_submission(Some(&candidate), &cli.problem)?;

    eprintln!("extracting frames at {} fps...", cli.fps);
    let mut frames = extract_frames(&cli.video, cli.fps).await?;
    anyhow::ensure!(!frames.is_empty(), "no frames could be extracted");
    eprintln!("extracted {} frames", frames.len());

    let session_id = Uuid::new_v4();
    let http = reqwest::Client::new();

    // Extraction and upload own 0-50 of the displayed bar; the server's
    // stream is spliced into 50-100.
    if !cli.inline
        && let (Some(url), Some(key)) = (&cli.storage_url, &cli.storage_key)
    {
        let store = oculex_core::storage::RestBlobStore::new(
            http.clone(),
            url.clone(),
            cli.storage_bucket.clone(),
            key.clone(),
        );
        oculex_client::stage_remote_frames(&store, session_id, &mut frames, |done, total| {
            eprintln!("uploaded {done}/{total} frames");
        })
        .await?;
    }

    let options = EncodeOptions {
        mode: UploadMode::Video,
        problem: &cli.problem,
        session_id: Some(session_id),
        dicom: None,
    };
    let fields = oculex_client::encode_fields(&options, &frames)?;

    let client = AnalysisClient::new(http, &cli.server);
    let mut last_step = String::new();
    let outcome = client
        .submit(fields, ProgressSpan::new(50, 100), |progress, step| {
            if let Some(step) = step
                && step != last_step
            {
                last_step = step.to_string();
                eprintln!("[{progress:3}%] {step}");
            }
        })
        .await?;

    match outcome {
        StreamOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        StreamOutcome::Failed(message) => anyhow::bail!("analysis failed: {message}"),
    }
}
