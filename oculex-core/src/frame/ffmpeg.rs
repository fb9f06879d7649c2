//! FFmpeg-backed [`VideoSampler`] for local files.
//!
//! All libav work happens on blocking threads, and the decode path is
//! wrapped in `catch_unwind`: a malformed container must surface as a
//! sampling error, not take the runtime down.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ffmpeg_next as ffmpeg;

use super::raster::RasterFrame;
use super::video::VideoSampler;
use super::FrameError;

/// Samples frames from a local video file via libav.
pub struct FfmpegSampler {
    path: PathBuf,
}

impl FfmpegSampler {
    /// Initializes libav and binds the sampler to a file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FrameError> {
        ffmpeg::init().map_err(|e| FrameError::VideoOpen(e.to_string()))?;
        let path = path.into();
        if !path.exists() {
            return Err(FrameError::VideoOpen(format!(
                "no such file: {}",
                path.display()
            )));
        }
        Ok(Self { path })
    }
}

impl fmt::Debug for FfmpegSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegSampler")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl VideoSampler for FfmpegSampler {
    async fn duration_secs(&self) -> Result<f64, FrameError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || probe_duration(&path))
            .await
            .map_err(|e| FrameError::Task(e.to_string()))?
    }

    async fn rgba_at(&self, timestamp: f64) -> Result<RasterFrame, FrameError> {
        let path = self.path.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            catch_unwind(AssertUnwindSafe(|| decode_rgba_at(&path, timestamp)))
        })
        .await
        .map_err(|e| FrameError::Task(e.to_string()))?;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(FrameError::Sample {
                timestamp,
                message: "decoder panicked".to_string(),
            }),
        }
    }
}

fn probe_duration(path: &Path) -> Result<f64, FrameError> {
    let input_ctx =
        ffmpeg::format::input(path).map_err(|e| FrameError::VideoOpen(e.to_string()))?;

    // Container clock first (AV_TIME_BASE units).
    let micros = input_ctx.duration();
    if micros > 0 {
        return Ok(micros as f64 / 1_000_000.0);
    }

    // Some containers only report per-stream durations.
    let stream = input_ctx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| FrameError::VideoOpen("no video stream".to_string()))?;
    let time_base = stream.time_base();
    let duration = stream.duration();
    if duration > 0 && time_base.denominator() != 0 {
        Ok(duration as f64 * f64::from(time_base.numerator())
            / f64::from(time_base.denominator()))
    } else {
        Ok(0.0)
    }
}

fn decode_rgba_at(path: &Path, timestamp: f64) -> Result<RasterFrame, FrameError> {
    let sample_err = |message: String| FrameError::Sample { timestamp, message };

    let mut input_ctx =
        ffmpeg::format::input(path).map_err(|e| FrameError::VideoOpen(e.to_string()))?;

    let (stream_index, parameters) = {
        let stream = input_ctx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| sample_err("no video stream".to_string()))?;
        (stream.index(), stream.parameters())
    };

    let position = (timestamp * 1_000_000.0) as i64;
    input_ctx
        .seek(position, ..position)
        .map_err(|e| sample_err(format!("seek failed: {e}")))?;

    let codec_ctx = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|e| sample_err(format!("codec setup failed: {e}")))?;
    let mut decoder = codec_ctx
        .decoder()
        .video()
        .map_err(|e| sample_err(format!("decoder setup failed: {e}")))?;

    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::format::Pixel::RGBA,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .map_err(|e| sample_err(format!("scaler setup failed: {e}")))?;

    let mut decoded = ffmpeg::util::frame::video::Video::empty();
    let mut rgba = ffmpeg::util::frame::video::Video::empty();

    for (stream, packet) in input_ctx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder
            .send_packet(&packet)
            .map_err(|e| sample_err(format!("send packet failed: {e}")))?;
        match decoder.receive_frame(&mut decoded) {
            Ok(()) => {
                scaler
                    .run(&decoded, &mut rgba)
                    .map_err(|e| sample_err(format!("scaling failed: {e}")))?;
                return raster_from_frame(&rgba);
            }
            // EAGAIN: the decoder needs more packets before it can emit.
            Err(ffmpeg::Error::Other { errno: -11 }) => continue,
            Err(e) => return Err(sample_err(format!("decode failed: {e}"))),
        }
    }

    // EOF before a frame surfaced; flush the decoder once.
    decoder
        .send_eof()
        .map_err(|e| sample_err(format!("flush failed: {e}")))?;
    if decoder.receive_frame(&mut decoded).is_ok() {
        scaler
            .run(&decoded, &mut rgba)
            .map_err(|e| sample_err(format!("scaling failed: {e}")))?;
        return raster_from_frame(&rgba);
    }

    Err(sample_err("no decodable frame at requested position".to_string()))
}

/// Copies the scaled frame out row by row; libav pads rows to its own
/// alignment, so the stride can exceed `width * 4`.
fn raster_from_frame(frame: &ffmpeg::util::frame::video::Video) -> Result<RasterFrame, FrameError> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width as usize * 4;

    let mut rgba = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        rgba.extend_from_slice(&data[start..start + row_bytes]);
    }
    RasterFrame::new(width, height, rgba)
}
