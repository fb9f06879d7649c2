//! Timestamp-driven video sampling.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::raster::RasterFrame;
use super::{Frame, FrameError, FrameExtractor};

/// How densely to sample a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    fps: f64,
    max_frames: Option<u32>,
}

impl SamplingPolicy {
    /// Absolute ceiling on extracted frames, regardless of rate.
    pub const HARD_CAP: u32 = 200;

    pub fn new(fps: f64) -> Result<Self, FrameError> {
        if !(fps > 0.0) {
            return Err(FrameError::InvalidRate(fps));
        }
        Ok(Self {
            fps,
            max_frames: None,
        })
    }

    /// Overrides the derived frame cap.
    pub fn with_max_frames(mut self, max_frames: u32) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Seconds between consecutive samples.
    pub fn interval(&self) -> f64 {
        1.0 / self.fps
    }

    /// Effective cap: the override, or 30 seconds' worth of frames bounded
    /// by [`Self::HARD_CAP`].
    pub fn frame_cap(&self) -> u32 {
        self.max_frames
            .unwrap_or_else(|| ((self.fps * 30.0) as u32).min(Self::HARD_CAP))
    }
}

/// Decodes one RGBA frame at (or just after) a requested timestamp.
#[async_trait]
pub trait VideoSampler: Send + Sync {
    async fn duration_secs(&self) -> Result<f64, FrameError>;
    async fn rgba_at(&self, timestamp: f64) -> Result<RasterFrame, FrameError>;
}

/// Samples a local video at a fixed interval until duration or cap.
///
/// Timestamps are computed as `index * interval` rather than accumulated,
/// so long extractions do not drift. Sampling stops at the first timestamp
/// that reaches the reported duration; any sampler error is fatal, since a
/// video that cannot be decoded has nothing meaningful to submit.
pub struct LocalSamplingExtractor {
    sampler: Arc<dyn VideoSampler>,
    policy: SamplingPolicy,
}

impl LocalSamplingExtractor {
    pub fn new(sampler: Arc<dyn VideoSampler>, policy: SamplingPolicy) -> Self {
        Self { sampler, policy }
    }
}

impl fmt::Debug for LocalSamplingExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSamplingExtractor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FrameExtractor for LocalSamplingExtractor {
    async fn extract(&self) -> Result<Vec<Frame>, FrameError> {
        let duration = self.sampler.duration_secs().await?;
        let interval = self.policy.interval();
        let cap = self.policy.frame_cap();

        let mut frames = Vec::new();
        for i in 0..cap {
            let timestamp = f64::from(i) * interval;
            if timestamp >= duration {
                break;
            }
            let image = self.sampler.rgba_at(timestamp).await?;
            frames.push(Frame::new(i + 1, timestamp, image));
        }
        Ok(frames)
    }
}
