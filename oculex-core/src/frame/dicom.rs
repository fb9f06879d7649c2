//! DICOM set extraction: decode, order, and render a folder of files.

use std::fmt;
use std::sync::Arc;

use oculex_model::submission::DicomFileMeta;
use thiserror::Error;
use tracing::warn;

use super::raster::RasterFrame;
use super::window::{WindowBounds, render_mono};
use super::{Frame, FrameError, FrameExtractor};
use async_trait::async_trait;

/// File-level decode failures. These skip the file; they never abort the
/// batch.
#[derive(Debug, Error)]
pub enum DicomParseError {
    #[error("not a DICOM file: {0}")]
    NotDicom(String),
    #[error("missing required tag: {0}")]
    MissingTag(&'static str),
    #[error("unsupported encoding: {0}")]
    Unsupported(String),
}

/// Pixel data extracted from one file, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum DicomPixelSet {
    /// Single-sample data as raw values; `inverted` marks MONOCHROME1.
    Mono {
        rows: u32,
        cols: u32,
        samples: Vec<i32>,
        inverted: bool,
    },
    /// Channel-interleaved multi-sample data (RGB or RGBA).
    Multi {
        rows: u32,
        cols: u32,
        channels: u8,
        samples: Vec<u8>,
    },
}

/// One parsed file: header fields plus pixel data when it decoded.
///
/// `pixels: None` means the file parsed but its pixel data did not; the
/// extractor substitutes the placeholder raster so the file still occupies
/// its slot in the ordered sequence.
#[derive(Debug, Clone)]
pub struct DecodedDicom {
    pub meta: DicomFileMeta,
    pub pixels: Option<DicomPixelSet>,
}

/// Parses raw file bytes into header fields and pixel data.
///
/// Synchronous on purpose: decoding is CPU-bound and the extractor runs the
/// whole set on a blocking thread.
pub trait DicomDecoder: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<DecodedDicom, DicomParseError>;
}

/// A named input file as selected by the user.
#[derive(Debug, Clone)]
pub struct DicomInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Extracts one frame per parseable file, ordered by instance number.
///
/// Files are kept in encounter order when instance number ties or is
/// missing (missing sorts as 0). Frame numbers are assigned after sorting,
/// so the displayed sequence matches acquisition order even when the user
/// selected files out of order.
pub struct DicomSetExtractor {
    decoder: Arc<dyn DicomDecoder>,
    files: Arc<Vec<DicomInput>>,
}

impl DicomSetExtractor {
    pub fn new(decoder: Arc<dyn DicomDecoder>, files: Vec<DicomInput>) -> Self {
        Self {
            decoder,
            files: Arc::new(files),
        }
    }
}

impl fmt::Debug for DicomSetExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DicomSetExtractor")
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FrameExtractor for DicomSetExtractor {
    async fn extract(&self) -> Result<Vec<Frame>, FrameError> {
        let decoder = Arc::clone(&self.decoder);
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || extract_set(decoder.as_ref(), &files))
            .await
            .map_err(|e| FrameError::Task(e.to_string()))
    }
}

fn extract_set(decoder: &dyn DicomDecoder, files: &[DicomInput]) -> Vec<Frame> {
    let mut decoded = Vec::with_capacity(files.len());
    for input in files {
        match decoder.parse(&input.bytes) {
            Ok(d) => decoded.push((input.name.clone(), d)),
            Err(err) => {
                warn!(file = %input.name, error = %err, "skipping unreadable DICOM file");
            }
        }
    }

    // Stable sort keeps encounter order for equal or missing instance numbers.
    decoded.sort_by_key(|(_, d)| d.meta.instance_number.unwrap_or(0));

    decoded
        .into_iter()
        .enumerate()
        .map(|(i, (name, d))| {
            let image = match d.pixels.as_ref().and_then(render_pixels) {
                Some(image) => image,
                None => {
                    warn!(file = %name, "pixel data undecodable, substituting placeholder");
                    RasterFrame::placeholder()
                }
            };
            let mut frame = Frame::new(i as u32 + 1, i as f64, image);
            frame.source_name = Some(name);
            frame.dicom = Some(d.meta);
            frame
        })
        .collect()
}

/// Renders one pixel set to RGBA, or `None` when the layout is unusable.
fn render_pixels(pixels: &DicomPixelSet) -> Option<RasterFrame> {
    match pixels {
        DicomPixelSet::Mono {
            rows,
            cols,
            samples,
            inverted,
        } => {
            if samples.len() != (*rows as usize) * (*cols as usize) {
                return None;
            }
            let bounds = WindowBounds::from_samples(samples);
            let gray = render_mono(samples, bounds, *inverted);
            RasterFrame::from_gray(*cols, *rows, &gray).ok()
        }
        DicomPixelSet::Multi {
            rows,
            cols,
            channels,
            samples,
        } => {
            let pixel_count = (*rows as usize) * (*cols as usize);
            if samples.len() != pixel_count * (*channels as usize) {
                return None;
            }
            let mut rgba = Vec::with_capacity(pixel_count * 4);
            match channels {
                3 => {
                    for px in samples.chunks_exact(3) {
                        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                    }
                }
                // Alpha is forced opaque; viewers render these frames on
                // arbitrary backgrounds.
                4 => {
                    for px in samples.chunks_exact(4) {
                        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                    }
                }
                _ => return None,
            }
            RasterFrame::new(*cols, *rows, rgba).ok()
        }
    }
}
