//! In-memory RGBA rasters and their PNG/data-URL encodings.

use std::fmt;
use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::FrameError;

/// An RGBA8 raster with a validated `width * height * 4` buffer.
#[derive(Clone, PartialEq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl RasterFrame {
    /// Wraps an RGBA8 buffer, rejecting dimension/length mismatches.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize) * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(FrameError::RasterShape {
                width,
                height,
                len: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Builds an opaque raster from single-channel luminance values.
    pub fn from_gray(width: u32, height: u32, gray: &[u8]) -> Result<Self, FrameError> {
        let mut rgba = Vec::with_capacity(gray.len() * 4);
        for &v in gray {
            rgba.extend_from_slice(&[v, v, v, 255]);
        }
        Self::new(width, height, rgba)
    }

    /// Fixed 1x1 opaque-black frame substituted for undecodable pixel data.
    pub fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 255],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Encodes the raster as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>, FrameError> {
        let buffer: image::RgbaImage =
            image::ImageBuffer::from_raw(self.width, self.height, self.rgba.clone()).ok_or(
                FrameError::RasterShape {
                    width: self.width,
                    height: self.height,
                    len: self.rgba.len(),
                },
            )?;
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(buffer)
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| FrameError::PngEncode(e.to_string()))?;
        Ok(out.into_inner())
    }

    /// Encodes the raster as a `data:image/png;base64,...` URL, the inline
    /// wire representation of a frame.
    pub fn to_data_url(&self) -> Result<String, FrameError> {
        let png = self.to_png()?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
    }
}

impl fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}
