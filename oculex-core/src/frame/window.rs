//! Window/level mapping from raw DICOM sample values to display bytes.

/// A display window over raw sample values.
///
/// `apply` maps `center - width/2` to 0 and `center + width/2` to 255
/// linearly, clamping outside the window. A zero (or sub-unit) width is
/// clamped to 1 so constant buffers land mid-gray instead of dividing by
/// zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowBounds {
    pub center: f32,
    pub width: f32,
}

impl WindowBounds {
    /// Auto-window: center and width from the observed min/max.
    pub fn from_samples(samples: &[i32]) -> Self {
        let mut min = i32::MAX;
        let mut max = i32::MIN;
        for &s in samples {
            min = min.min(s);
            max = max.max(s);
        }
        if samples.is_empty() {
            return Self {
                center: 0.0,
                width: 0.0,
            };
        }
        Self {
            center: (max as f32 + min as f32) / 2.0,
            width: max as f32 - min as f32,
        }
    }

    /// Maps one sample into 0..=255.
    pub fn apply(&self, sample: i32) -> u8 {
        let width = self.width.max(1.0);
        let low = self.center - width / 2.0;
        let scaled = (sample as f32 - low) / width * 255.0;
        scaled.clamp(0.0, 255.0).round() as u8
    }
}

/// Renders mono samples to luminance bytes, inverting for MONOCHROME1.
pub fn render_mono(samples: &[i32], bounds: WindowBounds, inverted: bool) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| {
            let v = bounds.apply(s);
            if inverted { 255 - v } else { v }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_window_spans_min_to_max() {
        let bounds = WindowBounds::from_samples(&[-100, 0, 300]);
        assert_eq!(bounds.center, 100.0);
        assert_eq!(bounds.width, 400.0);
        assert_eq!(bounds.apply(-100), 0);
        assert_eq!(bounds.apply(300), 255);
    }

    #[test]
    fn values_outside_the_window_clamp() {
        let bounds = WindowBounds {
            center: 50.0,
            width: 100.0,
        };
        assert_eq!(bounds.apply(-500), 0);
        assert_eq!(bounds.apply(5000), 255);
    }

    #[test]
    fn constant_buffer_maps_to_mid_gray() {
        let bounds = WindowBounds::from_samples(&[742, 742, 742]);
        assert_eq!(bounds.width, 0.0);
        // Width clamps to 1, so every sample sits at the window center.
        assert_eq!(bounds.apply(742), 128);
    }

    #[test]
    fn monochrome1_inverts_the_ramp() {
        let samples = [0, 50, 100];
        let bounds = WindowBounds::from_samples(&samples);
        let normal = render_mono(&samples, bounds, false);
        let inverted = render_mono(&samples, bounds, true);
        assert_eq!(normal, vec![0, 128, 255]);
        assert_eq!(inverted, vec![255, 127, 0]);
    }

    #[test]
    fn empty_input_produces_no_output() {
        let bounds = WindowBounds::from_samples(&[]);
        assert!(render_mono(&[], bounds, false).is_empty());
    }
}
