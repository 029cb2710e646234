//! Classical compass locator.
//!
//! Segments the bezel colour band, takes the largest ring-coloured component
//! and fits a circle to it. The detection is the square circumscribing the
//! fitted circle; confidence drops with the radial residual of the fit.

use super::{Detection, InstrumentLocator};
use crate::image_proc::circle_fit::fit_circle;
use crate::image_proc::color::{in_range, HsvRange};
use crate::image_proc::detection::{find_blobs, AABB};
use image::RgbImage;
use log::debug;

/// Locates a ring-shaped widget by colour
#[derive(Debug, Clone)]
pub struct ColorRingLocator {
    /// Bezel colour band
    pub ring_band: HsvRange,
    /// Smallest accepted component, in pixels
    pub min_area: usize,
    /// Detections below this confidence are discarded
    pub min_confidence: f64,
}

impl Default for ColorRingLocator {
    fn default() -> Self {
        Self {
            ring_band: HsvRange::new((5, 100, 100), (25, 255, 255)),
            min_area: 20,
            min_confidence: 0.5,
        }
    }
}

impl InstrumentLocator for ColorRingLocator {
    fn locate(&self, frame: &RgbImage) -> Option<Detection> {
        let (width, height) = frame.dimensions();
        let mask = in_range(frame, &self.ring_band);
        let blobs = find_blobs(&mask.view());
        let ring = blobs.first().filter(|b| b.area >= self.min_area)?;

        let fit = fit_circle(&ring.pixels)?;
        let confidence = (1.0 - fit.rms_residual / fit.radius.max(1.0) * 4.0).clamp(0.0, 1.0);
        debug!(
            "Ring locator: centre=({:.1},{:.1}) r={:.1} rms={:.2} conf={:.2}",
            fit.cx, fit.cy, fit.radius, fit.rms_residual, confidence
        );
        if confidence < self.min_confidence {
            return None;
        }

        // Pad one pixel past the bezel so its anti-aliased edge stays inside
        let pad = fit.radius + 1.0;
        let min_col = (fit.cx - pad).floor().max(0.0) as usize;
        let min_row = (fit.cy - pad).floor().max(0.0) as usize;
        let max_col = (fit.cx + pad).ceil().max(0.0) as usize;
        let max_row = (fit.cy + pad).ceil().max(0.0) as usize;

        let region = AABB::from_coords(min_row, min_col, max_row, max_col)
            .clipped_to(width as usize, height as usize)?;
        Some(Detection { region, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn draw_ring(image: &mut RgbImage, cx: f64, cy: f64, radius: f64, thickness: f64) {
        let (w, h) = image.dimensions();
        for y in 0..h {
            for x in 0..w {
                let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
                if (d - radius).abs() <= thickness / 2.0 {
                    image.put_pixel(x, y, Rgb([255, 120, 0]));
                }
            }
        }
    }

    #[test]
    fn test_locates_ring() {
        let mut frame = RgbImage::new(120, 80);
        draw_ring(&mut frame, 70.0, 40.0, 20.0, 2.0);

        let detection = ColorRingLocator::default().locate(&frame).unwrap();
        let (cx, cy) = detection.region.center();
        assert!((cx - 70.0).abs() <= 1.5, "cx = {cx}");
        assert!((cy - 40.0).abs() <= 1.5, "cy = {cy}");
        assert!(detection.region.width() >= 40);
        assert!(detection.confidence > 0.8);
    }

    #[test]
    fn test_empty_frame_has_no_detection() {
        let frame = RgbImage::new(64, 64);
        assert!(ColorRingLocator::default().locate(&frame).is_none());
    }
}
