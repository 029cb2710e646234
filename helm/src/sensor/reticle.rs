//! Target reticle reader.
//!
//! Near the target the game draws a circular reticle in the middle of the
//! viewport. We segment its colour, fit a circle to every arc-sized component
//! and keep the best fit. Contour fill ratios are not used because labels
//! drawn next to the reticle share its colour and skew them.

use super::TargetSensor;
use crate::config::ReticleConfig;
use crate::error::HelmResult;
use crate::offset::TargetOffset;
use image::RgbImage;
use log::{debug, trace};
use shared::image_proc::circle_fit::{fit_circle, CircleFit};
use shared::image_proc::color::in_range;
use shared::image_proc::detection::find_blobs;
use shared::instrument::{FrameSource, Region};
use std::sync::Arc;

pub struct ReticleReader {
    frames: Arc<dyn FrameSource>,
    config: ReticleConfig,
}

impl ReticleReader {
    pub fn new(frames: Arc<dyn FrameSource>, config: ReticleConfig) -> Self {
        Self { frames, config }
    }

    /// Best circle fit to a reticle arc in `frame`, in frame pixels
    pub fn find_reticle(&self, frame: &RgbImage) -> Option<CircleFit> {
        let (width, height) = frame.dimensions();
        let area = (width * height) as f64;
        let min_area = (self.config.min_arc_fraction * area)
            .ceil()
            .max(self.config.min_arc_px as f64) as usize;
        let max_radius = self.config.max_radius_fraction * width.min(height) as f64;

        let mask = in_range(frame, &self.config.band);
        find_blobs(&mask.view())
            .into_iter()
            .filter(|blob| blob.area >= min_area)
            .filter_map(|blob| fit_circle(&blob.pixels))
            .filter(|fit| {
                let ok = fit.radius >= self.config.min_radius_px
                    && fit.radius <= max_radius
                    && fit.rms_residual < self.config.max_rms_fraction * fit.radius;
                if !ok {
                    trace!(
                        "Rejected arc fit r={:.1} rms={:.2} at ({:.1}, {:.1})",
                        fit.radius,
                        fit.rms_residual,
                        fit.cx,
                        fit.cy
                    );
                }
                ok
            })
            .min_by(|a, b| a.rms_residual.total_cmp(&b.rms_residual))
    }

    /// Convert a reticle in `frame` to an angular offset from screen centre
    pub fn extract(&self, frame: &RgbImage) -> Option<TargetOffset> {
        let fit = self.find_reticle(frame)?;
        let (width, height) = frame.dimensions();
        let rect = &self.config.capture_rect;

        // Capture-relative position to viewport fraction, then to [-1, 1]
        let x_frac = rect.left + (fit.cx + 0.5) / width as f64 * rect.width();
        let y_frac = rect.top + (fit.cy + 0.5) / height as f64 * rect.height();
        let x_pct = ((x_frac - 0.5) * 2.0).clamp(-1.0, 1.0);
        let y_pct = (-(y_frac - 0.5) * 2.0).clamp(-1.0, 1.0);

        let yaw = x_pct * self.config.horizontal_fov_deg / 2.0;
        let pitch = y_pct * self.config.vertical_fov_deg / 2.0;
        debug!(
            "Reticle at ({:.1}, {:.1}) r={:.1}: pitch {pitch:.2}, yaw {yaw:.2}",
            fit.cx, fit.cy, fit.radius
        );
        Some(TargetOffset::new(pitch, yaw))
    }
}

impl TargetSensor for ReticleReader {
    fn read_target(&mut self) -> HelmResult<Option<TargetOffset>> {
        let frame = self.frames.capture(Region::Target)?;
        Ok(self.extract(&frame))
    }
}
