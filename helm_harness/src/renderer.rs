//! Synthetic instrument imagery
//!
//! Draws the two widgets the alignment loop reads: the compass panel (bezel
//! ring plus a front marker shown only while the target is ahead) and the
//! viewport centre with the target reticle. Geometry mirrors what the readers
//! expect, so a perfect reading of a rendered frame recovers the bearing up
//! to pixel quantization.

use helm::config::ReticleConfig;
use image::{Rgb, RgbImage};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Bezel colour
pub const RING_COLOR: Rgb<u8> = Rgb([255, 140, 0]);
/// Front-marker colour
pub const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
/// Reticle colour
pub const RETICLE_COLOR: Rgb<u8> = Rgb([200, 255, 0]);

/// Layout of the rendered widgets
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Compass panel size in pixels
    pub panel_size: (u32, u32),
    /// Ring centre within the panel
    pub ring_centre: (f64, f64),
    pub ring_radius: f64,
    pub ring_thickness: f64,
    pub marker_radius: f64,
    /// Size of the captured viewport-centre region
    pub target_size: (u32, u32),
    pub reticle_radius: f64,
    pub reticle_thickness: f64,
    /// Maximum background clutter level per channel
    pub clutter: u8,
    pub seed: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            panel_size: (160, 120),
            ring_centre: (80.0, 60.0),
            ring_radius: 44.0,
            ring_thickness: 3.0,
            marker_radius: 3.0,
            target_size: (320, 240),
            reticle_radius: 10.0,
            reticle_thickness: 2.0,
            clutter: 30,
            seed: 7,
        }
    }
}

/// Renders instrument frames from a body-frame target direction
#[derive(Debug, Clone)]
pub struct InstrumentRenderer {
    config: RendererConfig,
    reticle: ReticleConfig,
}

impl InstrumentRenderer {
    /// `reticle` supplies the capture rectangle and field of view
    pub fn new(config: RendererConfig, reticle: ReticleConfig) -> Self {
        Self { config, reticle }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Compass panel; `target` must be a unit vector (x right, y up, z forward)
    pub fn render_compass(&self, target: &Vector3<f64>, frame: u64) -> RgbImage {
        let cfg = &self.config;
        let mut image = self.background(cfg.panel_size, frame);
        let (cx, cy) = cfg.ring_centre;

        draw_ring(&mut image, cx, cy, cfg.ring_radius, cfg.ring_thickness, RING_COLOR);
        if target.z > 0.0 {
            let mx = cx + target.x * cfg.ring_radius;
            let my = cy - target.y * cfg.ring_radius;
            draw_disc(&mut image, mx, my, cfg.marker_radius, MARKER_COLOR);
        }
        image
    }

    /// Compass panel with the widget missing
    pub fn render_empty_panel(&self, frame: u64) -> RgbImage {
        self.background(self.config.panel_size, frame)
    }

    /// Viewport-centre capture; the reticle is drawn while it falls inside
    pub fn render_target(&self, target: &Vector3<f64>, frame: u64) -> RgbImage {
        let cfg = &self.config;
        let mut image = self.background(cfg.target_size, frame);
        if target.z <= 0.0 {
            return image;
        }

        let pitch = target.y.atan2(target.z).to_degrees();
        let yaw = target.x.atan2(target.z).to_degrees();
        let rect = &self.reticle.capture_rect;
        let (w, h) = (cfg.target_size.0 as f64, cfg.target_size.1 as f64);

        let x_frac = 0.5 + yaw / self.reticle.horizontal_fov_deg;
        let y_frac = 0.5 - pitch / self.reticle.vertical_fov_deg;
        let px = (x_frac - rect.left) / rect.width() * w - 0.5;
        let py = (y_frac - rect.top) / rect.height() * h - 0.5;

        let margin = cfg.reticle_radius;
        if px >= margin && px <= w - 1.0 - margin && py >= margin && py <= h - 1.0 - margin {
            draw_ring(
                &mut image,
                px,
                py,
                cfg.reticle_radius,
                cfg.reticle_thickness,
                RETICLE_COLOR,
            );
        }
        image
    }

    fn background(&self, (width, height): (u32, u32), frame: u64) -> RgbImage {
        let mut image = RgbImage::new(width, height);
        if self.config.clutter > 0 {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed ^ frame);
            for pixel in image.pixels_mut() {
                *pixel = Rgb([
                    rng.gen_range(0..self.config.clutter),
                    rng.gen_range(0..self.config.clutter),
                    rng.gen_range(0..self.config.clutter),
                ]);
            }
        }
        image
    }
}

fn draw_ring(image: &mut RgbImage, cx: f64, cy: f64, radius: f64, thickness: f64, color: Rgb<u8>) {
    let half = thickness / 2.0;
    for_each_near(image, cx, cy, radius + half, |image, x, y, d| {
        if (d - radius).abs() <= half {
            image.put_pixel(x, y, color);
        }
    });
}

fn draw_disc(image: &mut RgbImage, cx: f64, cy: f64, radius: f64, color: Rgb<u8>) {
    for_each_near(image, cx, cy, radius, |image, x, y, d| {
        if d <= radius {
            image.put_pixel(x, y, color);
        }
    });
}

/// Visit pixels in the bounding box of a circle with their centre distance
fn for_each_near(
    image: &mut RgbImage,
    cx: f64,
    cy: f64,
    reach: f64,
    mut visit: impl FnMut(&mut RgbImage, u32, u32, f64),
) {
    let (width, height) = image.dimensions();
    let x0 = (cx - reach).floor().max(0.0) as u32;
    let y0 = (cy - reach).floor().max(0.0) as u32;
    let x1 = ((cx + reach).ceil().max(0.0) as u32).min(width.saturating_sub(1));
    let y1 = ((cy + reach).ceil().max(0.0) as u32).min(height.saturating_sub(1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = (x as f64 - cx).hypot(y as f64 - cy);
            visit(image, x, y, d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm::sensor::ReticleReader;
    use shared::image_proc::color::{count_set, in_range, HsvRange};

    fn renderer() -> InstrumentRenderer {
        InstrumentRenderer::new(RendererConfig::default(), ReticleConfig::default())
    }

    #[test]
    fn test_marker_only_when_ahead() {
        let marker_band = HsvRange::new((75, 40, 170), (105, 255, 255));
        let r = renderer();

        let ahead = r.render_compass(&Vector3::new(0.3, 0.2, 0.93).normalize(), 0);
        assert!(count_set(&in_range(&ahead, &marker_band)) > 10);

        let behind = r.render_compass(&Vector3::new(0.3, 0.2, -0.93).normalize(), 0);
        assert_eq!(count_set(&in_range(&behind, &marker_band)), 0);
    }

    #[test]
    fn test_reticle_reads_back_bearing() {
        let r = renderer();
        let reader = ReticleReader::new(
            std::sync::Arc::new(shared::instrument::mock::MockFrameSource::new()),
            ReticleConfig::default(),
        );
        let (pitch, yaw) = (3.0_f64, -5.0_f64);
        let target = Vector3::new(yaw.to_radians().tan(), pitch.to_radians().tan(), 1.0).normalize();

        let reading = reader.extract(&r.render_target(&target, 0)).unwrap();
        assert!((reading.pitch - pitch).abs() < 0.3, "pitch {}", reading.pitch);
        assert!((reading.yaw - yaw).abs() < 0.3, "yaw {}", reading.yaw);
    }

    #[test]
    fn test_reticle_hidden_outside_capture() {
        let r = renderer();
        let reader = ReticleReader::new(
            std::sync::Arc::new(shared::instrument::mock::MockFrameSource::new()),
            ReticleConfig::default(),
        );
        let target = Vector3::new(40.0_f64.to_radians().tan(), 0.0, 1.0).normalize();
        assert!(reader.extract(&r.render_target(&target, 0)).is_none());
    }
}
