//! Common utilities for helm integration tests

#![allow(dead_code)]

use helm::config::HelmConfig;
use image::{Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shared::calibration::{Axis, AxisCalibration, SpeedRegime, VehicleCalibration, VehicleId};

/// Bezel colour, inside the default ring band
pub const RING: Rgb<u8> = Rgb([255, 140, 0]);
/// Front-marker colour, inside the default marker band
pub const MARKER: Rgb<u8> = Rgb([0, 255, 255]);

/// Parameters for a synthetic compass frame
#[derive(Debug, Clone)]
pub struct CompassScene {
    pub size: u32,
    pub ring_centre: (f64, f64),
    pub ring_radius: f64,
    pub ring_thickness: f64,
    /// Marker centre in pixels; `None` draws the ring alone
    pub marker: Option<(f64, f64)>,
    pub marker_radius: f64,
    /// Seed for dim background clutter; `None` leaves the background black
    pub noise_seed: Option<u64>,
}

impl CompassScene {
    /// Ring centred in a `size` square frame, nearly filling it
    pub fn centred(size: u32) -> Self {
        let centre = (size as f64 - 1.0) / 2.0;
        Self {
            size,
            ring_centre: (centre, centre),
            ring_radius: size as f64 / 2.0 - 4.0,
            ring_thickness: 3.0,
            marker: None,
            marker_radius: 3.0,
            noise_seed: Some(42),
        }
    }

    /// Place the marker at normalized `(x, y)` relative to the ring, up positive
    pub fn with_marker(mut self, x: f64, y: f64) -> Self {
        let (cx, cy) = self.ring_centre;
        self.marker = Some((cx + x * self.ring_radius, cy - y * self.ring_radius));
        self
    }

    pub fn render(&self) -> RgbImage {
        let mut image = RgbImage::new(self.size, self.size);
        if let Some(seed) = self.noise_seed {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            // Dim clutter stays far below the value floor of both bands
            for pixel in image.pixels_mut() {
                *pixel = Rgb([
                    rng.gen_range(0..30),
                    rng.gen_range(0..30),
                    rng.gen_range(0..30),
                ]);
            }
        }

        let (cx, cy) = self.ring_centre;
        for y in 0..self.size {
            for x in 0..self.size {
                let (fx, fy) = (x as f64, y as f64);
                let d = (fx - cx).hypot(fy - cy);
                if (d - self.ring_radius).abs() <= self.ring_thickness / 2.0 {
                    image.put_pixel(x, y, RING);
                }
                if let Some((mx, my)) = self.marker {
                    if (fx - mx).hypot(fy - my) <= self.marker_radius {
                        image.put_pixel(x, y, MARKER);
                    }
                }
            }
        }
        image
    }
}

/// Config with every settle and poll shortened for tests
pub fn fast_config() -> HelmConfig {
    let mut config = HelmConfig::default();
    config.correction.settle_secs = 0.0;
    config.correction.retry_secs = 0.0;
    config.orchestrator.flip_settle_secs = 0.0;
    config.orchestrator.condition_poll_secs = 0.005;
    config.reticle.move_settle_secs = 0.0;
    config.reticle.retry_secs = 0.0;
    config.monitor.poll_interval_secs = 0.005;
    config
}

/// Calibration whose flat rates match a plant turning at `rate` on every axis
pub fn calibration_at(rate: f64) -> VehicleCalibration {
    let mut calibration = VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal);
    for axis in [Axis::Pitch, Axis::Yaw, Axis::Roll] {
        let mut cal = AxisCalibration::default_for(axis);
        cal.rate_deg_per_sec = rate;
        cal.max_rate_deg_per_sec = rate * 3.0;
        calibration.set_axis(axis, cal);
    }
    calibration
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
