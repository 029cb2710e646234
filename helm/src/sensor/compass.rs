//! Compass reader.
//!
//! The compass widget is a coloured bezel ring with a small dot marking the
//! bearing to the target. The dot is only drawn while the target is in the
//! front hemisphere, so a located widget without a dot is read as BEHIND.

use super::OffsetSensor;
use crate::config::{CenterMode, CompassConfig};
use crate::error::HelmResult;
use crate::offset::AngularOffset;
use image::{imageops, RgbImage};
use log::{debug, trace};
use ndarray::Array2;
use shared::image_proc::circle_fit::{fit_circle, CircleFit};
use shared::image_proc::color::{exclude, in_range};
use shared::image_proc::detection::{find_blobs, Blob, AABB};
use shared::instrument::{FrameSource, InstrumentLocator, Region};
use std::sync::Arc;

/// Ring centre and normalizing radii in crop coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingGeometry {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
}

impl RingGeometry {
    /// Centre of the crop, half extents as radii
    pub fn geometric(width: u32, height: u32) -> Self {
        Self {
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
            rx: width as f64 / 2.0,
            ry: height as f64 / 2.0,
        }
    }
}

/// Reads the compass widget into an [`AngularOffset`]
pub struct CompassReader {
    frames: Arc<dyn FrameSource>,
    locator: Arc<dyn InstrumentLocator>,
    config: CompassConfig,
    bias: (f64, f64),
}

impl CompassReader {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        locator: Arc<dyn InstrumentLocator>,
        config: CompassConfig,
    ) -> Self {
        Self {
            frames,
            locator,
            config,
            bias: (0.0, 0.0),
        }
    }

    /// Start from a bias learned in an earlier session
    pub fn with_bias(mut self, bias: (f64, f64)) -> Self {
        self.bias = bias;
        self
    }

    pub fn config(&self) -> &CompassConfig {
        &self.config
    }

    /// Read a single already-captured frame using the geometric centre.
    ///
    /// Returns `None` when the widget cannot be located.
    pub fn extract(&self, frame: &RgbImage) -> Option<AngularOffset> {
        let region = self.locate(frame)?;
        let crop = crop(frame, &region);
        let (_, marker) = self.segment(&crop);
        let geometry = RingGeometry::geometric(crop.width(), crop.height());
        Some(self.to_offset(marker.as_ref(), &geometry))
    }

    fn locate(&self, frame: &RgbImage) -> Option<AABB> {
        let detection = self.locator.locate(frame)?;
        trace!("Compass located with confidence {:.2}", detection.confidence);
        detection
            .region
            .clipped_to(frame.width() as usize, frame.height() as usize)
    }

    /// Ring mask and the largest plausible front-marker blob
    fn segment(&self, crop: &RgbImage) -> (Array2<bool>, Option<Blob>) {
        let ring = in_range(crop, &self.config.ring_band);
        let marker_mask = exclude(&in_range(crop, &self.config.marker_band), &ring);

        let crop_area = (crop.width() * crop.height()) as f64;
        let max_area = self.config.max_marker_fraction * crop_area;
        // Blobs arrive largest first, so the first plausible one is the largest
        let marker = find_blobs(&marker_mask.view()).into_iter().find(|blob| {
            let area = blob.area as f64;
            area > self.config.min_marker_area && area < max_area
        });
        (ring, marker)
    }

    fn to_offset(&self, marker: Option<&Blob>, geometry: &RingGeometry) -> AngularOffset {
        let Some(marker) = marker else {
            debug!("No front marker on compass, target is behind");
            return AngularOffset::BEHIND;
        };
        let x = (marker.x - geometry.cx) / geometry.rx - self.bias.0;
        let y = -(marker.y - geometry.cy) / geometry.ry - self.bias.1;
        AngularOffset::from_normalized(x, y)
    }

    /// Median of independent ring fits over several captures.
    ///
    /// Falls back to the geometric centre unless enough fits agree.
    fn vote_centre(&self, first: &RgbImage, region: &AABB) -> RingGeometry {
        let geometric = RingGeometry::geometric(first.width(), first.height());
        let expected = geometric.rx.min(geometric.ry);

        let mut fits = Vec::with_capacity(self.config.voting_samples);
        fits.extend(self.accepted_fit(first, &geometric, expected));
        for _ in 1..self.config.voting_samples {
            match self.frames.capture(Region::Compass) {
                Ok(frame) => {
                    let sample = crop(&frame, region);
                    fits.extend(self.accepted_fit(&sample, &geometric, expected));
                }
                Err(e) => debug!("Voting capture failed: {e}"),
            }
        }

        if fits.len() < self.config.voting_min_agreement {
            debug!(
                "Only {} of {} ring fits accepted, using geometric centre",
                fits.len(),
                self.config.voting_samples
            );
            return geometric;
        }

        let cx = median(fits.iter().map(|f| f.cx).collect());
        let cy = median(fits.iter().map(|f| f.cy).collect());
        let radius = median(fits.iter().map(|f| f.radius).collect());
        let agreeing = fits
            .iter()
            .filter(|f| (f.cx - cx).hypot(f.cy - cy) <= self.config.voting_agreement_px)
            .count();

        if agreeing < self.config.voting_min_agreement {
            debug!("Ring fits disagree ({agreeing} agree), using geometric centre");
            return geometric;
        }
        trace!("Voted ring centre ({cx:.2}, {cy:.2}) r={radius:.2} from {agreeing} fits");
        RingGeometry {
            cx,
            cy,
            rx: radius,
            ry: radius,
        }
    }

    fn accepted_fit(
        &self,
        crop: &RgbImage,
        geometric: &RingGeometry,
        expected: f64,
    ) -> Option<CircleFit> {
        let ring = in_range(crop, &self.config.ring_band);
        let points: Vec<(f64, f64)> = ring
            .indexed_iter()
            .filter(|(_, &set)| set)
            .map(|((row, col), _)| (col as f64, row as f64))
            .collect();
        let fit = fit_circle(&points)?;

        let radius_error = (fit.radius - expected).abs() / expected;
        let centre_error = (fit.cx - geometric.cx).hypot(fit.cy - geometric.cy);
        if radius_error <= self.config.voting_radius_tolerance
            && centre_error <= self.config.voting_center_tolerance * expected
        {
            Some(fit)
        } else {
            trace!(
                "Rejected ring fit r={:.1} (expected {expected:.1}), centre off by {centre_error:.1}",
                fit.radius
            );
            None
        }
    }
}

impl OffsetSensor for CompassReader {
    fn read(&mut self) -> HelmResult<Option<AngularOffset>> {
        let frame = self.frames.capture(Region::Compass)?;
        let Some(region) = self.locate(&frame) else {
            debug!("Compass not located");
            return Ok(None);
        };
        let crop = crop(&frame, &region);
        let (_, marker) = self.segment(&crop);

        // The hemisphere decision never depends on the centre estimate
        if marker.is_none() {
            debug!("No front marker on compass, target is behind");
            return Ok(Some(AngularOffset::BEHIND));
        }

        let geometry = match self.config.center_mode {
            CenterMode::Geometric => RingGeometry::geometric(crop.width(), crop.height()),
            CenterMode::Voting => self.vote_centre(&crop, &region),
        };
        Ok(Some(self.to_offset(marker.as_ref(), &geometry)))
    }

    fn adjust_bias(&mut self, dx: f64, dy: f64) {
        self.bias.0 += dx;
        self.bias.1 += dy;
        debug!(
            "Compass bias now ({:.4}, {:.4})",
            self.bias.0, self.bias.1
        );
    }

    fn bias(&self) -> (f64, f64) {
        self.bias
    }
}

fn crop(frame: &RgbImage, region: &AABB) -> RgbImage {
    imageops::crop_imm(
        frame,
        region.min_col as u32,
        region.min_row as u32,
        region.width() as u32,
        region.height() as u32,
    )
    .to_image()
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(Vec::new()), 0.0);
    }

    #[test]
    fn test_geometric_centre() {
        let g = RingGeometry::geometric(41, 41);
        assert_relative_eq!(g.cx, 20.0);
        assert_relative_eq!(g.cy, 20.0);
        assert_relative_eq!(g.rx, 20.5);
    }
}
