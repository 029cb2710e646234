//! Angular offsets and the compass projection.
//!
//! The compass is an orthographic projection of the sphere around the
//! vessel: the marker sits at the projection of the target direction onto
//! the view plane. Converting the normalized marker position back to angles
//! therefore uses arcsines, which keeps readings near the rim from being
//! compressed.
//!
//! Sign conventions: `pitch > 0` means the target is above boresight,
//! `yaw > 0` means it is to the right, and `roll` is the clock angle of the
//! marker, 0 at twelve o'clock, increasing clockwise, ±180 at six o'clock.

use serde::{Deserialize, Serialize};
use shared::calibration::Axis;
use shared::instrument::Action;

/// Guards the projection against division by zero at the rim
const MIN_CHORD: f64 = 0.001;

/// Which half of the sphere the target is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    Front,
    Behind,
}

/// One compass reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularOffset {
    /// Degrees above boresight
    pub pitch: f64,
    /// Degrees right of boresight
    pub yaw: f64,
    /// Clock angle of the marker in degrees
    pub roll: f64,
    pub hemisphere: Hemisphere,
    /// Normalized horizontal marker displacement in [-1, 1]
    pub raw_x: f64,
    /// Normalized vertical marker displacement in [-1, 1], up positive
    pub raw_y: f64,
}

impl AngularOffset {
    /// Sentinel reading for "no front marker"; only `hemisphere` is meaningful
    pub const BEHIND: AngularOffset = AngularOffset {
        pitch: 180.0,
        yaw: 0.0,
        roll: 180.0,
        hemisphere: Hemisphere::Behind,
        raw_x: 0.0,
        raw_y: 0.0,
    };

    /// Build a front-hemisphere reading from a normalized marker position.
    ///
    /// Inputs are clamped to [-1, 1].
    pub fn from_normalized(x: f64, y: f64) -> Self {
        let x = clamp_unit(x);
        let y = clamp_unit(y);
        let (pitch, yaw) = project(x, y);
        Self {
            pitch,
            yaw,
            roll: clock_angle(x, y),
            hemisphere: Hemisphere::Front,
            raw_x: x,
            raw_y: y,
        }
    }

    /// Build a front-hemisphere reading from pitch and yaw angles.
    ///
    /// Inverse of the projection; used by scripted sensors and the simulator.
    pub fn from_angles(pitch: f64, yaw: f64) -> Self {
        let (x, y) = unproject(pitch, yaw);
        Self {
            pitch: pitch.clamp(-90.0, 90.0),
            yaw: yaw.clamp(-90.0, 90.0),
            roll: clock_angle(x, y),
            hemisphere: Hemisphere::Front,
            raw_x: x,
            raw_y: y,
        }
    }

    /// Override the roll reading, keeping everything else
    pub fn with_roll(mut self, roll: f64) -> Self {
        self.roll = roll;
        self
    }

    pub fn is_behind(&self) -> bool {
        self.hemisphere == Hemisphere::Behind
    }

    /// Signed reading on one axis
    pub fn value(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Pitch => self.pitch,
            Axis::Yaw => self.yaw,
            Axis::Roll => self.roll,
        }
    }

    /// Unsigned angular distance still to travel on one axis.
    ///
    /// Roll is measured to the nearer vertical centerline (0 or ±180);
    /// either centerline puts the target in the pitch plane.
    pub fn distance(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Roll => {
                let r = self.roll.abs();
                r.min(180.0 - r).max(0.0)
            }
            _ => self.value(axis).abs(),
        }
    }

    /// True when `axis` is inside `tolerance`
    pub fn within(&self, axis: Axis, tolerance: f64) -> bool {
        self.distance(axis) < tolerance
    }

    /// Larger of the pitch and yaw magnitudes
    pub fn max_pitch_yaw(&self) -> f64 {
        self.pitch.abs().max(self.yaw.abs())
    }

    /// Axis with the larger magnitude between pitch and yaw (pitch on ties)
    pub fn dominant_axis(&self) -> Axis {
        if self.pitch.abs() >= self.yaw.abs() {
            Axis::Pitch
        } else {
            Axis::Yaw
        }
    }
}

/// Reticle reading; only exists when the target is in the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetOffset {
    /// Degrees above screen centre
    pub pitch: f64,
    /// Degrees right of screen centre
    pub yaw: f64,
    /// Clock angle of the reticle around screen centre
    pub roll: f64,
}

impl TargetOffset {
    pub fn new(pitch: f64, yaw: f64) -> Self {
        Self {
            pitch,
            yaw,
            roll: clock_angle(yaw, pitch),
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Normalized marker position to (pitch, yaw) in degrees
pub fn project(x: f64, y: f64) -> (f64, f64) {
    let lat_chord = (1.0 - x * x).max(0.0).sqrt().max(MIN_CHORD);
    let lng_chord = (1.0 - y * y).max(0.0).sqrt().max(MIN_CHORD);
    let pitch = clamp_unit(y / lat_chord).asin().to_degrees();
    let yaw = clamp_unit(x / lng_chord).asin().to_degrees();
    (pitch, yaw)
}

/// (pitch, yaw) in degrees to the normalized marker position
pub fn unproject(pitch: f64, yaw: f64) -> (f64, f64) {
    // Direction d = (x, y, z) with y / sqrt(y² + z²) = sin(pitch) and
    // x / sqrt(x² + z²) = sin(yaw); solve with z = 1 and normalize
    let tp = pitch.clamp(-89.999, 89.999).to_radians().tan();
    let ty = yaw.clamp(-89.999, 89.999).to_radians().tan();
    let norm = (1.0 + tp * tp + ty * ty).sqrt();
    (ty / norm, tp / norm)
}

/// Clock angle of a displacement, 0 at the top, clockwise positive
pub fn clock_angle(x: f64, y: f64) -> f64 {
    if x > 0.0 {
        90.0 - (y / x).atan().to_degrees()
    } else if x < 0.0 {
        -90.0 - (y / x).atan().to_degrees()
    } else if y < 0.0 {
        180.0
    } else {
        0.0
    }
}

/// Angle actually turned between two readings on `axis`
pub fn travelled(axis: Axis, before: &AngularOffset, after: &AngularOffset) -> f64 {
    let delta = (before.value(axis) - after.value(axis)).abs();
    match axis {
        Axis::Roll => {
            let wrapped = delta.rem_euclid(360.0);
            wrapped.min(360.0 - wrapped)
        }
        _ => delta,
    }
}

/// Directional command that reduces a reading of `degrees` on `axis`.
///
/// Beyond 90° the shortest path reverses, mirroring the hemispherical wrap
/// of the compass.
pub fn correction_action(axis: Axis, degrees: f64) -> Action {
    let toward_positive = if degrees.abs() <= 90.0 {
        degrees > 0.0
    } else {
        degrees < 0.0
    };
    axis_action(axis, toward_positive)
}

/// Directional command on `axis`; positive is up, right or clockwise
pub fn axis_action(axis: Axis, positive: bool) -> Action {
    match (axis, positive) {
        (Axis::Pitch, true) => Action::PitchUp,
        (Axis::Pitch, false) => Action::PitchDown,
        (Axis::Yaw, true) => Action::YawRight,
        (Axis::Yaw, false) => Action::YawLeft,
        (Axis::Roll, true) => Action::RollRight,
        (Axis::Roll, false) => Action::RollLeft,
    }
}
