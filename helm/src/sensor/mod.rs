//! Offset extraction: turning captured instrument frames into angles.
//!
//! Two readers exist. [`CompassReader`] works anywhere on the sphere and
//! reports the BEHIND sentinel when the front marker is absent.
//! [`ReticleReader`] only sees the target once it is inside the viewport and
//! gives a much finer reading there.

pub mod compass;
pub mod reticle;

pub use compass::CompassReader;
pub use reticle::ReticleReader;

use crate::error::HelmResult;
use crate::offset::{AngularOffset, TargetOffset};

/// Source of compass-style readings.
///
/// `Ok(None)` means the instrument itself could not be located this read;
/// that is a transient miss, distinct from the BEHIND sentinel.
pub trait OffsetSensor: Send {
    fn read(&mut self) -> HelmResult<Option<AngularOffset>>;

    /// Accumulate a small normalized bias subtracted from future readings
    fn adjust_bias(&mut self, _dx: f64, _dy: f64) {}

    /// Current accumulated bias
    fn bias(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Source of reticle readings, `Ok(None)` when no reticle is visible
pub trait TargetSensor: Send {
    fn read_target(&mut self) -> HelmResult<Option<TargetOffset>>;
}

impl<T: OffsetSensor + ?Sized> OffsetSensor for Box<T> {
    fn read(&mut self) -> HelmResult<Option<AngularOffset>> {
        (**self).read()
    }

    fn adjust_bias(&mut self, dx: f64, dy: f64) {
        (**self).adjust_bias(dx, dy)
    }

    fn bias(&self) -> (f64, f64) {
        (**self).bias()
    }
}

impl<T: TargetSensor + ?Sized> TargetSensor for Box<T> {
    fn read_target(&mut self) -> HelmResult<Option<TargetOffset>> {
        (**self).read_target()
    }
}
