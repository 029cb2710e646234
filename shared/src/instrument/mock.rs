//! In-memory instrument collaborators for tests and offline runs

use super::{
    Action, Actuator, Detection, Flag, FrameSource, InstrumentError, InstrumentLocator,
    InstrumentResult, Region, Telemetry, TelemetrySnapshot,
};
use image::RgbImage;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serves pre-rendered frames per region.
///
/// A region with a single frame repeats it forever; a region with several
/// frames serves them in order and errors once they run out.
pub struct MockFrameSource {
    frames: Mutex<HashMap<Region, (Vec<RgbImage>, usize)>>,
}

impl MockFrameSource {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_frames(self, region: Region, frames: Vec<RgbImage>) -> Self {
        lock(&self.frames).insert(region, (frames, 0));
        self
    }

    pub fn with_repeating(self, region: Region, frame: RgbImage) -> Self {
        self.with_frames(region, vec![frame])
    }

    /// Number of captures served so far for `region`
    pub fn captures(&self, region: Region) -> usize {
        lock(&self.frames)
            .get(&region)
            .map(|(_, served)| *served)
            .unwrap_or(0)
    }
}

impl Default for MockFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for MockFrameSource {
    fn capture(&self, region: Region) -> InstrumentResult<RgbImage> {
        let mut frames = lock(&self.frames);
        let (list, served) = frames.get_mut(&region).ok_or(InstrumentError::Capture {
            region,
            reason: "no frames configured".to_string(),
        })?;

        let frame = if list.len() == 1 {
            list[0].clone()
        } else {
            list.get(*served).cloned().ok_or(InstrumentError::Capture {
                region,
                reason: "no more frames".to_string(),
            })?
        };
        *served += 1;
        Ok(frame)
    }
}

/// Records every actuation instead of pressing anything
#[derive(Default)]
pub struct RecordingActuator {
    log: Mutex<Vec<(Action, Duration)>>,
    unbound: HashSet<Action>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `action` as having no key binding
    pub fn without_binding(mut self, action: Action) -> Self {
        self.unbound.insert(action);
        self
    }

    /// All actuations issued so far, in order
    pub fn actions(&self) -> Vec<(Action, Duration)> {
        lock(&self.log).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.log).len()
    }

    pub fn clear(&self) {
        lock(&self.log).clear();
    }
}

impl Actuator for RecordingActuator {
    fn actuate(&self, action: Action, hold: Duration) -> InstrumentResult<()> {
        if self.unbound.contains(&action) {
            return Err(InstrumentError::UnmappedAction(action.name().to_string()));
        }
        lock(&self.log).push((action, hold));
        Ok(())
    }
}

/// Telemetry whose flags are set directly by the test
#[derive(Default)]
pub struct MockTelemetry {
    state: Mutex<TelemetrySnapshot>,
    reads: Mutex<usize>,
}

impl MockTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(self, flag: Flag, value: bool) -> Self {
        self.set_flag(flag, value);
        self
    }

    pub fn set_flag(&self, flag: Flag, value: bool) {
        lock(&self.state).set_flag(flag, value);
    }

    pub fn set_fuel_percent(&self, fuel_percent: f64) {
        lock(&self.state).fuel_percent = fuel_percent;
    }

    pub fn reads(&self) -> usize {
        *lock(&self.reads)
    }
}

impl Telemetry for MockTelemetry {
    fn snapshot(&self) -> InstrumentResult<TelemetrySnapshot> {
        *lock(&self.reads) += 1;
        Ok(lock(&self.state).clone())
    }
}

/// Locator that always reports the same detection
pub struct FixedLocator {
    detection: Option<Detection>,
}

impl FixedLocator {
    pub fn new(detection: Option<Detection>) -> Self {
        Self { detection }
    }

    /// Report the whole frame as the widget
    pub fn whole_frame() -> WholeFrameLocator {
        WholeFrameLocator
    }
}

impl InstrumentLocator for FixedLocator {
    fn locate(&self, _frame: &RgbImage) -> Option<Detection> {
        self.detection
    }
}

/// Locator that treats the entire captured frame as the widget
pub struct WholeFrameLocator;

impl InstrumentLocator for WholeFrameLocator {
    fn locate(&self, frame: &RgbImage) -> Option<Detection> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        Some(Detection {
            region: crate::image_proc::detection::AABB::from_coords(
                0,
                0,
                height as usize - 1,
                width as usize - 1,
            ),
            confidence: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::detection::AABB;

    #[test]
    fn test_frame_source_sequence_then_error() {
        let source = MockFrameSource::new().with_frames(
            Region::Compass,
            vec![RgbImage::new(2, 2), RgbImage::new(3, 3)],
        );

        assert_eq!(source.capture(Region::Compass).unwrap().width(), 2);
        assert_eq!(source.capture(Region::Compass).unwrap().width(), 3);
        assert!(source.capture(Region::Compass).is_err());
        assert!(source.capture(Region::Target).is_err());
        assert_eq!(source.captures(Region::Compass), 2);
    }

    #[test]
    fn test_repeating_frame() {
        let source = MockFrameSource::new().with_repeating(Region::Target, RgbImage::new(4, 4));
        for _ in 0..5 {
            assert!(source.capture(Region::Target).is_ok());
        }
    }

    #[test]
    fn test_recording_actuator() {
        let actuator = RecordingActuator::new().without_binding(Action::Boost);
        actuator
            .actuate(Action::PitchUp, Duration::from_millis(250))
            .unwrap();
        actuator
            .actuate_named("YawLeftButton", Duration::from_millis(100))
            .unwrap();

        assert!(matches!(
            actuator.actuate(Action::Boost, Duration::ZERO),
            Err(InstrumentError::UnmappedAction(_))
        ));
        assert!(actuator.actuate_named("Warp", Duration::ZERO).is_err());

        assert_eq!(
            actuator.actions(),
            vec![
                (Action::PitchUp, Duration::from_millis(250)),
                (Action::YawLeft, Duration::from_millis(100)),
            ]
        );
    }

    #[test]
    fn test_mock_telemetry() {
        let telemetry = MockTelemetry::new().with_flag(Flag::Supercruise, true);
        assert!(telemetry.read_flag(Flag::Supercruise).unwrap());
        telemetry.set_fuel_percent(12.5);
        assert_eq!(telemetry.snapshot().unwrap().fuel_percent, 12.5);
        assert_eq!(telemetry.reads(), 2);
    }

    #[test]
    fn test_locators() {
        let frame = RgbImage::new(10, 6);
        let whole = FixedLocator::whole_frame().locate(&frame).unwrap();
        assert_eq!(whole.region, AABB::from_coords(0, 0, 5, 9));

        assert!(FixedLocator::new(None).locate(&frame).is_none());
        assert!(FixedLocator::whole_frame()
            .locate(&RgbImage::new(0, 0))
            .is_none());
        assert!(FixedLocator::whole_frame()
            .locate(&RgbImage::new(4, 0))
            .is_none());
    }
}
