//! Scripted sensors and a linear plant for testing the control loop without imagery

use crate::error::HelmResult;
use crate::offset::{AngularOffset, TargetOffset};
use crate::sensor::{OffsetSensor, TargetSensor};
use shared::calibration::Axis;
use shared::instrument::{Action, Actuator, InstrumentResult};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replays a fixed list of readings, repeating the last one forever
pub struct ScriptedSensor {
    readings: Vec<Option<AngularOffset>>,
    index: usize,
    reads: Arc<Mutex<usize>>,
    bias: (f64, f64),
}

impl ScriptedSensor {
    pub fn new(readings: Vec<Option<AngularOffset>>) -> Self {
        Self {
            readings,
            index: 0,
            reads: Arc::new(Mutex::new(0)),
            bias: (0.0, 0.0),
        }
    }

    /// Always report the same reading
    pub fn constant(reading: Option<AngularOffset>) -> Self {
        Self::new(vec![reading])
    }

    /// Shared read counter, readable after the sensor has been boxed away
    pub fn read_counter(&self) -> Arc<Mutex<usize>> {
        self.reads.clone()
    }
}

impl OffsetSensor for ScriptedSensor {
    fn read(&mut self) -> HelmResult<Option<AngularOffset>> {
        *lock(&self.reads) += 1;
        let reading = match self.readings.get(self.index) {
            Some(reading) => *reading,
            None => self.readings.last().copied().flatten(),
        };
        self.index += 1;
        Ok(reading)
    }

    fn adjust_bias(&mut self, dx: f64, dy: f64) {
        self.bias.0 += dx;
        self.bias.1 += dy;
    }

    fn bias(&self) -> (f64, f64) {
        self.bias
    }
}

/// Replays reticle readings, repeating the last one forever
pub struct ScriptedTarget {
    readings: Vec<Option<TargetOffset>>,
    index: usize,
}

impl ScriptedTarget {
    pub fn new(readings: Vec<Option<TargetOffset>>) -> Self {
        Self { readings, index: 0 }
    }
}

impl TargetSensor for ScriptedTarget {
    fn read_target(&mut self) -> HelmResult<Option<TargetOffset>> {
        let reading = match self.readings.get(self.index) {
            Some(reading) => *reading,
            None => self.readings.last().copied().flatten(),
        };
        self.index += 1;
        Ok(reading)
    }
}

#[derive(Debug)]
struct PlantState {
    pitch: f64,
    yaw: f64,
    roll: f64,
    rates: [f64; 3],
    misses: usize,
    actions: Vec<(Action, Duration)>,
    bias: (f64, f64),
}

/// Idealized vessel: every pulse moves one axis by `rate × hold`.
///
/// Clones share state, so one clone can be boxed as the sensor while another
/// is handed out as the actuator. Axes are independent and readings beyond
/// 90° of pitch or yaw come back as BEHIND.
#[derive(Debug, Clone)]
pub struct LinearPlant {
    state: Arc<Mutex<PlantState>>,
}

impl LinearPlant {
    /// Plant at the given reading with one true rate for every axis
    pub fn new(pitch: f64, yaw: f64, roll: f64, rate: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState {
                pitch,
                yaw,
                roll,
                rates: [rate; 3],
                misses: 0,
                actions: Vec::new(),
                bias: (0.0, 0.0),
            })),
        }
    }

    pub fn with_rate(self, axis: Axis, rate: f64) -> Self {
        lock(&self.state).rates[axis_index(axis)] = rate;
        self
    }

    /// Report the instrument as missing for the next `count` reads
    pub fn miss_next(&self, count: usize) {
        lock(&self.state).misses = count;
    }

    /// True offsets (pitch, yaw, roll)
    pub fn truth(&self) -> (f64, f64, f64) {
        let state = lock(&self.state);
        (state.pitch, state.yaw, state.roll)
    }

    pub fn actions(&self) -> Vec<(Action, Duration)> {
        lock(&self.state).actions.clone()
    }
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::Pitch => 0,
        Axis::Yaw => 1,
        Axis::Roll => 2,
    }
}

fn wrap_degrees(value: f64) -> f64 {
    let wrapped = (value + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

impl OffsetSensor for LinearPlant {
    fn read(&mut self) -> HelmResult<Option<AngularOffset>> {
        let mut state = lock(&self.state);
        if state.misses > 0 {
            state.misses -= 1;
            return Ok(None);
        }
        if state.pitch.abs() > 90.0 || state.yaw.abs() > 90.0 {
            return Ok(Some(AngularOffset::BEHIND));
        }
        let mut offset = AngularOffset::from_angles(state.pitch, state.yaw).with_roll(state.roll);
        offset.raw_x -= state.bias.0;
        offset.raw_y -= state.bias.1;
        Ok(Some(offset))
    }

    fn adjust_bias(&mut self, dx: f64, dy: f64) {
        let mut state = lock(&self.state);
        state.bias.0 += dx;
        state.bias.1 += dy;
    }

    fn bias(&self) -> (f64, f64) {
        lock(&self.state).bias
    }
}

impl Actuator for LinearPlant {
    fn actuate(&self, action: Action, hold: Duration) -> InstrumentResult<()> {
        let mut state = lock(&self.state);
        state.actions.push((action, hold));
        let secs = hold.as_secs_f64();
        match action {
            Action::PitchUp => state.pitch -= state.rates[0] * secs,
            Action::PitchDown => state.pitch += state.rates[0] * secs,
            Action::YawRight => state.yaw -= state.rates[1] * secs,
            Action::YawLeft => state.yaw += state.rates[1] * secs,
            Action::RollRight => state.roll = wrap_degrees(state.roll - state.rates[2] * secs),
            Action::RollLeft => state.roll = wrap_degrees(state.roll + state.rates[2] * secs),
            _ => {}
        }
        Ok(())
    }
}
