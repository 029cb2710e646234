//! Instrument traits backed by the simulated vessel
//!
//! One shared object plays screen capture, input injection and the status
//! file at once, so the alignment loop can be closed without a live client.

use crate::renderer::InstrumentRenderer;
use crate::simulated_vessel::{Bearing, SimulatedVessel};
use image::RgbImage;
use shared::instrument::{
    Action, Actuator, FrameSource, InstrumentResult, Region, Telemetry, TelemetrySnapshot,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Capture, actuation and telemetry for one simulated vessel
pub struct SimInstruments {
    vessel: Mutex<SimulatedVessel>,
    renderer: InstrumentRenderer,
    frame_counter: AtomicU64,
    /// Sleep for the hold time on each pulse, as a real key press would
    realtime: bool,
}

impl SimInstruments {
    pub fn new(vessel: SimulatedVessel, renderer: InstrumentRenderer) -> Self {
        Self {
            vessel: Mutex::new(vessel),
            renderer,
            frame_counter: AtomicU64::new(0),
            realtime: false,
        }
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedVessel> {
        self.vessel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the vessel, e.g. to script flags mid-run
    pub fn with_vessel<R>(&self, f: impl FnOnce(&mut SimulatedVessel) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn bearing(&self) -> Bearing {
        self.lock().bearing()
    }

    pub fn actions(&self) -> Vec<(Action, Duration)> {
        self.lock().actions().to_vec()
    }

    /// Frames rendered so far across both regions
    pub fn frames_rendered(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }
}

impl FrameSource for SimInstruments {
    fn capture(&self, region: Region) -> InstrumentResult<RgbImage> {
        let frame = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let mut vessel = self.lock();
        let image = match region {
            Region::Compass if vessel.take_hidden_frame() => {
                self.renderer.render_empty_panel(frame)
            }
            Region::Compass => self.renderer.render_compass(&vessel.target(), frame),
            Region::Target => self.renderer.render_target(&vessel.target(), frame),
        };
        Ok(image)
    }
}

impl Actuator for SimInstruments {
    fn actuate(&self, action: Action, hold: Duration) -> InstrumentResult<()> {
        if self.realtime {
            std::thread::sleep(hold);
        }
        self.lock().apply(action, hold);
        Ok(())
    }
}

impl Telemetry for SimInstruments {
    fn snapshot(&self) -> InstrumentResult<TelemetrySnapshot> {
        Ok(self.lock().telemetry().clone())
    }
}
