//! Rigid-body vessel model for closed-loop testing
//!
//! Tracks the target direction in the body frame (x right, y up, z forward)
//! and rotates it in response to control pulses. Each pulse loses a fixed
//! input latency before the vessel starts turning, so short pulses move the
//! vessel less than the flat rate predicts, as on a real ship.
//!
//! Mode flags (supercruise, overcharge, interdiction) follow a small scripted
//! model so recovery and monitor behaviour can be exercised end to end.

use log::debug;
use nalgebra::{Rotation3, Unit, Vector3};
use shared::instrument::{Action, TelemetrySnapshot};
use std::time::Duration;

/// Physical response of the simulated vessel
#[derive(Debug, Clone)]
pub struct VesselModel {
    /// True pitch rate in degrees per second
    pub pitch_rate: f64,
    /// True yaw rate in degrees per second
    pub yaw_rate: f64,
    /// True roll rate in degrees per second
    pub roll_rate: f64,
    /// Dead time at the start of every pulse
    pub latency: Duration,
    /// Boost presses needed to ride out a drive cooldown
    pub cooldown_boosts: usize,
}

impl Default for VesselModel {
    fn default() -> Self {
        Self {
            pitch_rate: 30.0,
            yaw_rate: 9.0,
            roll_rate: 75.0,
            latency: Duration::from_millis(40),
            cooldown_boosts: 2,
        }
    }
}

/// Ground-truth bearing of the target relative to the boresight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bearing {
    /// Degrees above the boresight, measured in the pitch plane
    pub pitch: f64,
    /// Degrees right of the boresight, measured in the yaw plane
    pub yaw: f64,
    /// Angle between the boresight and the target
    pub off_boresight: f64,
    pub in_front: bool,
}

/// Simulated vessel state
#[derive(Debug, Clone)]
pub struct SimulatedVessel {
    model: VesselModel,
    /// Unit vector to the target in body coordinates
    target: Vector3<f64>,
    telemetry: TelemetrySnapshot,
    actions: Vec<(Action, Duration)>,
    hidden_compass_frames: usize,
    cooldown_remaining: usize,
}

impl SimulatedVessel {
    /// Vessel with the target straight ahead
    pub fn new(model: VesselModel) -> Self {
        Self {
            model,
            target: Vector3::z(),
            telemetry: TelemetrySnapshot::default(),
            actions: Vec::new(),
            hidden_compass_frames: 0,
            cooldown_remaining: 0,
        }
    }

    /// Place the target at spherical `pitch` and `yaw` (degrees).
    ///
    /// Pitch beyond ±90 puts the target behind the vessel.
    pub fn with_target(mut self, pitch: f64, yaw: f64) -> Self {
        let (p, y) = (pitch.to_radians(), yaw.to_radians());
        self.target = Vector3::new(p.cos() * y.sin(), p.sin(), p.cos() * y.cos()).normalize();
        self
    }

    /// Roll the vessel clockwise by `degrees` without logging an action
    pub fn with_roll(mut self, degrees: f64) -> Self {
        self.rotate(Vector3::z_axis(), degrees);
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySnapshot) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn model(&self) -> &VesselModel {
        &self.model
    }

    /// Target direction in body coordinates
    pub fn target(&self) -> Vector3<f64> {
        self.target
    }

    pub fn bearing(&self) -> Bearing {
        let d = self.target;
        Bearing {
            pitch: d.y.atan2(d.z).to_degrees(),
            yaw: d.x.atan2(d.z).to_degrees(),
            off_boresight: d.z.clamp(-1.0, 1.0).acos().to_degrees(),
            in_front: d.z > 0.0,
        }
    }

    pub fn telemetry(&self) -> &TelemetrySnapshot {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetrySnapshot {
        &mut self.telemetry
    }

    /// Every pulse received so far
    pub fn actions(&self) -> &[(Action, Duration)] {
        &self.actions
    }

    /// Make the next `frames` compass captures show an empty panel
    pub fn hide_compass(&mut self, frames: usize) {
        self.hidden_compass_frames = frames;
    }

    /// Consume one hidden frame; true while the compass is hidden
    pub fn take_hidden_frame(&mut self) -> bool {
        if self.hidden_compass_frames > 0 {
            self.hidden_compass_frames -= 1;
            true
        } else {
            false
        }
    }

    /// Start an interdiction: supercruise is being disrupted
    pub fn begin_interdiction(&mut self) {
        self.telemetry.supercruise = true;
        self.telemetry.being_interdicted = true;
    }

    /// Apply one control pulse
    pub fn apply(&mut self, action: Action, hold: Duration) {
        self.actions.push((action, hold));
        let turning = hold.saturating_sub(self.model.latency).as_secs_f64();

        match action {
            Action::PitchUp => self.rotate(Vector3::x_axis(), self.model.pitch_rate * turning),
            Action::PitchDown => self.rotate(Vector3::x_axis(), -self.model.pitch_rate * turning),
            Action::YawRight => self.rotate(Vector3::y_axis(), -self.model.yaw_rate * turning),
            Action::YawLeft => self.rotate(Vector3::y_axis(), self.model.yaw_rate * turning),
            Action::RollRight => self.rotate(Vector3::z_axis(), self.model.roll_rate * turning),
            Action::RollLeft => self.rotate(Vector3::z_axis(), -self.model.roll_rate * turning),
            Action::ThrottleZero => {
                if self.telemetry.being_interdicted {
                    debug!("Submitted to interdiction, drive cooling down");
                    self.telemetry.being_interdicted = false;
                    self.telemetry.interdicted = true;
                    self.telemetry.supercruise = false;
                    self.telemetry.sco_active = false;
                    self.telemetry.fsd_cooldown = true;
                    self.cooldown_remaining = self.model.cooldown_boosts;
                }
            }
            Action::Boost => {
                if self.telemetry.sco_active {
                    debug!("Overcharge aborted by boost");
                    self.telemetry.sco_active = false;
                    self.telemetry.over_heating = false;
                } else if self.telemetry.fsd_cooldown {
                    self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
                    if self.cooldown_remaining == 0 {
                        self.telemetry.fsd_cooldown = false;
                    }
                }
            }
            Action::EngageSupercruise => {
                if !self.telemetry.fsd_cooldown {
                    self.telemetry.supercruise = true;
                    self.telemetry.interdicted = false;
                }
            }
            _ => {}
        }
    }

    /// Rotate the vessel about a body axis; the target moves the other way
    fn rotate(&mut self, axis: Unit<Vector3<f64>>, degrees: f64) {
        let rotation = Rotation3::from_axis_angle(&axis, degrees.to_radians());
        self.target = (rotation * self.target).normalize();
    }
}
