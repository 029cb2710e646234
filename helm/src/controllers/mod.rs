//! Actuation and per-axis feedback control
//!
//! [`Controls`] is the only path from the core to the actuator: every pulse
//! and every wait passes through it, so cancellation is honoured at each one.

mod axis_controller;

pub use axis_controller::{AxisController, Correction, CorrectionStatus};

use crate::callback::{EventSink, HelmEvent};
use crate::cancel::CancellationToken;
use crate::error::HelmResult;
use crate::offset::axis_action;
use log::debug;
use shared::calibration::{Axis, AxisCalibration};
use shared::instrument::{Action, Actuator};
use std::sync::Arc;
use std::time::Duration;

/// Hold used for mode commands such as throttle and boost
pub const TAP: Duration = Duration::from_millis(100);

/// Actuator plus the cancellation token and event sink every pulse reports to
#[derive(Clone)]
pub struct Controls {
    pub actuator: Arc<dyn Actuator>,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

impl Controls {
    pub fn new(actuator: Arc<dyn Actuator>, cancel: CancellationToken, events: EventSink) -> Self {
        Self {
            actuator,
            cancel,
            events,
        }
    }

    /// Hold `action` for `hold`.
    ///
    /// Cancellation is checked before the press only; a pulse that has
    /// started always completes and releases.
    pub fn pulse(&self, action: Action, hold: Duration) -> HelmResult<()> {
        self.cancel.check()?;
        debug!("Pulse {action} for {:.3}s", hold.as_secs_f64());
        self.actuator.actuate(action, hold)?;
        self.events.emit(HelmEvent::PulseIssued { action, hold });
        Ok(())
    }

    /// Short press of a mode command
    pub fn tap(&self, action: Action) -> HelmResult<()> {
        self.pulse(action, TAP)
    }

    /// Cancellable wait
    pub fn wait(&self, duration: Duration) -> HelmResult<()> {
        self.cancel.sleep(duration)
    }

    /// Open-loop rotation that removes a reading of `degrees` on `axis`.
    ///
    /// Positive degrees press up, right or clockwise. Returns the hold used.
    pub fn move_by(
        &self,
        axis: Axis,
        degrees: f64,
        calibration: &AxisCalibration,
    ) -> HelmResult<Duration> {
        let distance = degrees.abs();
        if !distance.is_finite() || distance <= 0.0 {
            return Ok(Duration::ZERO);
        }
        let hold = Duration::from_secs_f64(distance / calibration.rate_for(distance));
        self.pulse(axis_action(axis, degrees > 0.0), hold)?;
        Ok(hold)
    }
}

impl std::fmt::Debug for Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controls")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HelmError;
    use approx::assert_relative_eq;
    use shared::instrument::mock::RecordingActuator;
    use shared::instrument::InstrumentError;

    fn controls(actuator: Arc<RecordingActuator>) -> Controls {
        Controls::new(actuator, CancellationToken::new(), EventSink::new())
    }

    #[test]
    fn test_move_by_uses_flat_rate_for_large_moves() {
        let actuator = Arc::new(RecordingActuator::new());
        let controls = controls(actuator.clone());
        let mut cal = AxisCalibration::default_for(Axis::Pitch);
        cal.rate_deg_per_sec = 30.0;

        let hold = controls.move_by(Axis::Pitch, 180.0, &cal).unwrap();
        assert_relative_eq!(hold.as_secs_f64(), 6.0, epsilon = 1e-9);
        let hold = controls.move_by(Axis::Roll, -90.0, &AxisCalibration::default_for(Axis::Roll)).unwrap();
        assert_relative_eq!(hold.as_secs_f64(), 90.0 / 80.0, epsilon = 1e-9);

        let actions: Vec<Action> = actuator.actions().iter().map(|(a, _)| *a).collect();
        assert_eq!(actions, vec![Action::PitchUp, Action::RollLeft]);
    }

    #[test]
    fn test_zero_move_is_noop() {
        let actuator = Arc::new(RecordingActuator::new());
        let controls = controls(actuator.clone());
        let cal = AxisCalibration::default_for(Axis::Yaw);
        assert_eq!(controls.move_by(Axis::Yaw, 0.0, &cal).unwrap(), Duration::ZERO);
        assert_eq!(actuator.count(), 0);
    }

    #[test]
    fn test_pulse_refused_after_cancel() {
        let actuator = Arc::new(RecordingActuator::new());
        let controls = controls(actuator.clone());
        controls.cancel.cancel();
        assert_eq!(controls.tap(Action::Boost), Err(HelmError::Interrupted));
        assert_eq!(actuator.count(), 0);
    }

    #[test]
    fn test_unmapped_action_fails_loudly() {
        let actuator = Arc::new(RecordingActuator::new().without_binding(Action::Boost));
        let controls = controls(actuator);
        assert_eq!(
            controls.tap(Action::Boost),
            Err(HelmError::Instrument(InstrumentError::UnmappedAction(
                "UseBoostJuice".to_string()
            )))
        );
    }
}
