//! Alignment state machine.
//!
//! ```text
//! MEASURE ──behind──▶ FLIP ──▶ MEASURE
//!    │ far off centerline ──▶ COARSE_ROLL ──▶ FINE_PITCH_YAW
//!    │ within tolerance ──▶ VERIFY
//!    └──────────────────────▶ FINE_PITCH_YAW ──▶ VERIFY ──▶ FINE_ALIGN | done
//! ```
//!
//! Every transition is a cancellation point and an interdiction check.
//! Only budget exhaustion, flip deadlock, lost sensors, the session timeout
//! and cancellation end a session early.

use crate::calibrate::RateCalibrator;
use crate::callback::{CallbackId, EventSink, FlipKind, HelmEvent};
use crate::cancel::CancellationToken;
use crate::config::HelmConfig;
use crate::controllers::{AxisController, Controls, Correction, CorrectionStatus};
use crate::error::{HelmError, HelmResult};
use crate::fine_align::{FineAlignResult, FineAligner};
use crate::interdiction::{is_interdicted, BoostEscape, RecoveryRoutine};
use crate::monitor::MonitorState;
use crate::offset::AngularOffset;
use crate::sensor::{OffsetSensor, TargetSensor};
use crate::state::{AlignOutcome, AlignPhase};
use log::{debug, info, warn};
use shared::calibration::{Axis, AxisCalibration, VehicleCalibration};
use shared::instrument::{Actuator, Telemetry};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fine-alignment passes spent on the current target
#[derive(Debug, Clone)]
pub struct AttemptCounter {
    count: usize,
    max: usize,
}

impl AttemptCounter {
    pub fn new(max: usize) -> Self {
        Self { count: 0, max }
    }

    /// Start another pass, failing once the budget is spent
    pub fn begin(&mut self) -> HelmResult<usize> {
        if self.count >= self.max {
            return Err(HelmError::AttemptBudgetExceeded {
                attempts: self.count,
            });
        }
        self.count += 1;
        Ok(self.count)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Escalation for consecutive flips: full, full, quarter, then deadlock
#[derive(Debug, Clone, Default)]
pub struct FlipTracker {
    flips: usize,
}

impl FlipTracker {
    const FULL_FLIPS: usize = 2;

    pub fn next(&mut self) -> HelmResult<FlipKind> {
        let kind = match self.flips {
            n if n < Self::FULL_FLIPS => FlipKind::Full,
            n if n == Self::FULL_FLIPS => FlipKind::Quarter,
            n => return Err(HelmError::FlipDeadlock { flips: n }),
        };
        self.flips += 1;
        Ok(kind)
    }

    /// Target seen in front again
    pub fn reset(&mut self) {
        self.flips = 0;
    }

    pub fn flips(&self) -> usize {
        self.flips
    }
}

/// Per-call state of one `align()` session
struct Session {
    tolerance: f64,
    start: Instant,
    timeout: Duration,
    attempts: AttemptCounter,
    flips: FlipTracker,
    misses: usize,
    offset: AngularOffset,
}

enum Step {
    Goto(AlignPhase),
    Done,
}

/// Sequences measurement, flips and per-axis corrections into one alignment
pub struct AlignmentOrchestrator {
    config: HelmConfig,
    sensor: Box<dyn OffsetSensor>,
    reticle: Option<Box<dyn TargetSensor>>,
    controls: Controls,
    telemetry: Option<Arc<dyn Telemetry>>,
    monitor: Option<Arc<MonitorState>>,
    recovery: Box<dyn RecoveryRoutine>,
    calibrator: RateCalibrator,
    calibration: VehicleCalibration,
    phase: AlignPhase,
}

impl AlignmentOrchestrator {
    /// Build an orchestrator; the configuration is validated here
    pub fn new(
        config: HelmConfig,
        sensor: Box<dyn OffsetSensor>,
        actuator: Arc<dyn Actuator>,
        calibration: VehicleCalibration,
    ) -> HelmResult<Self> {
        config.validate()?;
        let calibrator = RateCalibrator {
            settle: config.correction.settle(),
            sweep_settle: config.correction.settle(),
            min_rate_deg_per_sec: config.correction.min_rate_deg_per_sec,
            ..RateCalibrator::default()
        };
        Ok(Self {
            config,
            sensor,
            reticle: None,
            controls: Controls::new(actuator, CancellationToken::new(), EventSink::new()),
            telemetry: None,
            monitor: None,
            recovery: Box::new(BoostEscape::default()),
            calibrator,
            calibration,
            phase: AlignPhase::Idle,
        })
    }

    /// Enable reticle fine alignment after a verified compass alignment
    pub fn with_reticle(mut self, reticle: Box<dyn TargetSensor>) -> Self {
        self.reticle = Some(reticle);
        self
    }

    /// Enable interdiction handling
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Read secondary-mode and disengage flags from a travel monitor
    pub fn with_monitor(mut self, monitor: Arc<MonitorState>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_recovery(mut self, recovery: Box<dyn RecoveryRoutine>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_calibrator(mut self, calibrator: RateCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    /// Share an existing event sink, e.g. with a travel monitor
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.controls.events = events;
        self
    }

    /// Request cancellation; safe from any thread holding a token clone
    pub fn request_cancel(&self) {
        self.controls.cancel.cancel();
    }

    /// Clear a previous cancellation before a new session
    pub fn clear_cancel(&self) {
        self.controls.cancel.reset();
    }

    /// Token clone for cancelling from another thread
    pub fn cancel_token(&self) -> CancellationToken {
        self.controls.cancel.clone()
    }

    pub fn events(&self) -> &EventSink {
        &self.controls.events
    }

    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&HelmEvent) + Send + Sync + 'static,
    {
        self.controls.events.register_callback(callback)
    }

    pub fn deregister_callback(&self, callback_id: CallbackId) -> bool {
        self.controls.events.deregister_callback(callback_id)
    }

    /// In-memory calibration, including anything learned this session
    pub fn calibration(&self) -> &VehicleCalibration {
        &self.calibration
    }

    pub fn phase(&self) -> AlignPhase {
        self.phase
    }

    /// Current accumulated compass bias
    pub fn compass_bias(&self) -> (f64, f64) {
        self.sensor.bias()
    }

    /// Point the vessel at the target.
    ///
    /// `tolerance` is in degrees on pitch and yaw, `max_attempts` bounds the
    /// fine-alignment passes and `timeout` the whole session.
    pub fn align(&mut self, tolerance: f64, max_attempts: usize, timeout: Duration) -> AlignOutcome {
        info!(
            "Aligning to within {tolerance:.2} deg ({max_attempts} attempts, {:.0}s)",
            timeout.as_secs_f64()
        );
        let result = self.run_session(tolerance, max_attempts, timeout);
        self.set_phase(AlignPhase::Idle);

        match result {
            Ok(attempts) => {
                info!("Alignment complete after {attempts} fine passes");
                self.controls.events.emit(HelmEvent::Aligned { attempts });
                AlignOutcome::Aligned
            }
            Err(error) => {
                let outcome = AlignOutcome::from(error);
                match &outcome {
                    AlignOutcome::Failed(reason) => {
                        warn!("Alignment failed: {reason}");
                        self.controls.events.emit(HelmEvent::Failed {
                            reason: reason.clone(),
                        });
                    }
                    _ => {
                        info!("Alignment interrupted");
                        self.controls.events.emit(HelmEvent::Interrupted);
                    }
                }
                outcome
            }
        }
    }

    /// Re-measure the turn rate of `axis` and store it in the calibration
    pub fn calibrate(&mut self, axis: Axis) -> HelmResult<AxisCalibration> {
        self.controls.cancel.check()?;
        let current = self.calibration.axis(axis);
        let updated =
            self.calibrator
                .calibrate(axis, &self.controls, self.sensor.as_mut(), current)?;
        self.calibration.set_axis(axis, updated.clone());
        Ok(updated)
    }

    fn run_session(
        &mut self,
        tolerance: f64,
        max_attempts: usize,
        timeout: Duration,
    ) -> HelmResult<usize> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(HelmError::InvalidConfig(format!(
                "tolerance must be positive, got {tolerance}"
            )));
        }
        self.controls.cancel.check()?;

        let mut session = Session {
            tolerance,
            start: Instant::now(),
            timeout,
            attempts: AttemptCounter::new(max_attempts),
            flips: FlipTracker::default(),
            misses: 0,
            offset: AngularOffset::BEHIND,
        };
        // Counts front readings and recoveries; flips and compass misses
        // have budgets of their own
        let max_iterations = max_attempts.max(1) * self.config.orchestrator.loop_multiplier;
        let mut iterations = 0;
        let mut phase = AlignPhase::Measure;

        loop {
            self.controls.cancel.check()?;
            let elapsed = session.start.elapsed();
            if elapsed >= session.timeout {
                return Err(HelmError::Timeout {
                    operation: "alignment".to_string(),
                    seconds: elapsed.as_secs_f64(),
                });
            }
            if self.interdicted() {
                iterations = self.next_iteration(iterations, max_iterations)?;
                self.recover()?;
                phase = AlignPhase::Measure;
                continue;
            }

            self.set_phase(phase);
            let step = match phase {
                AlignPhase::Measure => self.measure(&mut session)?,
                AlignPhase::Flip => self.flip(&mut session)?,
                AlignPhase::CoarseRoll => self.coarse_roll(&mut session)?,
                AlignPhase::FinePitchYaw => self.fine_pitch_yaw(&mut session)?,
                AlignPhase::Verify => self.verify(&mut session)?,
                AlignPhase::FineAlign => self.fine_align(&mut session)?,
                AlignPhase::Idle | AlignPhase::Recovering => Step::Goto(AlignPhase::Measure),
            };
            let front_reading = phase == AlignPhase::Measure
                && session.misses == 0
                && !session.offset.is_behind();
            if front_reading {
                iterations = self.next_iteration(iterations, max_iterations)?;
            }
            match step {
                Step::Goto(next) => phase = next,
                Step::Done => return Ok(session.attempts.count()),
            }
        }
    }

    fn next_iteration(&self, iterations: usize, max_iterations: usize) -> HelmResult<usize> {
        let iterations = iterations + 1;
        if iterations > max_iterations {
            warn!("Alignment loop cap of {max_iterations} iterations reached");
            return Err(HelmError::LoopCapReached {
                iterations: max_iterations,
            });
        }
        Ok(iterations)
    }

    fn set_phase(&mut self, phase: AlignPhase) {
        if phase != self.phase {
            debug!("Phase {} -> {}", self.phase, phase);
            self.controls.events.emit(HelmEvent::PhaseChanged {
                from: self.phase,
                to: phase,
            });
            self.phase = phase;
        }
    }

    fn interdicted(&self) -> bool {
        let Some(telemetry) = self.telemetry.as_deref() else {
            return false;
        };
        match telemetry.snapshot() {
            Ok(snapshot) => is_interdicted(&snapshot),
            Err(e) => {
                warn!("Telemetry read failed: {e}");
                false
            }
        }
    }

    fn recover(&mut self) -> HelmResult<()> {
        warn!("Interdiction detected, suspending alignment");
        self.controls.events.emit(HelmEvent::Interdicted);
        self.set_phase(AlignPhase::Recovering);
        if let Some(telemetry) = self.telemetry.clone() {
            self.recovery.recover(&self.controls, telemetry.as_ref())?;
        }
        info!("Recovered from interdiction, resuming from MEASURE");
        self.controls.events.emit(HelmEvent::Recovered);
        Ok(())
    }

    /// Bounded wait for the secondary travel mode to end
    fn wait_for_secondary_mode(&self) -> HelmResult<()> {
        let Some(monitor) = self.monitor.as_deref() else {
            return Ok(());
        };
        if !monitor.secondary_mode_active() {
            return Ok(());
        }
        info!("Secondary travel mode active, waiting for it to end");
        let cfg = &self.config.orchestrator;
        let start = Instant::now();
        while monitor.secondary_mode_active() {
            if start.elapsed().as_secs_f64() >= cfg.secondary_mode_wait_secs {
                warn!("Secondary travel mode still active, measuring anyway");
                return Ok(());
            }
            self.controls.wait(cfg.condition_poll())?;
        }
        Ok(())
    }

    fn correct_axis(
        &mut self,
        axis: Axis,
        offset: AngularOffset,
        tolerance: f64,
    ) -> HelmResult<Correction> {
        let mut controller =
            AxisController::new(&self.config.correction, &self.controls, self.sensor.as_mut());
        if let Some(telemetry) = self.telemetry.as_deref() {
            controller = controller.with_telemetry(telemetry);
        }
        let correction = controller.correct(
            axis,
            offset,
            tolerance,
            self.config.orchestrator.axis_timeout(),
            self.calibration.axis(axis),
        )?;
        self.calibration
            .set_axis(axis, correction.calibration.clone());
        Ok(correction)
    }

    fn measure(&mut self, s: &mut Session) -> HelmResult<Step> {
        self.wait_for_secondary_mode()?;
        let cfg = &self.config.orchestrator;

        let Some(offset) = self.sensor.read()? else {
            s.misses += 1;
            self.controls
                .events
                .emit(HelmEvent::CompassMissing { misses: s.misses });
            if s.misses > cfg.max_compass_misses {
                return Err(HelmError::SensorLost { misses: s.misses });
            }
            info!("Compass not visible, rolling to a new vantage");
            let roll = self.calibration.axis(Axis::Roll);
            self.controls.move_by(Axis::Roll, cfg.blind_roll_deg, &roll)?;
            self.controls.wait(self.config.correction.settle())?;
            return Ok(Step::Goto(AlignPhase::Measure));
        };

        s.misses = 0;
        s.offset = offset;
        self.controls
            .events
            .emit(HelmEvent::OffsetMeasured { offset });
        if offset.is_behind() {
            return Ok(Step::Goto(AlignPhase::Flip));
        }
        s.flips.reset();
        debug!(
            "Measured pitch {:+.2} yaw {:+.2} roll {:+.1}",
            offset.pitch, offset.yaw, offset.roll
        );

        if offset.within(Axis::Pitch, s.tolerance) && offset.within(Axis::Yaw, s.tolerance) {
            return Ok(Step::Goto(AlignPhase::Verify));
        }
        if offset.distance(Axis::Roll) > cfg.coarse_roll_threshold_deg
            && offset.max_pitch_yaw() > cfg.coarse_roll_min_offset_deg
        {
            return Ok(Step::Goto(AlignPhase::CoarseRoll));
        }
        Ok(Step::Goto(AlignPhase::FinePitchYaw))
    }

    fn flip(&mut self, s: &mut Session) -> HelmResult<Step> {
        let kind = s.flips.next()?;
        let degrees = match kind {
            FlipKind::Full => 180.0,
            FlipKind::Quarter => 90.0,
        };
        info!("Target behind, flip {} ({degrees:.0} deg)", s.flips.flips());
        self.controls.events.emit(HelmEvent::Flip {
            kind,
            attempt: s.flips.flips(),
        });
        let pitch = self.calibration.axis(Axis::Pitch);
        self.controls.move_by(Axis::Pitch, degrees, &pitch)?;
        self.controls.wait(self.config.orchestrator.flip_settle())?;
        Ok(Step::Goto(AlignPhase::Measure))
    }

    fn coarse_roll(&mut self, s: &mut Session) -> HelmResult<Step> {
        let threshold = self.config.orchestrator.coarse_roll_threshold_deg;
        info!(
            "Roll {:.1} deg off centerline, coarse roll",
            s.offset.distance(Axis::Roll)
        );
        let correction = self.correct_axis(Axis::Roll, s.offset, threshold)?;
        s.offset = correction.offset;
        Ok(match correction.status {
            CorrectionStatus::WentBehind => Step::Goto(AlignPhase::Flip),
            CorrectionStatus::SensorLost | CorrectionStatus::Suspended => {
                Step::Goto(AlignPhase::Measure)
            }
            _ => Step::Goto(AlignPhase::FinePitchYaw),
        })
    }

    fn fine_pitch_yaw(&mut self, s: &mut Session) -> HelmResult<Step> {
        let attempt = s.attempts.begin()?;
        info!("Fine alignment pass {attempt}");

        let first = s.offset.dominant_axis();
        let second = match first {
            Axis::Pitch => Axis::Yaw,
            _ => Axis::Pitch,
        };
        for axis in [first, second] {
            let correction = self.correct_axis(axis, s.offset, s.tolerance)?;
            s.offset = correction.offset;
            match correction.status {
                CorrectionStatus::WentBehind => return Ok(Step::Goto(AlignPhase::Flip)),
                CorrectionStatus::SensorLost | CorrectionStatus::Suspended => {
                    return Ok(Step::Goto(AlignPhase::Measure))
                }
                _ => {}
            }
        }
        Ok(Step::Goto(AlignPhase::Verify))
    }

    fn verify(&mut self, s: &mut Session) -> HelmResult<Step> {
        let samples = self.config.orchestrator.verify_samples;
        let (mut pitch, mut yaw, mut count) = (0.0, 0.0, 0usize);
        for i in 0..samples {
            if i > 0 {
                self.controls.wait(self.config.correction.settle())?;
            }
            match self.sensor.read()? {
                Some(offset) if offset.is_behind() => {
                    debug!("Target behind during verify");
                    return Ok(Step::Goto(AlignPhase::Measure));
                }
                Some(offset) => {
                    pitch += offset.pitch;
                    yaw += offset.yaw;
                    count += 1;
                    s.offset = offset;
                }
                None => debug!("Verify read {} missed", i + 1),
            }
        }
        if count == 0 {
            return Ok(Step::Goto(AlignPhase::Measure));
        }
        let (pitch, yaw) = (pitch / count as f64, yaw / count as f64);
        debug!("Verified average pitch {pitch:+.2} yaw {yaw:+.2} over {count} reads");

        if pitch.abs() < s.tolerance && yaw.abs() < s.tolerance {
            let reticle_enabled = self.config.reticle.enabled && self.reticle.is_some();
            return Ok(if reticle_enabled {
                Step::Goto(AlignPhase::FineAlign)
            } else {
                Step::Done
            });
        }

        let (axis, value) = if pitch.abs() >= yaw.abs() {
            (Axis::Pitch, pitch)
        } else {
            (Axis::Yaw, yaw)
        };
        if value.abs() <= self.config.orchestrator.nudge_limit_deg {
            info!("Nudging {axis} by {value:+.2} and accepting");
            let calibration = self.calibration.axis(axis);
            self.controls.move_by(axis, value, &calibration)?;
            self.controls.wait(self.config.correction.settle())?;
            return Ok(Step::Done);
        }
        Ok(Step::Goto(AlignPhase::FinePitchYaw))
    }

    fn fine_align(&mut self, _s: &mut Session) -> HelmResult<Step> {
        let Some(reticle) = self.reticle.as_mut() else {
            return Ok(Step::Done);
        };
        if reticle.read_target()?.is_none() {
            info!("No reticle in view, compass alignment is sufficient");
            return Ok(Step::Done);
        }

        let result = FineAligner::new(
            &self.config.reticle,
            &self.controls,
            self.sensor.as_mut(),
            reticle.as_mut(),
            &self.calibration,
        )
        .with_monitor(self.monitor.as_deref())
        .run()?;

        info!("Fine align finished: {result:?}");
        Ok(match result {
            FineAlignResult::Found
            | FineAlignResult::CompassAccepted
            | FineAlignResult::Disengaged => Step::Done,
            FineAlignResult::Lost => Step::Goto(AlignPhase::Measure),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_sensor::ScriptedSensor;
    use shared::calibration::{SpeedRegime, VehicleId};
    use shared::instrument::mock::RecordingActuator;

    #[test]
    fn test_attempt_counter() {
        let mut counter = AttemptCounter::new(2);
        assert_eq!(counter.begin().unwrap(), 1);
        assert_eq!(counter.begin().unwrap(), 2);
        assert_eq!(
            counter.begin(),
            Err(HelmError::AttemptBudgetExceeded { attempts: 2 })
        );
    }

    #[test]
    fn test_flip_escalation() {
        let mut tracker = FlipTracker::default();
        assert_eq!(tracker.next().unwrap(), FlipKind::Full);
        assert_eq!(tracker.next().unwrap(), FlipKind::Full);
        assert_eq!(tracker.next().unwrap(), FlipKind::Quarter);
        assert_eq!(tracker.next(), Err(HelmError::FlipDeadlock { flips: 3 }));

        tracker.reset();
        assert_eq!(tracker.next().unwrap(), FlipKind::Full);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = HelmConfig::default();
        config.orchestrator.verify_samples = 0;
        let result = AlignmentOrchestrator::new(
            config,
            Box::new(ScriptedSensor::constant(None)),
            Arc::new(RecordingActuator::new()),
            VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
        );
        assert!(matches!(result, Err(HelmError::InvalidConfig(_))));
    }

    #[test]
    fn test_cancelled_before_start() {
        let actuator = Arc::new(RecordingActuator::new());
        let mut orchestrator = AlignmentOrchestrator::new(
            HelmConfig::default(),
            Box::new(ScriptedSensor::constant(Some(AngularOffset::from_angles(30.0, 0.0)))),
            actuator.clone(),
            VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
        )
        .unwrap();
        orchestrator.request_cancel();

        let outcome = orchestrator.align(1.0, 3, Duration::from_secs(10));
        assert_eq!(outcome, AlignOutcome::Interrupted);
        assert_eq!(actuator.count(), 0);
        assert_eq!(orchestrator.phase(), AlignPhase::Idle);

        orchestrator.clear_cancel();
        assert!(!orchestrator.cancel_token().is_cancelled());
    }
}
