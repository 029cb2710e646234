//! Closed-loop correction of a single axis.
//!
//! Each iteration plans one pulse from the remaining distance and the current
//! rate estimate, presses it, waits for the instrument to settle and re-reads.
//! Reads and pulses strictly alternate. The rate estimate is refined from the
//! observed motion and halved when the reading runs past the target.

use super::Controls;
use crate::callback::HelmEvent;
use crate::config::CorrectionConfig;
use crate::error::HelmResult;
use crate::interdiction::is_interdicted;
use crate::offset::{correction_action, travelled, AngularOffset};
use crate::sensor::OffsetSensor;
use log::{debug, info, warn};
use shared::calibration::{Axis, AxisCalibration};
use shared::instrument::Telemetry;
use std::time::{Duration, Instant};

/// Why a correction stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionStatus {
    /// Inside tolerance on entry, nothing pressed
    AlreadyAligned,
    Converged,
    /// Two reads in a row failed; the last good reading is returned
    SensorLost,
    /// Target moved into the rear hemisphere
    WentBehind,
    /// Soft timeout; the last reading is returned
    TimedOut,
    /// Interdiction detected between pulses
    Suspended,
}

/// Result of one [`AxisController::correct`] call
#[derive(Debug, Clone)]
pub struct Correction {
    /// Latest reading
    pub offset: AngularOffset,
    /// Calibration with any learned rate written back
    pub calibration: AxisCalibration,
    pub pulses: usize,
    pub overshoots: usize,
    /// Rate estimate in use when the loop stopped
    pub final_rate: f64,
    pub status: CorrectionStatus,
}

/// Single-axis feedback controller
pub struct AxisController<'a> {
    config: &'a CorrectionConfig,
    controls: &'a Controls,
    sensor: &'a mut dyn OffsetSensor,
    telemetry: Option<&'a dyn Telemetry>,
}

impl<'a> AxisController<'a> {
    pub fn new(
        config: &'a CorrectionConfig,
        controls: &'a Controls,
        sensor: &'a mut dyn OffsetSensor,
    ) -> Self {
        Self {
            config,
            controls,
            sensor,
            telemetry: None,
        }
    }

    /// Suspend corrections while an interdiction is reported
    pub fn with_telemetry(mut self, telemetry: &'a dyn Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Drive `axis` of `offset` inside `tolerance`.
    ///
    /// Never raises for sensor misses, overshoot or timeout; those come back
    /// as a [`CorrectionStatus`]. Only cancellation and collaborator failures
    /// are errors.
    pub fn correct(
        &mut self,
        axis: Axis,
        offset: AngularOffset,
        tolerance: f64,
        timeout: Duration,
        calibration: AxisCalibration,
    ) -> HelmResult<Correction> {
        let mut result = Correction {
            offset,
            final_rate: calibration.rate_for(offset.distance(axis)),
            calibration,
            pulses: 0,
            overshoots: 0,
            status: CorrectionStatus::AlreadyAligned,
        };
        if offset.is_behind() {
            result.status = CorrectionStatus::WentBehind;
            return Ok(result);
        }
        if offset.within(axis, tolerance) {
            return Ok(result);
        }

        let cfg = self.config;
        let floor = cfg.min_rate_deg_per_sec;
        let start = Instant::now();
        let mut remaining = offset.distance(axis);
        let mut rate = result.final_rate.max(floor);
        let mut max_hold = cfg.max_hold_secs;
        let mut action = correction_action(axis, offset.value(axis));

        debug!(
            "Correcting {axis}: {:.2} off (tolerance {tolerance:.2}), rate {rate:.2}",
            offset.value(axis)
        );

        let status = loop {
            self.controls.cancel.check()?;
            if start.elapsed() >= timeout {
                warn!(
                    "{axis} correction timed out after {:.1}s, {remaining:.2} remaining",
                    start.elapsed().as_secs_f64()
                );
                break CorrectionStatus::TimedOut;
            }
            if self.interdicted() {
                info!("{axis} correction suspended by interdiction");
                break CorrectionStatus::Suspended;
            }

            let fraction = if remaining < cfg.approach_threshold_deg {
                cfg.approach_fraction_near
            } else {
                cfg.approach_fraction_far
            };
            let hold_secs = cfg.clamp_hold(remaining * fraction / rate, max_hold);
            self.controls
                .pulse(action, Duration::from_secs_f64(hold_secs))?;
            result.pulses += 1;
            self.controls.wait(cfg.settle())?;

            let Some(next) = self.read_with_retry()? else {
                warn!("{axis} correction lost the compass, keeping last reading");
                break CorrectionStatus::SensorLost;
            };
            if next.is_behind() {
                result.offset = next;
                break CorrectionStatus::WentBehind;
            }
            if next.within(axis, tolerance) {
                result.offset = next;
                break CorrectionStatus::Converged;
            }

            let next_remaining = next.distance(axis);
            let previous_rate = rate;
            if next_remaining > remaining + cfg.overshoot_margin_deg {
                rate = (rate * cfg.overshoot_rate_factor).max(floor);
                max_hold = (max_hold * cfg.max_hold_decay).max(cfg.max_hold_floor_secs);
                result.overshoots += 1;
                info!(
                    "{axis} overshoot: {remaining:.2} -> {next_remaining:.2}, rate {previous_rate:.2} -> {rate:.2}"
                );
                self.controls.events.emit(HelmEvent::Overshoot {
                    axis,
                    before_deg: remaining,
                    after_deg: next_remaining,
                    new_rate: rate,
                });
            } else {
                let moved = travelled(axis, &result.offset, &next);
                if moved > 0.0 && hold_secs > cfg.rate_update_min_hold_secs {
                    let ceiling = result.calibration.max_rate_deg_per_sec.max(floor);
                    rate = (moved / hold_secs).clamp(floor, ceiling);
                }
            }

            // Small-angle behaviour is the table's job; only large moves
            // refine the flat rate
            if rate != previous_rate && remaining >= result.calibration.table_threshold_deg {
                result.calibration.set_rate(rate, floor);
                self.controls.events.emit(HelmEvent::RateUpdated {
                    axis,
                    rate: result.calibration.rate_deg_per_sec,
                });
            }

            action = correction_action(axis, next.value(axis));
            result.offset = next;
            remaining = next_remaining;
        };

        result.status = status;
        result.final_rate = rate;
        debug!(
            "{axis} correction finished {status:?} after {} pulses, {:.2} remaining",
            result.pulses,
            result.offset.distance(axis)
        );
        Ok(result)
    }

    fn read_with_retry(&mut self) -> HelmResult<Option<AngularOffset>> {
        if let Some(offset) = self.sensor.read()? {
            return Ok(Some(offset));
        }
        self.controls.wait(self.config.retry())?;
        self.sensor.read()
    }

    fn interdicted(&self) -> bool {
        let Some(telemetry) = self.telemetry else {
            return false;
        };
        match telemetry.snapshot() {
            Ok(snapshot) => is_interdicted(&snapshot),
            Err(e) => {
                warn!("Telemetry read failed during correction: {e}");
                false
            }
        }
    }
}
