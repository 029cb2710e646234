//! Turn-rate calibration.
//!
//! Two measurements per axis. A single long pulse gives the flat rate used
//! for large corrections. A sweep of short, slowly growing pulses then fills
//! the small-angle table, where input latency makes the vessel turn slower
//! than the flat rate predicts.

use crate::controllers::Controls;
use crate::error::{HelmError, HelmResult};
use crate::offset::{axis_action, correction_action, travelled, AngularOffset};
use crate::sensor::OffsetSensor;
use log::{debug, info, warn};
use shared::calibration::{Axis, AxisCalibration, RateTable};
use std::time::Duration;

/// Pulse schedule for [`RateCalibrator::calibrate`]
#[derive(Debug, Clone)]
pub struct RateCalibrator {
    /// Flat-rate pulse length
    pub pulse: Duration,
    /// Wait after the flat-rate pulse and its undo
    pub settle: Duration,
    /// Wait after each sweep pulse
    pub sweep_settle: Duration,
    /// First sweep pulse
    pub sweep_start: Duration,
    /// Sweep pulse growth per step
    pub sweep_growth: f64,
    /// Movements (degrees) that each earn a table entry
    pub sweep_targets: Vec<f64>,
    /// Hard cap on sweep pulses
    pub max_sweep_pulses: usize,
    /// Rate floor
    pub min_rate_deg_per_sec: f64,
}

impl Default for RateCalibrator {
    fn default() -> Self {
        Self {
            pulse: Duration::from_secs(1),
            settle: Duration::from_millis(300),
            sweep_settle: Duration::from_secs(1),
            sweep_start: Duration::from_millis(50),
            sweep_growth: 1.04,
            sweep_targets: vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0],
            max_sweep_pulses: 150,
            min_rate_deg_per_sec: 1.0,
        }
    }
}

impl RateCalibrator {
    /// Measure the flat rate and small-angle table for `axis`.
    ///
    /// Starts from `current` and only replaces what was measured. Fails when
    /// the compass is not usable at the start or is lost for good.
    pub fn calibrate(
        &self,
        axis: Axis,
        controls: &Controls,
        sensor: &mut dyn OffsetSensor,
        current: AxisCalibration,
    ) -> HelmResult<AxisCalibration> {
        let mut calibration = current;
        let start = read_front(sensor)?.ok_or_else(|| HelmError::CalibrationFailed {
            axis,
            reason: "compass not visible or target behind".to_string(),
        })?;
        info!(
            "Calibrating {axis} from pitch {:.1} yaw {:.1} roll {:.1}",
            start.pitch, start.yaw, start.roll
        );

        match self.flat_rate(axis, controls, sensor, &start)? {
            Some(rate) => {
                calibration.set_rate(rate, self.min_rate_deg_per_sec);
                info!("{axis} rate {:.1} deg/s", calibration.rate_deg_per_sec);
            }
            None => warn!(
                "{axis} pulse moved less than {:.1} deg, keeping {:.1} deg/s",
                axis.min_credible_movement_deg(),
                calibration.rate_deg_per_sec
            ),
        }

        let table = self.sweep(axis, controls, sensor, calibration.rate_deg_per_sec)?;
        if table.is_empty() {
            warn!("{axis} sweep recorded nothing, keeping previous table");
        } else {
            let mut table = table;
            table.insert(calibration.table_threshold_deg, calibration.rate_deg_per_sec);
            debug!("{axis} rate table {:?}", table.entries());
            calibration.rate_table = table;
        }
        Ok(calibration)
    }

    /// One long pulse and its undo; `None` when the movement is not credible
    fn flat_rate(
        &self,
        axis: Axis,
        controls: &Controls,
        sensor: &mut dyn OffsetSensor,
        start: &AngularOffset,
    ) -> HelmResult<Option<f64>> {
        let forward = axis_action(axis, true);
        let back = axis_action(axis, false);

        controls.pulse(forward, self.pulse)?;
        controls.wait(self.settle)?;
        let Some(after) = read_front(sensor)? else {
            warn!("Lost compass during {axis} calibration, reversing");
            controls.pulse(back, self.pulse * 2)?;
            controls.wait(self.settle)?;
            return match read_front(sensor)? {
                Some(_) => Ok(None),
                None => Err(HelmError::CalibrationFailed {
                    axis,
                    reason: "compass lost and not recovered".to_string(),
                }),
            };
        };

        let moved = travelled(axis, start, &after);
        controls.pulse(back, self.pulse)?;
        controls.wait(self.settle)?;

        if moved > axis.min_credible_movement_deg() {
            Ok(Some(moved / self.pulse.as_secs_f64()))
        } else {
            Ok(None)
        }
    }

    /// Short pulses toward the target until each sweep target is exceeded
    fn sweep(
        &self,
        axis: Axis,
        controls: &Controls,
        sensor: &mut dyn OffsetSensor,
        flat_rate: f64,
    ) -> HelmResult<RateTable> {
        let mut table = RateTable::new();
        let mut hold = self.sweep_start.as_secs_f64();
        let mut last_delta = 0.0;
        let mut pulses = 0;

        'targets: for &target in &self.sweep_targets {
            loop {
                if pulses >= self.max_sweep_pulses {
                    warn!("{axis} sweep stopped after {pulses} pulses");
                    break 'targets;
                }
                let Some(before) = read_front(sensor)? else {
                    warn!("{axis} sweep lost the compass");
                    break 'targets;
                };
                let action = correction_action(axis, before.value(axis));
                controls.pulse(action, Duration::from_secs_f64(hold))?;
                pulses += 1;
                controls.wait(self.sweep_settle)?;
                let Some(after) = read_front(sensor)? else {
                    warn!("{axis} sweep lost the compass");
                    break 'targets;
                };

                let delta = travelled(axis, &before, &after);
                let rate = (delta / hold).min(flat_rate);
                let used = hold;
                hold *= self.sweep_growth;
                if delta >= target && delta > last_delta {
                    debug!("{axis} sweep: {delta:.2} deg in {used:.3}s -> {rate:.2} deg/s");
                    table.insert(delta, rate);
                    last_delta = delta;
                    break;
                }
                last_delta = delta;
            }
        }
        Ok(table)
    }
}

fn read_front(sensor: &mut dyn OffsetSensor) -> HelmResult<Option<AngularOffset>> {
    Ok(sensor.read()?.filter(|offset| !offset.is_behind()))
}
