//! Reticle fine alignment.
//!
//! Runs after the compass loop has the target roughly ahead. The reticle is
//! read first; when it is not visible the compass stands in with limits
//! widened by the compass multiplier. Every move here is open loop, sized
//! from the calibrated rates, followed by a settle and a fresh read.

use crate::config::ReticleConfig;
use crate::controllers::Controls;
use crate::error::HelmResult;
use crate::monitor::MonitorState;
use crate::offset::{AngularOffset, TargetOffset};
use crate::sensor::{OffsetSensor, TargetSensor};
use log::{debug, info, warn};
use shared::calibration::{Axis, VehicleCalibration};

/// Above this on either axis, roll onto a centerline and pitch rather than yaw
const DIRECT_CORRECTION_LIMIT_DEG: f64 = 15.0;

/// How fine alignment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FineAlignResult {
    /// Settled on the reticle
    Found,
    /// Only the compass was visible, accepted as close enough
    CompassAccepted,
    /// Destination disengage prompt appeared
    Disengaged,
    /// Neither reticle nor compass marker visible
    Lost,
}

/// Offset being chased, with the reticle bias already applied
#[derive(Debug, Clone, Copy)]
struct Aim {
    pitch: f64,
    yaw: f64,
    roll: f64,
}

impl Aim {
    fn from_reticle(target: &TargetOffset, pitch_bias: f64) -> Self {
        Self {
            pitch: target.pitch - pitch_bias,
            yaw: target.yaw,
            roll: target.roll,
        }
    }

    fn from_compass(nav: &AngularOffset) -> Self {
        Self {
            pitch: nav.pitch,
            yaw: nav.yaw,
            roll: nav.roll,
        }
    }

    fn outside(&self, limit: f64) -> bool {
        self.pitch.abs() > limit || self.yaw.abs() > limit
    }
}

/// Roll that brings a clock angle onto the nearer vertical centerline
fn roll_to_centerline(roll: f64) -> f64 {
    if roll.abs() > 90.0 {
        roll - 180.0 * roll.signum()
    } else {
        roll
    }
}

pub struct FineAligner<'a> {
    config: &'a ReticleConfig,
    controls: &'a Controls,
    compass: &'a mut dyn OffsetSensor,
    reticle: &'a mut dyn TargetSensor,
    calibration: &'a VehicleCalibration,
    monitor: Option<&'a MonitorState>,
}

impl<'a> FineAligner<'a> {
    pub fn new(
        config: &'a ReticleConfig,
        controls: &'a Controls,
        compass: &'a mut dyn OffsetSensor,
        reticle: &'a mut dyn TargetSensor,
        calibration: &'a VehicleCalibration,
    ) -> Self {
        Self {
            config,
            controls,
            compass,
            reticle,
            calibration,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Option<&'a MonitorState>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn run(&mut self) -> HelmResult<FineAlignResult> {
        let cfg = self.config;
        let mut pitch_bias = cfg.pitch_bias_deg;
        let mut outer = cfg.outer_limit_deg;
        let mut inner = cfg.inner_limit_deg;

        // Acquire either sensor
        let mut aim = None;
        let mut last_target = None;
        let mut last_nav = None;
        let mut misses = 0;
        for _ in 0..cfg.acquire_attempts {
            self.controls.cancel.check()?;
            let nav = self.read_nav()?;
            let target = self.reticle.read_target()?;
            last_target = target;
            last_nav = nav;

            if let Some(target) = target {
                aim = Some(Aim::from_reticle(&target, pitch_bias));
            } else if let Some(nav) = nav {
                info!("Reticle not visible, fine aligning on the compass");
                outer *= cfg.compass_multiplier;
                inner *= cfg.compass_multiplier;
                pitch_bias *= cfg.compass_multiplier;
                aim = Some(Aim::from_compass(&nav));
            } else {
                misses += 1;
                if misses >= cfg.behind_after_misses {
                    self.pitch_until_visible()?;
                    misses = 0;
                } else {
                    self.controls.wait(cfg.retry())?;
                }
                continue;
            }

            if self.disengaged() {
                return Ok(FineAlignResult::Disengaged);
            }
            break;
        }

        let Some(mut aim) = aim else {
            info!("Fine align could not find the target");
            return Ok(FineAlignResult::Lost);
        };

        let mut compass_only = 0;
        let mut compass_accepted = false;
        let mut iterations = 0;
        while aim.outside(outer) {
            iterations += 1;
            if iterations > cfg.max_iterations {
                info!("Fine align reached {} iterations, accepting", cfg.max_iterations);
                break;
            }
            if !aim.outside(cfg.close_enough_deg) && iterations > cfg.close_enough_after {
                info!(
                    "Fine align close enough (pitch {:+.2}, yaw {:+.2})",
                    aim.pitch, aim.yaw
                );
                break;
            }
            // Tighten once we start moving
            outer = inner;

            debug!(
                "Fine align: pitch {:+.2} yaw {:+.2} roll {:+.1} limit {outer:.2}",
                aim.pitch, aim.yaw, aim.roll
            );
            self.move_toward(&aim, outer)?;
            self.controls.wait(cfg.move_settle())?;

            let nav = self.read_nav()?;
            let target = self.reticle.read_target()?;
            if let Some(target) = target {
                let next = Aim::from_reticle(&target, pitch_bias);
                if let Some(previous) = last_target {
                    let previous = Aim::from_reticle(&previous, pitch_bias);
                    if (previous.pitch < 0.0 && next.pitch > outer)
                        || (previous.pitch > 0.0 && next.pitch < -outer)
                    {
                        warn!(
                            "Fine align pitch overshoot: {:+.2} -> {:+.2}",
                            previous.pitch, next.pitch
                        );
                    }
                }
                aim = next;
                compass_only = 0;
                last_target = Some(target);
                last_nav = nav;
            } else if let Some(nav) = nav {
                aim = Aim::from_compass(&nav);
                compass_only += 1;
                debug!(
                    "Fine align on compass only ({compass_only}/{})",
                    cfg.compass_only_accept
                );
                if compass_only >= cfg.compass_only_accept {
                    info!("Compass close enough, accepting fine alignment");
                    compass_accepted = true;
                    break;
                }
            }

            if self.disengaged() {
                return Ok(FineAlignResult::Disengaged);
            }
            if target.is_none() && nav.is_none() {
                info!("Fine align lost the target");
                return Ok(FineAlignResult::Lost);
            }
        }

        // Whatever the compass reads while the reticle is centred is bias
        if let (Some(_), Some(nav)) = (last_target, last_nav) {
            self.compass.adjust_bias(nav.raw_x, nav.raw_y);
        }
        if compass_accepted {
            Ok(FineAlignResult::CompassAccepted)
        } else {
            Ok(FineAlignResult::Found)
        }
    }

    /// Compass reading with the marker visible
    fn read_nav(&mut self) -> HelmResult<Option<AngularOffset>> {
        Ok(self.compass.read()?.filter(|offset| !offset.is_behind()))
    }

    fn move_toward(&self, aim: &Aim, limit: f64) -> HelmResult<()> {
        let controls = self.controls;
        let calibration = self.calibration;
        if aim.yaw.abs() <= DIRECT_CORRECTION_LIMIT_DEG
            && aim.pitch.abs() <= DIRECT_CORRECTION_LIMIT_DEG
        {
            if aim.yaw.abs() > limit {
                controls.move_by(Axis::Yaw, aim.yaw, &calibration.axis(Axis::Yaw))?;
            }
        } else if aim.yaw.abs() > limit {
            controls.move_by(
                Axis::Roll,
                roll_to_centerline(aim.roll),
                &calibration.axis(Axis::Roll),
            )?;
        }
        if aim.pitch.abs() > limit {
            controls.move_by(Axis::Pitch, aim.pitch, &calibration.axis(Axis::Pitch))?;
        }
        Ok(())
    }

    /// Pitch up in steps until the compass marker shows again
    fn pitch_until_visible(&mut self) -> HelmResult<()> {
        info!("No reticle or marker in several reads, pitching up to recover");
        let pitch = self.calibration.axis(Axis::Pitch);
        for _ in 0..self.config.recovery_steps {
            self.controls
                .move_by(Axis::Pitch, self.config.recovery_pitch_deg, &pitch)?;
            self.controls.wait(self.config.retry())?;
            if self.read_nav()?.is_some() {
                break;
            }
        }
        self.controls.wait(self.config.move_settle())
    }

    fn disengaged(&self) -> bool {
        let detected = self.monitor.is_some_and(|m| m.disengage_detected());
        if detected {
            info!("Disengage detected during fine align");
        }
        detected
    }
}
