//! Interdiction recovery.
//!
//! When another vessel pulls us out of supercruise, alignment is suspended
//! and a recovery routine takes over until we are back in travel mode.

use crate::controllers::Controls;
use crate::error::HelmResult;
use log::{info, warn};
use shared::instrument::{Action, Flag, Telemetry, TelemetrySnapshot};
use std::time::{Duration, Instant};

/// Escape procedure run while alignment is suspended
pub trait RecoveryRoutine: Send {
    fn recover(&mut self, controls: &Controls, telemetry: &dyn Telemetry) -> HelmResult<()>;
}

/// True while an interdiction is in progress, or has completed and left us
/// out of supercruise.
///
/// The completed flag can stay set after supercruise resumes and is ignored then.
pub fn is_interdicted(snapshot: &TelemetrySnapshot) -> bool {
    snapshot.flag(Flag::BeingInterdicted)
        || (snapshot.flag(Flag::Interdicted) && !snapshot.flag(Flag::Supercruise))
}

/// Submit, boost away while the drive cools down, then re-engage supercruise
#[derive(Debug, Clone)]
pub struct BoostEscape {
    /// Telemetry poll interval while waiting
    pub poll: Duration,
    /// Longest wait for any single condition
    pub step_timeout: Duration,
    /// Gap between boost presses
    pub boost_interval: Duration,
}

impl Default for BoostEscape {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(1),
            step_timeout: Duration::from_secs(45),
            boost_interval: Duration::from_secs(5),
        }
    }
}

impl BoostEscape {
    /// Poll until `condition` holds or the step times out.
    ///
    /// Returns whether the condition was met; a timeout is logged, not raised.
    fn wait_for(
        &self,
        controls: &Controls,
        telemetry: &dyn Telemetry,
        what: &str,
        condition: impl Fn(&TelemetrySnapshot) -> bool,
    ) -> HelmResult<bool> {
        let start = Instant::now();
        loop {
            controls.cancel.check()?;
            match telemetry.snapshot() {
                Ok(snapshot) if condition(&snapshot) => return Ok(true),
                Ok(_) => {}
                Err(e) => warn!("Telemetry read failed while waiting for {what}: {e}"),
            }
            if start.elapsed() >= self.step_timeout {
                warn!(
                    "Gave up waiting for {what} after {:.1}s",
                    start.elapsed().as_secs_f64()
                );
                return Ok(false);
            }
            controls.wait(self.poll)?;
        }
    }
}

impl RecoveryRoutine for BoostEscape {
    fn recover(&mut self, controls: &Controls, telemetry: &dyn Telemetry) -> HelmResult<()> {
        info!("Interdiction: submitting");
        controls.tap(Action::ThrottleZero)?;
        self.wait_for(controls, telemetry, "drop to normal space", |s| {
            !s.supercruise && !s.fsd_charging
        })?;

        controls.tap(Action::Throttle100)?;
        if self.wait_for(controls, telemetry, "drive cooldown", |s| s.fsd_cooldown)? {
            let start = Instant::now();
            while start.elapsed() < self.step_timeout {
                match telemetry.snapshot() {
                    Ok(snapshot) if !snapshot.fsd_cooldown => break,
                    Ok(_) => {}
                    Err(e) => warn!("Telemetry read failed while boosting: {e}"),
                }
                controls.tap(Action::Boost)?;
                controls.wait(self.boost_interval)?;
            }
        }

        info!("Interdiction: re-engaging supercruise");
        controls.tap(Action::EngageSupercruise)?;
        Ok(())
    }
}
