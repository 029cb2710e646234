//! Common utilities for harness integration tests

#![allow(dead_code)]

use helm::HelmConfig;
use helm_harness::VesselModel;
use shared::calibration::{Axis, AxisCalibration, SpeedRegime, VehicleCalibration, VehicleId};

/// Defaults with every settle removed; the simulator responds instantly
pub fn fast_config() -> HelmConfig {
    let mut config = HelmConfig::default();
    config.correction.settle_secs = 0.0;
    config.correction.retry_secs = 0.0;
    config.orchestrator.flip_settle_secs = 0.0;
    config.orchestrator.condition_poll_secs = 0.005;
    config.orchestrator.secondary_mode_wait_secs = 1.0;
    config.reticle.move_settle_secs = 0.0;
    config.reticle.retry_secs = 0.0;
    config.monitor.poll_interval_secs = 0.005;
    config
}

/// Calibration matching the flat rates of `model`
pub fn calibration_for(model: &VesselModel) -> VehicleCalibration {
    let mut calibration = VehicleCalibration::new(VehicleId::new("sim"), SpeedRegime::Normal);
    for (axis, rate) in [
        (Axis::Pitch, model.pitch_rate),
        (Axis::Yaw, model.yaw_rate),
        (Axis::Roll, model.roll_rate),
    ] {
        let mut cal = AxisCalibration::default_for(axis);
        cal.rate_deg_per_sec = rate;
        cal.max_rate_deg_per_sec = rate * 3.0;
        calibration.set_axis(axis, cal);
    }
    calibration
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
