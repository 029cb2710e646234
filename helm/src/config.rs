use crate::error::{HelmError, HelmResult};
use serde::{Deserialize, Serialize};
use shared::image_proc::color::HsvRange;
use std::path::Path;
use std::time::Duration;

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// How the compass ring centre is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterMode {
    /// Centre of the located region
    Geometric,
    /// Median of several independent circle fits, geometric fallback
    Voting,
}

/// Compass segmentation and centre estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompassConfig {
    /// Bezel colour band
    pub ring_band: HsvRange,
    /// Front-marker colour band (ring pixels are excluded from it)
    pub marker_band: HsvRange,
    /// Marker components must be strictly larger than this (pixels)
    pub min_marker_area: f64,
    /// Marker components must be strictly smaller than this fraction of the region
    pub max_marker_fraction: f64,
    pub center_mode: CenterMode,
    /// Captures per voting round
    pub voting_samples: usize,
    /// Fits that must agree with the median centre
    pub voting_min_agreement: usize,
    /// Accepted fit radius, as a fraction of the expected radius
    pub voting_radius_tolerance: f64,
    /// Accepted fit centre offset, as a fraction of the expected radius
    pub voting_center_tolerance: f64,
    /// Distance to the median centre that counts as agreement (pixels)
    pub voting_agreement_px: f64,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            ring_band: HsvRange::new((5, 100, 100), (25, 255, 255)),
            marker_band: HsvRange::new((75, 40, 170), (105, 255, 255)),
            min_marker_area: 2.0,
            max_marker_fraction: 0.3,
            center_mode: CenterMode::Geometric,
            voting_samples: 5,
            voting_min_agreement: 3,
            voting_radius_tolerance: 0.15,
            voting_center_tolerance: 0.15,
            voting_agreement_px: 2.0,
        }
    }
}

/// Rectangle in viewport fractions (0..1, origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ViewportRect {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Target reticle detection and the fine-align sub-procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReticleConfig {
    /// Hand off to reticle fine-align after a verified compass alignment
    pub enabled: bool,
    /// Where the `Target` capture sits within the viewport
    pub capture_rect: ViewportRect,
    /// Reticle colour band
    pub band: HsvRange,
    /// Smallest arc component (pixels)
    pub min_arc_px: usize,
    /// Smallest arc component as a fraction of the capture area
    pub min_arc_fraction: f64,
    /// Smallest accepted fitted radius (pixels)
    pub min_radius_px: f64,
    /// Largest accepted fitted radius as a fraction of the capture's smaller side
    pub max_radius_fraction: f64,
    /// Largest accepted RMS residual as a fraction of the radius
    pub max_rms_fraction: f64,
    pub horizontal_fov_deg: f64,
    pub vertical_fov_deg: f64,
    /// Keep the target this far above centre so it does not drop out of view
    pub pitch_bias_deg: f64,
    /// Tolerance once inside the outer limit
    pub inner_limit_deg: f64,
    /// Initial tolerance
    pub outer_limit_deg: f64,
    /// Limits and bias scale when only the compass is available
    pub compass_multiplier: f64,
    /// Reads before giving up on acquiring either sensor
    pub acquire_attempts: usize,
    /// Consecutive misses taken to mean the target is behind
    pub behind_after_misses: usize,
    pub max_iterations: usize,
    /// Accept when both axes are under this after `close_enough_after` iterations
    pub close_enough_deg: f64,
    pub close_enough_after: usize,
    /// Accept after this many consecutive compass-only iterations
    pub compass_only_accept: usize,
    /// Wait after each correction before re-reading
    pub move_settle_secs: f64,
    /// Wait between acquisition reads
    pub retry_secs: f64,
    /// Pitch step used to bring a target from behind back into view
    pub recovery_pitch_deg: f64,
    pub recovery_steps: usize,
}

impl Default for ReticleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_rect: ViewportRect {
                left: 0.35,
                top: 0.30,
                right: 0.65,
                bottom: 0.70,
            },
            band: HsvRange::new((16, 165, 220), (98, 255, 255)),
            min_arc_px: 30,
            min_arc_fraction: 0.0001,
            min_radius_px: 8.0,
            max_radius_fraction: 0.5,
            max_rms_fraction: 0.2,
            horizontal_fov_deg: 96.0,
            vertical_fov_deg: 54.0,
            pitch_bias_deg: 0.25,
            inner_limit_deg: 0.5,
            outer_limit_deg: 1.0,
            compass_multiplier: 3.0,
            acquire_attempts: 5,
            behind_after_misses: 3,
            max_iterations: 15,
            close_enough_deg: 3.0,
            close_enough_after: 3,
            compass_only_accept: 3,
            move_settle_secs: 1.0,
            retry_secs: 0.5,
            recovery_pitch_deg: 30.0,
            recovery_steps: 6,
        }
    }
}

impl ReticleConfig {
    pub fn move_settle(&self) -> Duration {
        secs(self.move_settle_secs)
    }

    pub fn retry(&self) -> Duration {
        secs(self.retry_secs)
    }
}

/// Axis correction controller tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Wait after each pulse for the instrument to catch up
    pub settle_secs: f64,
    /// Wait before the single re-read after a miss
    pub retry_secs: f64,
    pub min_hold_secs: f64,
    pub max_hold_secs: f64,
    /// Fraction of the remaining distance planned per pulse when far
    pub approach_fraction_far: f64,
    /// Fraction of the remaining distance planned per pulse when near
    pub approach_fraction_near: f64,
    /// Below this remaining distance the near fraction applies
    pub approach_threshold_deg: f64,
    /// Growth in remaining distance that counts as an overshoot
    pub overshoot_margin_deg: f64,
    /// Rate multiplier applied on overshoot
    pub overshoot_rate_factor: f64,
    /// Max-hold multiplier applied on overshoot
    pub max_hold_decay: f64,
    pub max_hold_floor_secs: f64,
    /// Pulses shorter than this do not update the rate estimate
    pub rate_update_min_hold_secs: f64,
    pub min_rate_deg_per_sec: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            settle_secs: 0.3,
            retry_secs: 0.5,
            min_hold_secs: 0.10,
            max_hold_secs: 2.0,
            approach_fraction_far: 0.85,
            approach_fraction_near: 0.70,
            approach_threshold_deg: 10.0,
            overshoot_margin_deg: 5.0,
            overshoot_rate_factor: 0.5,
            max_hold_decay: 0.6,
            max_hold_floor_secs: 0.5,
            rate_update_min_hold_secs: 0.15,
            min_rate_deg_per_sec: 1.0,
        }
    }
}

impl CorrectionConfig {
    pub fn settle(&self) -> Duration {
        secs(self.settle_secs)
    }

    pub fn retry(&self) -> Duration {
        secs(self.retry_secs)
    }

    /// Pulse length clamp for a given max hold
    pub fn clamp_hold(&self, hold_secs: f64, max_hold_secs: f64) -> f64 {
        if hold_secs.is_finite() {
            hold_secs.clamp(self.min_hold_secs, max_hold_secs.max(self.min_hold_secs))
        } else {
            max_hold_secs
        }
    }
}

/// Alignment state machine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Roll onto the centerline when further off it than this
    pub coarse_roll_threshold_deg: f64,
    /// Skip coarse roll when pitch and yaw are both under this
    pub coarse_roll_min_offset_deg: f64,
    /// Soft timeout per axis correction
    pub axis_timeout_secs: f64,
    /// Reads averaged in VERIFY
    pub verify_samples: usize,
    /// Averaged offsets up to this are nudged and accepted
    pub nudge_limit_deg: f64,
    /// Roll used to find a new vantage when the compass is hidden
    pub blind_roll_deg: f64,
    /// Consecutive compass misses before giving up
    pub max_compass_misses: usize,
    /// Wait after a flip pulse
    pub flip_settle_secs: f64,
    /// Longest wait for the secondary travel mode to end before measuring
    pub secondary_mode_wait_secs: f64,
    /// Poll interval while waiting on external conditions
    pub condition_poll_secs: f64,
    /// Hard cap on state machine iterations, as a multiple of max attempts
    pub loop_multiplier: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            coarse_roll_threshold_deg: 45.0,
            coarse_roll_min_offset_deg: 10.0,
            axis_timeout_secs: 20.0,
            verify_samples: 3,
            nudge_limit_deg: 5.0,
            blind_roll_deg: 90.0,
            max_compass_misses: 8,
            flip_settle_secs: 0.5,
            secondary_mode_wait_secs: 30.0,
            condition_poll_secs: 1.0,
            loop_multiplier: 5,
        }
    }
}

impl OrchestratorConfig {
    pub fn axis_timeout(&self) -> Duration {
        secs(self.axis_timeout_secs)
    }

    pub fn flip_settle(&self) -> Duration {
        secs(self.flip_settle_secs)
    }

    pub fn condition_poll(&self) -> Duration {
        secs(self.condition_poll_secs)
    }
}

/// Concurrent travel monitor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_secs: f64,
    /// Abort the secondary mode when fuel drops under this percentage
    pub fuel_abort_percent: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 0.5,
            fuel_abort_percent: 10.0,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }
}

/// Configuration for the alignment core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelmConfig {
    #[serde(default)]
    pub compass: CompassConfig,
    #[serde(default)]
    pub reticle: ReticleConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl HelmConfig {
    /// Load from a JSON file and validate
    pub fn load_from_file(path: &Path) -> HelmResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HelmError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: HelmConfig = serde_json::from_str(&content).map_err(|e| {
            HelmError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Check every constraint the control loop relies on
    pub fn validate(&self) -> HelmResult<()> {
        fn require(ok: bool, msg: &str) -> HelmResult<()> {
            if ok {
                Ok(())
            } else {
                Err(HelmError::InvalidConfig(msg.to_string()))
            }
        }

        let c = &self.correction;
        require(c.settle_secs >= 0.0, "settle_secs must be non-negative")?;
        require(c.retry_secs >= 0.0, "retry_secs must be non-negative")?;
        require(
            c.min_hold_secs > 0.0 && c.min_hold_secs <= c.max_hold_secs,
            "pulse clamp must satisfy 0 < min_hold_secs <= max_hold_secs",
        )?;
        require(
            c.max_hold_floor_secs >= c.min_hold_secs,
            "max_hold_floor_secs must be at least min_hold_secs",
        )?;
        for fraction in [c.approach_fraction_far, c.approach_fraction_near] {
            require(
                fraction > 0.0 && fraction <= 1.0,
                "approach fractions must be in (0, 1]",
            )?;
        }
        require(
            c.overshoot_rate_factor > 0.0 && c.overshoot_rate_factor < 1.0,
            "overshoot_rate_factor must be in (0, 1)",
        )?;
        require(
            c.max_hold_decay > 0.0 && c.max_hold_decay <= 1.0,
            "max_hold_decay must be in (0, 1]",
        )?;
        require(
            c.min_rate_deg_per_sec > 0.0,
            "min_rate_deg_per_sec must be strictly positive",
        )?;

        let compass = &self.compass;
        require(
            compass.max_marker_fraction > 0.0 && compass.max_marker_fraction <= 1.0,
            "max_marker_fraction must be in (0, 1]",
        )?;
        require(
            compass.voting_min_agreement >= 1
                && compass.voting_min_agreement <= compass.voting_samples,
            "voting_min_agreement must be between 1 and voting_samples",
        )?;

        let r = &self.reticle;
        require(
            r.capture_rect.width() > 0.0 && r.capture_rect.height() > 0.0,
            "reticle capture_rect must have positive size",
        )?;
        require(
            r.horizontal_fov_deg > 0.0 && r.vertical_fov_deg > 0.0,
            "field of view must be positive",
        )?;
        require(
            r.inner_limit_deg > 0.0 && r.inner_limit_deg <= r.outer_limit_deg,
            "reticle limits must satisfy 0 < inner <= outer",
        )?;

        let o = &self.orchestrator;
        require(o.verify_samples >= 1, "verify_samples must be at least 1")?;
        require(o.loop_multiplier >= 1, "loop_multiplier must be at least 1")?;
        require(o.axis_timeout_secs > 0.0, "axis_timeout_secs must be positive")?;

        require(
            self.monitor.poll_interval_secs > 0.0,
            "monitor poll interval must be positive",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        assert!(HelmConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_pulse_clamp() {
        let mut config = HelmConfig::default();
        config.correction.min_hold_secs = 3.0;
        match config.validate() {
            Err(HelmError::InvalidConfig(msg)) => assert!(msg.contains("pulse clamp")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_rate_floor_rejected() {
        let mut config = HelmConfig::default();
        config.correction.min_rate_deg_per_sec = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_and_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("helm.json");

        let mut config = HelmConfig::default();
        config.compass.center_mode = CenterMode::Voting;
        config.correction.settle_secs = 0.01;
        config.save_to_file(&path).unwrap();
        assert_eq!(HelmConfig::load_from_file(&path).unwrap(), config);

        // Sections left out fall back to defaults
        std::fs::write(&path, r#"{ "monitor": { "poll_interval_secs": 0.1, "fuel_abort_percent": 5.0 } }"#)
            .unwrap();
        let partial = HelmConfig::load_from_file(&path).unwrap();
        assert_eq!(partial.monitor.poll_interval_secs, 0.1);
        assert_eq!(partial.correction, CorrectionConfig::default());
    }

    #[test]
    fn test_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            HelmConfig::load_from_file(&missing),
            Err(HelmError::InvalidConfig(_))
        ));
    }
}
