use crate::error::HelmError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alignment state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignPhase {
    /// Not aligning
    Idle,
    /// Reading the compass
    Measure,
    /// Target behind, pitching over
    Flip,
    /// Rolling the target onto the vertical centerline
    CoarseRoll,
    /// Dominant-axis-first pitch/yaw correction
    FinePitchYaw,
    /// Averaging several reads before declaring success
    Verify,
    /// Tightening on the target reticle
    FineAlign,
    /// Waiting out an interdiction
    Recovering,
}

impl fmt::Display for AlignPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlignPhase::Idle => "IDLE",
            AlignPhase::Measure => "MEASURE",
            AlignPhase::Flip => "FLIP",
            AlignPhase::CoarseRoll => "COARSE_ROLL",
            AlignPhase::FinePitchYaw => "FINE_PITCH_YAW",
            AlignPhase::Verify => "VERIFY",
            AlignPhase::FineAlign => "FINE_ALIGN",
            AlignPhase::Recovering => "RECOVERING",
        };
        f.write_str(name)
    }
}

/// Why an alignment failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    AttemptBudgetExceeded { attempts: usize },
    LoopCapReached { iterations: usize },
    FlipDeadlock { flips: usize },
    SensorLost { misses: usize },
    Timeout { seconds: f64 },
    Calibration(String),
    InvalidConfig(String),
    Instrument(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::AttemptBudgetExceeded { attempts } => {
                write!(f, "no convergence after {attempts} fine-alignment passes")
            }
            FailureReason::LoopCapReached { iterations } => {
                write!(f, "no convergence after {iterations} measure-and-act iterations")
            }
            FailureReason::FlipDeadlock { flips } => {
                write!(f, "target still behind after {flips} flips")
            }
            FailureReason::SensorLost { misses } => {
                write!(f, "compass not visible in {misses} consecutive reads")
            }
            FailureReason::Timeout { seconds } => {
                write!(f, "alignment timed out after {seconds:.1}s")
            }
            FailureReason::Calibration(msg) => write!(f, "calibration failed: {msg}"),
            FailureReason::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            FailureReason::Instrument(msg) => write!(f, "instrument failure: {msg}"),
        }
    }
}

/// Terminal result of one `align()` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlignOutcome {
    Aligned,
    Failed(FailureReason),
    Interrupted,
}

impl AlignOutcome {
    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignOutcome::Aligned)
    }
}

impl From<HelmError> for AlignOutcome {
    fn from(error: HelmError) -> Self {
        let reason = match error {
            HelmError::Interrupted => return AlignOutcome::Interrupted,
            HelmError::AttemptBudgetExceeded { attempts } => {
                FailureReason::AttemptBudgetExceeded { attempts }
            }
            HelmError::LoopCapReached { iterations } => {
                FailureReason::LoopCapReached { iterations }
            }
            HelmError::FlipDeadlock { flips } => FailureReason::FlipDeadlock { flips },
            HelmError::SensorLost { misses } => FailureReason::SensorLost { misses },
            HelmError::Timeout { seconds, .. } => FailureReason::Timeout { seconds },
            HelmError::CalibrationFailed { axis, reason } => {
                FailureReason::Calibration(format!("{axis}: {reason}"))
            }
            HelmError::InvalidConfig(msg) => FailureReason::InvalidConfig(msg),
            HelmError::Instrument(e) => FailureReason::Instrument(e.to_string()),
        };
        AlignOutcome::Failed(reason)
    }
}

impl fmt::Display for AlignOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignOutcome::Aligned => write!(f, "ALIGNED"),
            AlignOutcome::Failed(reason) => write!(f, "FAILED ({reason})"),
            AlignOutcome::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_never_maps_to_failed() {
        assert_eq!(
            AlignOutcome::from(HelmError::Interrupted),
            AlignOutcome::Interrupted
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            AlignOutcome::from(HelmError::FlipDeadlock { flips: 3 }),
            AlignOutcome::Failed(FailureReason::FlipDeadlock { flips: 3 })
        );
        let outcome = AlignOutcome::from(HelmError::AttemptBudgetExceeded { attempts: 4 });
        assert!(!outcome.is_aligned());
        assert!(outcome.to_string().contains("4 fine-alignment passes"));
    }
}
