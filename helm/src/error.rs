use shared::calibration::Axis;
use shared::instrument::InstrumentError;
use thiserror::Error;

/// Errors produced by the alignment core.
///
/// Only cancellation, exhausted budgets, flip deadlock and collaborator
/// failures cross a component boundary. Hemisphere and jitter conditions are
/// data, never errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HelmError {
    /// Operator requested a stop.
    #[error("interrupted by operator")]
    Interrupted,

    /// Too many fine-alignment passes without converging.
    #[error("attempt budget exhausted after {attempts} fine-alignment passes")]
    AttemptBudgetExceeded {
        /// Passes spent.
        attempts: usize,
    },

    /// The alignment loop ran its maximum number of measure-and-act iterations.
    #[error("alignment loop stopped after {iterations} iterations")]
    LoopCapReached {
        /// Iterations run.
        iterations: usize,
    },

    /// Repeated flips did not bring the target to the front hemisphere.
    #[error("target still behind after {flips} flips")]
    FlipDeadlock {
        /// Flip pulses issued.
        flips: usize,
    },

    /// Compass could not be located even after repositioning.
    #[error("compass not found in {misses} consecutive reads")]
    SensorLost {
        /// Consecutive misses.
        misses: usize,
    },

    /// A bounded operation ran out of time.
    #[error("{operation} timed out after {seconds:.1}s")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// Elapsed seconds.
        seconds: f64,
    },

    /// Rate calibration produced no usable measurement.
    #[error("{axis} calibration failed: {reason}")]
    CalibrationFailed {
        /// Axis being calibrated.
        axis: Axis,
        /// Human-readable cause.
        reason: String,
    },

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Capture, actuation or telemetry failure.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

/// Result type for alignment operations
pub type HelmResult<T> = Result<T, HelmError>;
