//! HELM - closed-loop heading alignment from instrument imagery
//!
//! Points a vessel at its navigation target using only what an operator
//! would see: a compass ring with a target marker and, at close range, a
//! target reticle. Offsets read from those images drive timed input pulses
//! through an [`AlignmentOrchestrator`]:
//! Measure -> (Flip | CoarseRoll) -> FinePitchYaw -> Verify -> FineAlign.
//!
//! A [`TravelMonitor`] runs beside the orchestrator during supercruise and
//! publishes the flags it consults. Every wait is cancellable through a
//! shared [`CancellationToken`].

pub mod calibrate;
pub mod callback;
pub mod cancel;
pub mod config;
pub mod controllers;
pub mod error;
pub mod fine_align;
pub mod interdiction;
pub mod mock_sensor;
pub mod monitor;
pub mod offset;
pub mod orchestrator;
pub mod sensor;
pub mod state;

// Re-export commonly used types for external use
pub use crate::callback::{CallbackId, EventSink, HelmEvent};
pub use crate::cancel::CancellationToken;
pub use crate::config::HelmConfig;
pub use crate::error::{HelmError, HelmResult};
pub use crate::monitor::{MonitorHandle, MonitorState, TravelMonitor};
pub use crate::offset::{AngularOffset, Hemisphere, TargetOffset};
pub use crate::orchestrator::AlignmentOrchestrator;
pub use crate::sensor::{CompassReader, OffsetSensor, ReticleReader, TargetSensor};
pub use crate::state::{AlignOutcome, AlignPhase, FailureReason};
