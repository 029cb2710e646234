//! Shared components for the helm workspace.
//!
//! Image processing primitives, the instrument abstraction layer with its
//! mock implementations, and the per-vehicle calibration model and store.

pub mod calibration;
pub mod config_storage;
pub mod image_proc;
pub mod instrument;
