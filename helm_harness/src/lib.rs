//! Helm harness for testing and simulation
//!
//! Provides a simulated vessel, a renderer for its instrument imagery and a
//! runner that closes the helm alignment loop over them, for integration
//! tests and offline demonstration.

pub mod renderer;
pub mod runner;
pub mod sim_instruments;
pub mod simulated_vessel;

pub use renderer::{InstrumentRenderer, RendererConfig};
pub use runner::{
    build_orchestrator, calibrate_all, find_scenario, run_alignment, run_with,
    simulated_instruments, standard_scenarios, RunOptions, RunReport, RunnerResults, Scenario,
};
pub use sim_instruments::SimInstruments;
pub use simulated_vessel::{Bearing, SimulatedVessel, VesselModel};
