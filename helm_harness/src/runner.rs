//! Runner for executing alignment sessions against the simulated vessel
//!
//! Wires the readers, the orchestrator and, when the vessel is in
//! supercruise, the travel monitor onto one [`SimInstruments`], runs a
//! session and collects what happened.

use crate::renderer::{InstrumentRenderer, RendererConfig};
use crate::sim_instruments::SimInstruments;
use crate::simulated_vessel::{Bearing, SimulatedVessel, VesselModel};
use anyhow::Context;
use helm::{
    AlignOutcome, AlignmentOrchestrator, CompassReader, HelmConfig, HelmEvent, ReticleReader,
    TravelMonitor,
};
use log::info;
use serde::Serialize;
use shared::calibration::{Axis, VehicleCalibration};
use shared::instrument::{ColorRingLocator, Telemetry};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Session parameters
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pitch and yaw tolerance in degrees
    pub tolerance: f64,
    pub max_attempts: usize,
    pub timeout: Duration,
    /// Hand off to reticle fine alignment after the compass loop
    pub use_reticle: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tolerance: 2.0,
            max_attempts: 5,
            timeout: Duration::from_secs(120),
            use_reticle: false,
        }
    }
}

/// Results from a runner execution
#[derive(Debug, Clone)]
pub struct RunnerResults {
    pub outcome: AlignOutcome,
    /// True bearing when the session ended
    pub final_bearing: Bearing,
    /// Control pulses sent to the vessel
    pub pulses: usize,
    pub frames_rendered: u64,
    pub elapsed: Duration,
    /// All events emitted during the run
    pub events: Vec<HelmEvent>,
    /// Calibration including anything learned during the session
    pub calibration: VehicleCalibration,
    pub compass_bias: (f64, f64),
}

impl RunnerResults {
    /// Event counts whose variant matches `predicate`
    pub fn count_events(&self, predicate: impl Fn(&HelmEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    /// Serializable summary of the run
    pub fn report(&self, scenario: &str) -> RunReport {
        RunReport {
            scenario: scenario.to_string(),
            outcome: self.outcome.clone(),
            final_pitch: self.final_bearing.pitch,
            final_yaw: self.final_bearing.yaw,
            off_boresight: self.final_bearing.off_boresight,
            pulses: self.pulses,
            flips: self.count_events(|e| matches!(e, HelmEvent::Flip { .. })),
            overshoots: self.count_events(|e| matches!(e, HelmEvent::Overshoot { .. })),
            frames_rendered: self.frames_rendered,
            elapsed_secs: self.elapsed.as_secs_f64(),
            compass_bias: self.compass_bias,
            calibration: self.calibration.clone(),
        }
    }
}

/// JSON run summary written by the demo
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub outcome: AlignOutcome,
    pub final_pitch: f64,
    pub final_yaw: f64,
    pub off_boresight: f64,
    pub pulses: usize,
    pub flips: usize,
    pub overshoots: usize,
    pub frames_rendered: u64,
    pub elapsed_secs: f64,
    pub compass_bias: (f64, f64),
    pub calibration: VehicleCalibration,
}

/// Named starting attitude
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    /// Spherical target pitch in degrees; beyond ±90 is behind
    pub pitch: f64,
    pub yaw: f64,
    /// Extra clockwise roll applied after placing the target
    pub roll: f64,
}

impl Scenario {
    pub fn vessel(&self, model: VesselModel) -> SimulatedVessel {
        SimulatedVessel::new(model)
            .with_target(self.pitch, self.yaw)
            .with_roll(self.roll)
    }
}

/// Starting attitudes covering each branch of the alignment loop
pub fn standard_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "nearly_aligned",
            description: "Target just off the boresight",
            pitch: 1.0,
            yaw: -0.8,
            roll: 0.0,
        },
        Scenario {
            name: "off_axis",
            description: "Target up and to the left",
            pitch: 25.0,
            yaw: -15.0,
            roll: 0.0,
        },
        Scenario {
            name: "far_roll",
            description: "Target well off the vertical centerline",
            pitch: 10.0,
            yaw: 40.0,
            roll: 0.0,
        },
        Scenario {
            name: "behind",
            description: "Target in the rear hemisphere",
            pitch: 160.0,
            yaw: 0.0,
            roll: 0.0,
        },
        Scenario {
            name: "behind_and_rolled",
            description: "Target behind and low on the compass",
            pitch: 135.0,
            yaw: 20.0,
            roll: 30.0,
        },
    ]
}

pub fn find_scenario(name: &str) -> Option<Scenario> {
    standard_scenarios().into_iter().find(|s| s.name == name)
}

/// Simulated instruments with the default renderer, sized to `config`
pub fn simulated_instruments(config: &HelmConfig, vessel: SimulatedVessel) -> Arc<SimInstruments> {
    let renderer = InstrumentRenderer::new(RendererConfig::default(), config.reticle.clone());
    Arc::new(SimInstruments::new(vessel, renderer))
}

/// Orchestrator reading from and pulsing `sim`
pub fn build_orchestrator(
    config: &HelmConfig,
    sim: Arc<SimInstruments>,
    calibration: VehicleCalibration,
    use_reticle: bool,
) -> anyhow::Result<AlignmentOrchestrator> {
    let locator = ColorRingLocator {
        ring_band: config.compass.ring_band,
        ..ColorRingLocator::default()
    };
    let compass = CompassReader::new(sim.clone(), Arc::new(locator), config.compass.clone());

    let mut orchestrator =
        AlignmentOrchestrator::new(config.clone(), Box::new(compass), sim.clone(), calibration)
            .context("building orchestrator")?
            .with_telemetry(sim.clone());
    if use_reticle {
        let reticle = ReticleReader::new(sim, config.reticle.clone());
        orchestrator = orchestrator.with_reticle(Box::new(reticle));
    }
    Ok(orchestrator)
}

/// Run one alignment session on `sim`
pub fn run_alignment(
    config: &HelmConfig,
    sim: Arc<SimInstruments>,
    calibration: VehicleCalibration,
    options: &RunOptions,
) -> anyhow::Result<RunnerResults> {
    let orchestrator = build_orchestrator(config, sim.clone(), calibration, options.use_reticle)?;
    run_with(orchestrator, config, sim, options)
}

/// Run a session with an already-built orchestrator
pub fn run_with(
    mut orchestrator: AlignmentOrchestrator,
    config: &HelmConfig,
    sim: Arc<SimInstruments>,
    options: &RunOptions,
) -> anyhow::Result<RunnerResults> {
    // Set up event collection
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let callback_id = orchestrator.register_callback(move |event| {
        if let Ok(mut events) = events_clone.lock() {
            events.push(event.clone());
        }
    });

    let in_travel = sim.snapshot().map(|s| s.supercruise).unwrap_or(false);
    let mut monitor = if in_travel {
        let handle = TravelMonitor::spawn(
            config.monitor.clone(),
            sim.clone(),
            sim.clone(),
            orchestrator.events().clone(),
        );
        orchestrator = orchestrator.with_monitor(handle.state());
        Some(handle)
    } else {
        None
    };

    let start = Instant::now();
    let outcome = orchestrator.align(options.tolerance, options.max_attempts, options.timeout);
    let elapsed = start.elapsed();

    if let Some(handle) = monitor.as_mut() {
        handle.stop();
    }
    // Deregister the callback to avoid leaking resources
    orchestrator.deregister_callback(callback_id);

    let final_bearing = sim.bearing();
    info!(
        "{outcome} in {:.2}s, {:.2} deg off boresight",
        elapsed.as_secs_f64(),
        final_bearing.off_boresight
    );

    let events = match events.lock() {
        Ok(events) => events.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    Ok(RunnerResults {
        outcome,
        final_bearing,
        pulses: sim.actions().len(),
        frames_rendered: sim.frames_rendered(),
        elapsed,
        events,
        calibration: orchestrator.calibration().clone(),
        compass_bias: orchestrator.compass_bias(),
    })
}

/// Calibrate every axis on the simulated vessel
pub fn calibrate_all(
    config: &HelmConfig,
    sim: Arc<SimInstruments>,
    calibration: VehicleCalibration,
) -> anyhow::Result<VehicleCalibration> {
    let mut orchestrator = build_orchestrator(config, sim, calibration, false)?;
    for axis in [Axis::Pitch, Axis::Yaw, Axis::Roll] {
        let learned = orchestrator
            .calibrate(axis)
            .with_context(|| format!("calibrating {axis}"))?;
        info!(
            "{axis}: {:.2} deg/s, {} table entries",
            learned.rate_deg_per_sec,
            learned.rate_table.entries().len()
        );
    }
    Ok(orchestrator.calibration().clone())
}
