use anyhow::{bail, Context};
use clap::Parser;
use helm::config::{CenterMode, HelmConfig};
use helm_harness::{
    calibrate_all, find_scenario, run_alignment, simulated_instruments, standard_scenarios,
    RunOptions, Scenario, SimulatedVessel, VesselModel,
};
use shared::calibration::{SpeedRegime, VehicleId};
use shared::config_storage::ConfigStorage;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments for the alignment demo
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Closed-loop compass alignment against a simulated vessel"
)]
struct Args {
    /// Named starting attitude (see --list)
    #[arg(short, long, default_value = "off_axis")]
    scenario: String,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Start from this target pitch instead of a scenario (degrees, beyond ±90 is behind)
    #[arg(long, requires = "yaw")]
    pitch: Option<f64>,

    /// Start from this target yaw instead of a scenario (degrees)
    #[arg(long, requires = "pitch")]
    yaw: Option<f64>,

    /// Pitch and yaw tolerance in degrees
    #[arg(short, long, default_value_t = 2.0)]
    tolerance: f64,

    /// Fine-alignment pass budget
    #[arg(short, long, default_value_t = 5)]
    attempts: usize,

    /// Session timeout in seconds
    #[arg(long, default_value_t = 120.0)]
    timeout: f64,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration here and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Use multi-frame ring voting for the compass centre
    #[arg(long)]
    voting: bool,

    /// Finish with reticle fine alignment
    #[arg(long)]
    reticle: bool,

    /// Keep real settle delays instead of running as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Calibrate turn rates before aligning and store the result
    #[arg(long)]
    calibrate: bool,

    /// Vessel id for the calibration store (no dashes)
    #[arg(long, default_value = "sim_vessel")]
    vehicle: String,

    /// Speed regime the calibration applies to (normal or supercruise)
    #[arg(long, default_value = "normal")]
    regime: String,

    /// Calibration store root (defaults to ~/.helm_config)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<HelmConfig> {
    let mut config = match &args.config {
        Some(path) => HelmConfig::load_from_file(path)?,
        None => HelmConfig::default(),
    };
    if args.voting {
        config.compass.center_mode = CenterMode::Voting;
    }
    if !args.realtime {
        config.correction.settle_secs = 0.0;
        config.correction.retry_secs = 0.0;
        config.orchestrator.flip_settle_secs = 0.0;
        config.orchestrator.condition_poll_secs = 0.01;
        config.reticle.move_settle_secs = 0.0;
        config.reticle.retry_secs = 0.0;
        config.monitor.poll_interval_secs = 0.01;
    }
    config.validate()?;
    Ok(config)
}

fn scenario_from(args: &Args) -> anyhow::Result<Scenario> {
    if let (Some(pitch), Some(yaw)) = (args.pitch, args.yaw) {
        return Ok(Scenario {
            name: "custom",
            description: "Attitude from the command line",
            pitch,
            yaw,
            roll: 0.0,
        });
    }
    find_scenario(&args.scenario)
        .with_context(|| format!("unknown scenario '{}', try --list", args.scenario))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list {
        for scenario in standard_scenarios() {
            println!(
                "{:<20} pitch {:>6.1} yaw {:>6.1} roll {:>5.1}  {}",
                scenario.name, scenario.pitch, scenario.yaw, scenario.roll, scenario.description
            );
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    if let Some(path) = &args.dump_config {
        config
            .save_to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    if args.vehicle.contains('-') {
        bail!("vehicle id '{}' cannot contain a dash", args.vehicle);
    }
    let storage = match &args.store {
        Some(path) => ConfigStorage::with_path(path.clone()),
        None => ConfigStorage::new().context("locating calibration store")?,
    };
    let regime = SpeedRegime::parse(&args.regime)
        .with_context(|| format!("unknown regime '{}'", args.regime))?;
    let vehicle = VehicleId::new(args.vehicle.as_str());
    let mut calibration = storage
        .load_or_default(&vehicle, regime)
        .context("loading calibration")?;

    if args.calibrate {
        println!("Calibrating {vehicle} ({regime})");
        // Calibration needs the marker on screen
        let vessel = SimulatedVessel::new(VesselModel::default()).with_target(20.0, 10.0);
        let sim = simulated_instruments(&config, vessel);
        calibration = calibrate_all(&config, sim, calibration)?;
        let path = storage
            .save_calibration(&calibration)
            .context("saving calibration")?;
        println!("Calibration saved to {}", path.display());
    }

    let scenario = scenario_from(&args)?;
    println!("Helm Alignment Demo");
    println!("===================");
    println!("Scenario: {} ({})", scenario.name, scenario.description);
    println!("Tolerance: {:.2} deg, {} attempts", args.tolerance, args.attempts);

    let sim = simulated_instruments(&config, scenario.vessel(VesselModel::default()));
    let options = RunOptions {
        tolerance: args.tolerance,
        max_attempts: args.attempts,
        timeout: Duration::from_secs_f64(args.timeout),
        use_reticle: args.reticle,
    };
    let results = run_alignment(&config, sim, calibration, &options)?;

    let report = results.report(scenario.name);

    println!();
    println!("Outcome:        {}", results.outcome);
    println!(
        "Final bearing:  pitch {:+.2} yaw {:+.2} ({:.2} off boresight)",
        results.final_bearing.pitch, results.final_bearing.yaw, results.final_bearing.off_boresight
    );
    println!("Pulses:         {}", results.pulses);
    println!("Flips:          {}", report.flips);
    println!("Overshoots:     {}", report.overshoots);
    println!("Frames:         {}", results.frames_rendered);
    println!("Elapsed:        {:.2}s", results.elapsed.as_secs_f64());

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if !results.outcome.is_aligned() {
        bail!("alignment did not complete: {}", results.outcome);
    }
    Ok(())
}
