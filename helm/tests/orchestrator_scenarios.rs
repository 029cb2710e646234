//! End-to-end orchestrator runs against scripted sensors and a linear plant

mod common;

use common::{calibration_at, fast_config, init_logging};
use helm::callback::HelmEvent;
use helm::controllers::Controls;
use helm::interdiction::RecoveryRoutine;
use helm::mock_sensor::{LinearPlant, ScriptedSensor, ScriptedTarget};
use helm::monitor::MonitorState;
use helm::offset::{AngularOffset, TargetOffset};
use helm::state::{AlignOutcome, FailureReason};
use helm::{AlignmentOrchestrator, HelmResult};
use shared::calibration::{Axis, SpeedRegime, VehicleCalibration, VehicleId};
use shared::instrument::mock::{MockTelemetry, RecordingActuator};
use shared::instrument::{Action, Flag, Telemetry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SESSION: Duration = Duration::from_secs(30);

fn plant_orchestrator(plant: &LinearPlant, rate: f64) -> AlignmentOrchestrator {
    AlignmentOrchestrator::new(
        fast_config(),
        Box::new(plant.clone()),
        Arc::new(plant.clone()),
        calibration_at(rate),
    )
    .unwrap()
}

fn collect_events(orchestrator: &AlignmentOrchestrator) -> Arc<Mutex<Vec<HelmEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    orchestrator.register_callback(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

fn is_axis(action: Action, axis: Axis) -> bool {
    match axis {
        Axis::Pitch => matches!(action, Action::PitchUp | Action::PitchDown),
        Axis::Yaw => matches!(action, Action::YawLeft | Action::YawRight),
        Axis::Roll => matches!(action, Action::RollLeft | Action::RollRight),
    }
}

#[test]
fn test_dominant_axis_corrected_first() {
    init_logging();
    let plant = LinearPlant::new(40.0, 5.0, 170.0, 30.0);
    let mut orchestrator = plant_orchestrator(&plant, 30.0);
    let events = collect_events(&orchestrator);

    let outcome = orchestrator.align(2.0, 3, SESSION);
    assert_eq!(outcome, AlignOutcome::Aligned);

    let actions = plant.actions();
    let first_yaw = actions
        .iter()
        .position(|(a, _)| is_axis(*a, Axis::Yaw))
        .expect("yaw was corrected");
    assert!(actions[..first_yaw].iter().all(|(a, _)| is_axis(*a, Axis::Pitch)));
    assert!(first_yaw > 0);
    // Roll was already near the lower centerline
    assert!(!actions.iter().any(|(a, _)| is_axis(*a, Axis::Roll)));

    let (pitch, yaw, _) = plant.truth();
    assert!(pitch.abs() < 2.0 && yaw.abs() < 2.0);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, HelmEvent::Aligned { attempts: 1 })));
}

#[test]
fn test_already_aligned_presses_nothing() {
    let plant = LinearPlant::new(0.5, -0.4, 10.0, 30.0);
    let mut orchestrator = plant_orchestrator(&plant, 30.0);

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    assert!(plant.actions().is_empty());
}

#[test]
fn test_behind_target_flips_then_aligns() {
    init_logging();
    let plant = LinearPlant::new(150.0, 10.0, 0.0, 30.0);
    let mut orchestrator = plant_orchestrator(&plant, 30.0);
    let events = collect_events(&orchestrator);

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);

    let actions = plant.actions();
    assert_eq!(actions[0], (Action::PitchUp, Duration::from_secs(6)));
    let flips = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, HelmEvent::Flip { .. }))
        .count();
    assert_eq!(flips, 1);
    let (pitch, yaw, _) = plant.truth();
    assert!(pitch.abs() < 2.0 && yaw.abs() < 2.0);
}

#[test]
fn test_persistent_behind_escalates_to_deadlock() {
    let actuator = Arc::new(RecordingActuator::new());
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(ScriptedSensor::constant(Some(AngularOffset::BEHIND))),
        actuator.clone(),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    let outcome = orchestrator.align(2.0, 3, SESSION);
    assert_eq!(
        outcome,
        AlignOutcome::Failed(FailureReason::FlipDeadlock { flips: 3 })
    );

    let actions = actuator.actions();
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().all(|(a, _)| *a == Action::PitchUp));
    // Two half rotations, then a quarter
    assert_eq!(actions[0].1, actions[1].1);
    let ratio = actions[2].1.as_secs_f64() / actions[0].1.as_secs_f64();
    assert!((ratio - 0.5).abs() < 1e-6);
}

#[test]
fn test_attempt_budget_exhausted() {
    let mut config = fast_config();
    config.correction.settle_secs = 0.001;
    config.orchestrator.axis_timeout_secs = 0.02;

    let actuator = Arc::new(RecordingActuator::new());
    // The vessel never responds
    let sensor = ScriptedSensor::constant(Some(AngularOffset::from_angles(20.0, 0.0)));
    let mut orchestrator = AlignmentOrchestrator::new(
        config,
        Box::new(sensor),
        actuator.clone(),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    let outcome = orchestrator.align(2.0, 2, SESSION);
    assert_eq!(
        outcome,
        AlignOutcome::Failed(FailureReason::AttemptBudgetExceeded { attempts: 2 })
    );
    assert!(actuator.count() > 0);
}

#[test]
fn test_lost_compass_rolls_then_fails() {
    let actuator = Arc::new(RecordingActuator::new());
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(ScriptedSensor::constant(None)),
        actuator.clone(),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    let outcome = orchestrator.align(2.0, 3, SESSION);
    assert_eq!(
        outcome,
        AlignOutcome::Failed(FailureReason::SensorLost { misses: 9 })
    );
    let actions = actuator.actions();
    assert_eq!(actions.len(), 8);
    assert!(actions.iter().all(|(a, _)| *a == Action::RollRight));
}

#[test]
fn test_flips_do_not_consume_single_attempt_budget() {
    init_logging();
    let actuator = Arc::new(RecordingActuator::new());
    let behind = Some(AngularOffset::BEHIND);
    let sensor = ScriptedSensor::new(vec![
        behind,
        behind,
        Some(AngularOffset::from_angles(0.5, 0.5)),
    ]);
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(sensor),
        actuator.clone(),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    assert_eq!(orchestrator.align(2.0, 1, SESSION), AlignOutcome::Aligned);
    let actions = actuator.actions();
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|(a, _)| *a == Action::PitchUp));
}

#[test]
fn test_deadlock_reported_with_single_attempt() {
    let actuator = Arc::new(RecordingActuator::new());
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(ScriptedSensor::constant(Some(AngularOffset::BEHIND))),
        actuator.clone(),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    assert_eq!(
        orchestrator.align(2.0, 1, SESSION),
        AlignOutcome::Failed(FailureReason::FlipDeadlock { flips: 3 })
    );
    assert_eq!(actuator.count(), 3);
}

#[test]
fn test_lost_compass_reported_with_single_attempt() {
    let actuator = Arc::new(RecordingActuator::new());
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(ScriptedSensor::constant(None)),
        actuator,
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    assert_eq!(
        orchestrator.align(2.0, 1, SESSION),
        AlignOutcome::Failed(FailureReason::SensorLost { misses: 9 })
    );
}

#[test]
fn test_loop_cap_stops_unverifiable_session() {
    init_logging();
    // Every front reading is in tolerance but verification never sees the compass
    let mut readings = Vec::new();
    for _ in 0..10 {
        readings.push(Some(AngularOffset::from_angles(0.5, 0.5)));
        readings.extend([None, None, None]);
    }
    let sensor = ScriptedSensor::new(readings);
    let reads = sensor.read_counter();
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(sensor),
        Arc::new(RecordingActuator::new()),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    assert_eq!(
        orchestrator.align(2.0, 1, SESSION),
        AlignOutcome::Failed(FailureReason::LoopCapReached { iterations: 5 })
    );
    // Five full measure-and-verify rounds, then the sixth front reading
    assert_eq!(*reads.lock().unwrap(), 5 * 4 + 1);
}

#[test]
fn test_small_residual_nudged_and_accepted() {
    let actuator = Arc::new(RecordingActuator::new());
    let sensor = ScriptedSensor::new(vec![
        Some(AngularOffset::from_angles(1.0, 0.5)),
        Some(AngularOffset::from_angles(3.0, 0.5)),
    ]);
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(sensor),
        actuator.clone(),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap();

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    let actions = actuator.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].0, Action::PitchUp);
}

#[test]
fn test_coarse_roll_precedes_pitch_and_yaw() {
    let plant = LinearPlant::new(30.0, 20.0, 90.0, 30.0);
    let mut orchestrator = plant_orchestrator(&plant, 30.0);

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    let actions = plant.actions();
    assert_eq!(actions[0].0, Action::RollRight);
    assert!(actions.iter().any(|(a, _)| is_axis(*a, Axis::Pitch)));
    let (_, _, roll) = plant.truth();
    assert!(roll.abs() < 45.0);
}

#[test]
fn test_cancel_mid_settle_interrupts_promptly() {
    let mut config = fast_config();
    config.correction.settle_secs = 5.0;
    let plant = LinearPlant::new(40.0, 0.0, 0.0, 30.0);
    let mut orchestrator = AlignmentOrchestrator::new(
        config,
        Box::new(plant.clone()),
        Arc::new(plant.clone()),
        calibration_at(30.0),
    )
    .unwrap();
    let events = collect_events(&orchestrator);

    let token = orchestrator.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    let start = Instant::now();
    let outcome = orchestrator.align(2.0, 3, SESSION);
    canceller.join().unwrap();

    assert_eq!(outcome, AlignOutcome::Interrupted);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(plant.actions().len(), 1);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, HelmEvent::Interrupted)));
}

#[test]
fn test_waits_for_secondary_mode_to_end() {
    let plant = LinearPlant::new(0.5, 0.5, 0.0, 30.0);
    let monitor = Arc::new(MonitorState::new());
    monitor.set_secondary_mode_active(true);
    let mut orchestrator = plant_orchestrator(&plant, 30.0).with_monitor(monitor.clone());

    let start = Instant::now();
    let remote = monitor.clone();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        remote.set_secondary_mode_active(false);
    });

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    releaser.join().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_secondary_mode_wait_is_bounded() {
    let mut config = fast_config();
    config.orchestrator.secondary_mode_wait_secs = 0.05;
    let plant = LinearPlant::new(0.5, 0.5, 0.0, 30.0);
    let monitor = Arc::new(MonitorState::new());
    monitor.set_secondary_mode_active(true);
    let mut orchestrator = AlignmentOrchestrator::new(
        config,
        Box::new(plant.clone()),
        Arc::new(plant.clone()),
        calibration_at(30.0),
    )
    .unwrap()
    .with_monitor(monitor);

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
}

struct ClearInterdiction {
    telemetry: Arc<MockTelemetry>,
    runs: Arc<AtomicUsize>,
}

impl RecoveryRoutine for ClearInterdiction {
    fn recover(&mut self, _controls: &Controls, _telemetry: &dyn Telemetry) -> HelmResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.telemetry.set_flag(Flag::Interdicted, false);
        Ok(())
    }
}

#[test]
fn test_interdiction_recovers_then_resumes() {
    let plant = LinearPlant::new(0.5, 0.5, 0.0, 30.0);
    let telemetry = Arc::new(MockTelemetry::new().with_flag(Flag::Interdicted, true));
    let runs = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = plant_orchestrator(&plant, 30.0)
        .with_telemetry(telemetry.clone())
        .with_recovery(Box::new(ClearInterdiction {
            telemetry: telemetry.clone(),
            runs: runs.clone(),
        }));
    let events = collect_events(&orchestrator);

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let events = events.lock().unwrap();
    let interdicted = events
        .iter()
        .position(|e| matches!(e, HelmEvent::Interdicted))
        .unwrap();
    let recovered = events
        .iter()
        .position(|e| matches!(e, HelmEvent::Recovered))
        .unwrap();
    assert!(interdicted < recovered);
}

#[test]
fn test_stale_interdiction_ignored_in_supercruise() {
    init_logging();
    let telemetry = Arc::new(
        MockTelemetry::new()
            .with_flag(Flag::Supercruise, true)
            .with_flag(Flag::Interdicted, true),
    );
    let runs = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(ScriptedSensor::constant(Some(AngularOffset::from_angles(
            0.5, 0.5,
        )))),
        Arc::new(RecordingActuator::new()),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap()
    .with_telemetry(telemetry.clone())
    .with_recovery(Box::new(ClearInterdiction {
        telemetry,
        runs: runs.clone(),
    }));
    let events = collect_events(&orchestrator);

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, HelmEvent::Interdicted)));
}

#[test]
fn test_reticle_fine_align_learns_bias() {
    let plant = LinearPlant::new(1.0, 0.5, 0.0, 30.0);
    let reticle = ScriptedTarget::new(vec![Some(TargetOffset::new(0.3, 0.2))]);
    let mut orchestrator = plant_orchestrator(&plant, 30.0).with_reticle(Box::new(reticle));

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    let (bx, by) = orchestrator.compass_bias();
    assert!(bx > 0.0 && by > 0.0, "bias ({bx}, {by})");
}

#[test]
fn test_invisible_reticle_accepts_compass_alignment() {
    let plant = LinearPlant::new(1.0, 0.5, 0.0, 30.0);
    let reticle = ScriptedTarget::new(vec![None]);
    let mut orchestrator = plant_orchestrator(&plant, 30.0).with_reticle(Box::new(reticle));

    assert_eq!(orchestrator.align(2.0, 3, SESSION), AlignOutcome::Aligned);
    assert_eq!(orchestrator.compass_bias(), (0.0, 0.0));
}

#[test]
fn test_calibrate_updates_in_memory_calibration() {
    let plant = LinearPlant::new(20.0, 0.0, 0.0, 25.0);
    let mut orchestrator = AlignmentOrchestrator::new(
        fast_config(),
        Box::new(plant.clone()),
        Arc::new(plant.clone()),
        VehicleCalibration::new(VehicleId::new("test"), SpeedRegime::Normal),
    )
    .unwrap()
    .with_calibrator(helm::calibrate::RateCalibrator {
        settle: Duration::ZERO,
        sweep_settle: Duration::ZERO,
        ..Default::default()
    });

    let learned = orchestrator.calibrate(Axis::Pitch).unwrap();
    assert!((learned.rate_deg_per_sec - 25.0).abs() < 1e-6);
    assert_eq!(orchestrator.calibration().axis(Axis::Pitch), learned);
}
