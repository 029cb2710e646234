//! Background travel monitor.
//!
//! Runs on its own thread while the vessel is in supercruise, polling
//! telemetry on a fixed cadence. It publishes two flags the orchestrator
//! reads and, while the overcharge mode is active, aborts it with a boost
//! press when the vessel overheats or runs short of fuel. The orchestrator
//! never waits on this thread.

use crate::callback::{EventSink, HelmEvent};
use crate::cancel::CancellationToken;
use crate::config::MonitorConfig;
use crate::controllers::TAP;
use log::{debug, info, warn};
use shared::instrument::{Action, Actuator, Telemetry, TelemetrySnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Flags published by the monitor, read by the orchestrator.
///
/// Readers tolerate values up to one poll interval stale.
#[derive(Debug, Default)]
pub struct MonitorState {
    secondary_mode_active: AtomicBool,
    disengage_detected: AtomicBool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn secondary_mode_active(&self) -> bool {
        self.secondary_mode_active.load(Ordering::SeqCst)
    }

    pub fn disengage_detected(&self) -> bool {
        self.disengage_detected.load(Ordering::SeqCst)
    }

    pub fn set_secondary_mode_active(&self, active: bool) {
        self.secondary_mode_active.store(active, Ordering::SeqCst);
    }

    pub fn set_disengage_detected(&self, detected: bool) {
        self.disengage_detected.store(detected, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.set_secondary_mode_active(false);
        self.set_disengage_detected(false);
    }
}

/// Handle to a running monitor thread; stops the thread on drop
pub struct MonitorHandle {
    state: Arc<MonitorState>,
    shutdown: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Shared flags, suitable for handing to the orchestrator
    pub fn state(&self) -> Arc<MonitorState> {
        self.state.clone()
    }

    /// False once the travel mode has ended or `stop` was called
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop polling and wait for the thread to exit
    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!("Travel monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Spawns the polling loop
pub struct TravelMonitor;

impl TravelMonitor {
    pub fn spawn(
        config: MonitorConfig,
        telemetry: Arc<dyn Telemetry>,
        actuator: Arc<dyn Actuator>,
        events: EventSink,
    ) -> MonitorHandle {
        let state = Arc::new(MonitorState::new());
        let shutdown = CancellationToken::new();

        let state_clone = state.clone();
        let shutdown_clone = shutdown.clone();
        let join_handle = std::thread::spawn(move || {
            run_monitor_loop(
                &config,
                telemetry.as_ref(),
                actuator.as_ref(),
                &events,
                &state_clone,
                &shutdown_clone,
            );
        });

        MonitorHandle {
            state,
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

fn run_monitor_loop(
    config: &MonitorConfig,
    telemetry: &dyn Telemetry,
    actuator: &dyn Actuator,
    events: &EventSink,
    state: &MonitorState,
    shutdown: &CancellationToken,
) {
    info!("Travel monitor started");
    // Abort is pressed at most once per activation
    let mut aborted = false;

    loop {
        match telemetry.snapshot() {
            Ok(snapshot) => {
                if !snapshot.supercruise {
                    info!("Travel mode ended, monitor stopping");
                    state.clear();
                    break;
                }
                poll_once(config, &snapshot, actuator, events, state, &mut aborted);
            }
            Err(e) => warn!("Monitor telemetry read failed: {e}"),
        }

        if shutdown.sleep(config.poll_interval()).is_err() {
            debug!("Travel monitor shut down");
            state.clear();
            break;
        }
    }
}

fn poll_once(
    config: &MonitorConfig,
    snapshot: &TelemetrySnapshot,
    actuator: &dyn Actuator,
    events: &EventSink,
    state: &MonitorState,
    aborted: &mut bool,
) {
    let active = snapshot.sco_active;
    if active != state.secondary_mode_active() {
        if active {
            info!("Secondary travel mode active");
        } else {
            info!("Secondary travel mode inactive");
            *aborted = false;
        }
        state.set_secondary_mode_active(active);
        events.emit(HelmEvent::SecondaryModeChanged { active });
    }

    if active && !*aborted {
        if let Some(reason) = abort_reason(config, snapshot) {
            warn!("Aborting secondary travel mode: {reason}");
            match actuator.actuate(Action::Boost, TAP) {
                Ok(()) => {
                    *aborted = true;
                    events.emit(HelmEvent::SecondaryModeAborted { reason });
                }
                Err(e) => warn!("Failed to abort secondary travel mode: {e}"),
            }
        }
    }

    let disengage = !active && snapshot.disengage_prompt;
    if disengage && !state.disengage_detected() {
        info!("Disengage prompt detected");
        events.emit(HelmEvent::DisengageDetected);
    }
    state.set_disengage_detected(disengage);
}

fn abort_reason(config: &MonitorConfig, snapshot: &TelemetrySnapshot) -> Option<String> {
    if snapshot.over_heating {
        Some("over heating".to_string())
    } else if snapshot.low_fuel {
        Some("low fuel".to_string())
    } else if snapshot.fuel_percent < config.fuel_abort_percent {
        Some(format!("fuel at {:.0}%", snapshot.fuel_percent))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::instrument::mock::{MockTelemetry, RecordingActuator};
    use shared::instrument::Flag;
    use std::time::{Duration, Instant};

    fn fast() -> MonitorConfig {
        MonitorConfig {
            poll_interval_secs: 0.005,
            ..MonitorConfig::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_exits_when_not_in_travel_mode() {
        let telemetry = Arc::new(MockTelemetry::new());
        let actuator = Arc::new(RecordingActuator::new());
        let handle = TravelMonitor::spawn(fast(), telemetry, actuator, EventSink::new());
        assert!(wait_until(|| !handle.is_running()));
    }

    #[test]
    fn test_aborts_once_on_overheat() {
        let telemetry = Arc::new(
            MockTelemetry::new()
                .with_flag(Flag::Supercruise, true)
                .with_flag(Flag::ScoActive, true)
                .with_flag(Flag::OverHeating, true),
        );
        let actuator = Arc::new(RecordingActuator::new());
        let mut handle =
            TravelMonitor::spawn(fast(), telemetry.clone(), actuator.clone(), EventSink::new());
        let state = handle.state();

        assert!(wait_until(|| state.secondary_mode_active()));
        assert!(wait_until(|| actuator.count() == 1));
        let reads = telemetry.reads();
        assert!(wait_until(|| telemetry.reads() > reads + 3));
        assert_eq!(actuator.actions()[0].0, Action::Boost);
        assert_eq!(actuator.count(), 1);

        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_low_fuel_threshold() {
        let config = MonitorConfig::default();
        let mut snapshot = TelemetrySnapshot {
            fuel_percent: 50.0,
            ..TelemetrySnapshot::default()
        };
        assert_eq!(abort_reason(&config, &snapshot), None);
        snapshot.fuel_percent = 4.0;
        assert_eq!(abort_reason(&config, &snapshot), Some("fuel at 4%".to_string()));
    }

    #[test]
    fn test_disengage_only_outside_secondary_mode() {
        let telemetry = Arc::new(
            MockTelemetry::new()
                .with_flag(Flag::Supercruise, true)
                .with_flag(Flag::ScoActive, true)
                .with_flag(Flag::DisengagePrompt, true),
        );
        let actuator = Arc::new(RecordingActuator::new());
        let handle = TravelMonitor::spawn(fast(), telemetry.clone(), actuator, EventSink::new());
        let state = handle.state();

        assert!(wait_until(|| state.secondary_mode_active()));
        assert!(!state.disengage_detected());

        telemetry.set_flag(Flag::ScoActive, false);
        assert!(wait_until(|| state.disengage_detected()));
        assert!(!state.secondary_mode_active());

        telemetry.set_flag(Flag::Supercruise, false);
        assert!(wait_until(|| !handle.is_running()));
        assert!(!state.disengage_detected());
    }
}
