use crate::offset::AngularOffset;
use crate::state::{AlignPhase, FailureReason};
use shared::calibration::Axis;
use shared::instrument::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Size of a flip pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FlipKind {
    /// Half a rotation
    Full,
    /// Quarter rotation, used to break a flip deadlock
    Quarter,
}

/// Events emitted for external callbacks
#[derive(Debug, Clone)]
pub enum HelmEvent {
    /// State machine moved to a new phase
    PhaseChanged { from: AlignPhase, to: AlignPhase },
    /// Fresh compass reading
    OffsetMeasured { offset: AngularOffset },
    /// A control was held
    PulseIssued { action: Action, hold: Duration },
    /// Remaining distance grew after a pulse
    Overshoot {
        axis: Axis,
        before_deg: f64,
        after_deg: f64,
        new_rate: f64,
    },
    /// Target behind, pitching over
    Flip { kind: FlipKind, attempt: usize },
    /// Compass not located this read
    CompassMissing { misses: usize },
    /// Learned rate written back to the calibration
    RateUpdated { axis: Axis, rate: f64 },
    /// Interdiction detected, alignment suspended
    Interdicted,
    /// Recovery routine finished, alignment resumes from MEASURE
    Recovered,
    /// Secondary travel mode switched on or off
    SecondaryModeChanged { active: bool },
    /// Secondary travel mode aborted for safety
    SecondaryModeAborted { reason: String },
    /// Disengage prompt seen while the secondary mode is off
    DisengageDetected,
    Aligned { attempts: usize },
    Failed { reason: FailureReason },
    Interrupted,
}

/// Callback ID for registration/deregistration
pub type CallbackId = u64;

/// Callback function type
pub type HelmCallback = Arc<dyn Fn(&HelmEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fire-and-forget observability sink.
///
/// Clones share one registry, so the orchestrator, controller and monitor
/// thread can all emit into the same set of callbacks.
#[derive(Clone, Default)]
pub struct EventSink {
    callbacks: Arc<Mutex<HashMap<CallbackId, HelmCallback>>>,
    next_callback_id: Arc<Mutex<CallbackId>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for helm events
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&HelmEvent) + Send + Sync + 'static,
    {
        let mut callbacks = lock(&self.callbacks);
        let mut next_id = lock(&self.next_callback_id);

        let callback_id = *next_id;
        *next_id += 1;

        callbacks.insert(callback_id, Arc::new(callback));
        callback_id
    }

    /// Deregister a callback
    pub fn deregister_callback(&self, callback_id: CallbackId) -> bool {
        lock(&self.callbacks).remove(&callback_id).is_some()
    }

    /// Get the number of registered callbacks
    pub fn callback_count(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Emit an event to all registered callbacks
    pub fn emit(&self, event: HelmEvent) {
        // Snapshot so callbacks may (de)register without deadlocking
        let callbacks: Vec<HelmCallback> = lock(&self.callbacks).values().cloned().collect();
        for callback in callbacks {
            callback(&event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_emit_deregister() {
        let sink = EventSink::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let id = sink.register_callback(move |event| {
            if let HelmEvent::PhaseChanged { to, .. } = event {
                seen_clone.lock().unwrap().push(*to);
            }
        });
        assert_eq!(sink.callback_count(), 1);

        sink.emit(HelmEvent::PhaseChanged {
            from: AlignPhase::Idle,
            to: AlignPhase::Measure,
        });
        sink.emit(HelmEvent::Interrupted);

        assert!(sink.deregister_callback(id));
        assert!(!sink.deregister_callback(id));
        sink.emit(HelmEvent::PhaseChanged {
            from: AlignPhase::Measure,
            to: AlignPhase::Flip,
        });

        assert_eq!(*seen.lock().unwrap(), vec![AlignPhase::Measure]);
    }

    #[test]
    fn test_clones_share_registry() {
        let sink = EventSink::new();
        let clone = sink.clone();
        clone.register_callback(|_| {});
        assert_eq!(sink.callback_count(), 1);
    }
}
