//! # Controller Context
//!
//! State shared by the kube-runtime controller callbacks.
//!
//! The reconciler itself is stateless across keys. Per-key driver state lives
//! here: the Fibonacci backoff of failing repositories and the time each
//! repository is next due.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::Reconciler;
use crate::crd::{ImageRepository, ObjectKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Per-key Fibonacci backoff, reset after a successful cycle
#[derive(Debug)]
pub struct BackoffTracker {
    start_secs: u64,
    max_secs: u64,
    states: Mutex<HashMap<ObjectKey, FibonacciBackoff>>,
}

impl BackoffTracker {
    #[must_use]
    pub fn new(start_secs: u64, max_secs: u64) -> Self {
        Self {
            start_secs,
            max_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before retrying `key`, advancing its sequence
    ///
    /// Falls back to the start delay if the state lock is poisoned.
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        match self.states.lock() {
            Ok(mut states) => states
                .entry(key.clone())
                .or_insert_with(|| FibonacciBackoff::new(self.start_secs, self.max_secs))
                .next_backoff(),
            Err(_) => Duration::from_secs(self.start_secs),
        }
    }

    /// Failed attempts since the last success
    pub fn attempts(&self, key: &ObjectKey) -> u32 {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(key).map(FibonacciBackoff::attempts))
            .unwrap_or_default()
    }

    pub fn reset(&self, key: &ObjectKey) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    /// Number of keys currently backing off
    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of asking the gate whether to run a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the reconciler
    Run,
    /// Already scheduled, come back after this long
    Wait(Duration),
    /// Nothing scheduled until the resource changes
    AwaitChange,
}

/// One incarnation of a resource at one spec generation
///
/// A resource deleted and created again under the same name restarts at
/// generation 1, so the uid is part of the comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revision {
    pub uid: Option<String>,
    pub generation: i64,
}

impl Revision {
    #[must_use]
    pub fn new(uid: impl Into<String>, generation: i64) -> Self {
        Self {
            uid: Some(uid.into()),
            generation,
        }
    }

    #[must_use]
    pub fn of(repo: &ImageRepository) -> Self {
        Self {
            uid: repo.metadata.uid.clone(),
            generation: repo.metadata.generation.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Scheduled {
    revision: Revision,
    /// `None` when the last cycle asked to wait for a change
    due: Option<Instant>,
}

/// Drops watch events caused by our own status writes
///
/// A status patch bumps the resource version but not the generation. When
/// such an event arrives before the key is due, the cycle is skipped and the
/// existing schedule kept. Spec changes and recreated resources always run.
#[derive(Debug, Default)]
pub struct ScheduleGate {
    scheduled: Mutex<HashMap<ObjectKey, Scheduled>>,
}

impl ScheduleGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &ObjectKey, revision: &Revision, now: Instant) -> GateDecision {
        let Ok(scheduled) = self.scheduled.lock() else {
            return GateDecision::Run;
        };
        match scheduled.get(key) {
            Some(entry) if entry.revision == *revision => match entry.due {
                None => GateDecision::AwaitChange,
                Some(due) if due > now => GateDecision::Wait(due - now),
                Some(_) => GateDecision::Run,
            },
            _ => GateDecision::Run,
        }
    }

    /// Remember when `key` is next due; `None` waits for a change
    pub fn record(&self, key: &ObjectKey, revision: Revision, next: Option<Duration>, now: Instant) {
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.insert(
                key.clone(),
                Scheduled {
                    revision,
                    due: next.map(|after| now + after),
                },
            );
        }
    }

    pub fn forget(&self, key: &ObjectKey) {
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.remove(key);
        }
    }

    /// Number of keys with a recorded schedule
    pub fn len(&self) -> usize {
        self.scheduled.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Context handed to the controller's reconcile and error policy callbacks
#[derive(Debug)]
pub struct ControllerContext {
    pub reconciler: Arc<Reconciler>,
    pub backoff: BackoffTracker,
    pub gate: ScheduleGate,
}

impl ControllerContext {
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>, backoff: BackoffTracker) -> Self {
        Self {
            reconciler,
            backoff,
            gate: ScheduleGate::new(),
        }
    }
}
