//! # Dispatcher
//!
//! Alternative driver: a single task pops due keys from an in-process queue
//! and runs one reconcile cycle per key.
//!
//! Watch events enqueue keys for immediate processing. Success requeues the
//! key after the interval the reconciler returned; failure requeues it after
//! the key's Fibonacci backoff. A key that asks for nothing stays out of the
//! queue until the next spec change.
//!
//! Enabled with `RECONCILE_DRIVER=dispatcher`.

use crate::controller::reconciler::{Reconciler, TriggerSource};
use crate::controller::server::ServerState;
use crate::crd::{ImageRepository, ObjectKey};
use crate::observability;
use crate::runtime::context::{BackoffTracker, Revision};
use anyhow::anyhow;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Keys ordered by the time they are next due
///
/// Each key is held at most once. Enqueueing a key that is already queued
/// keeps whichever due time is earlier.
#[derive(Debug, Default)]
pub struct DueQueue {
    heap: BinaryHeap<Reverse<(Instant, ObjectKey)>>,
    due: HashMap<ObjectKey, Instant>,
}

impl DueQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` at `at`; returns false if it was already due earlier
    pub fn enqueue(&mut self, key: ObjectKey, at: Instant) -> bool {
        if let Some(existing) = self.due.get(&key) {
            if *existing <= at {
                return false;
            }
        }
        self.due.insert(key.clone(), at);
        self.heap.push(Reverse((at, key)));
        true
    }

    /// Drop `key` from the queue
    pub fn remove(&mut self, key: &ObjectKey) -> bool {
        self.due.remove(key).is_some()
    }

    /// Pop the earliest key due at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<ObjectKey> {
        self.discard_stale();
        let Reverse((at, _)) = self.heap.peek()?;
        if *at > now {
            return None;
        }
        let Reverse((_, key)) = self.heap.pop()?;
        self.due.remove(&key);
        Some(key)
    }

    /// Earliest due time of any queued key
    pub fn next_due(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    #[must_use]
    pub fn due_at(&self, key: &ObjectKey) -> Option<Instant> {
        self.due.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.due.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    // heap entries superseded by an earlier enqueue or a removal
    fn discard_stale(&mut self) {
        while let Some(Reverse((at, key))) = self.heap.peek() {
            if self.due.get(key) == Some(at) {
                break;
            }
            self.heap.pop();
        }
    }
}

/// Watch event forwarded to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// Created, updated or seen on the initial list
    Applied { key: ObjectKey, revision: Revision },
    Deleted(ObjectKey),
}

/// Single-task reconcile loop over a `DueQueue`
#[derive(Debug)]
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    backoff: BackoffTracker,
    queue: DueQueue,
    revisions: HashMap<ObjectKey, Revision>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>, backoff: BackoffTracker) -> Self {
        Self {
            reconciler,
            backoff,
            queue: DueQueue::new(),
            revisions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &DueQueue {
        &self.queue
    }

    /// Number of keys whose last seen revision is remembered
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.revisions.len()
    }

    /// Apply a watch event to the queue
    ///
    /// Updates that leave the revision unchanged come from status writes
    /// and do not move the schedule. A recreated resource has a new uid and
    /// always runs.
    pub fn handle_event(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Applied { key, revision } => {
                if self.revisions.get(&key) == Some(&revision) {
                    return;
                }
                self.revisions.insert(key.clone(), revision);
                self.queue.enqueue(key, Instant::now());
            }
            DispatchEvent::Deleted(key) => self.forget(&key),
        }
    }

    fn forget(&mut self, key: &ObjectKey) {
        self.revisions.remove(key);
        self.queue.remove(key);
        self.backoff.reset(key);
    }

    /// Reconcile every key due now, returning how many ran
    pub async fn run_once(&mut self) -> usize {
        let now = Instant::now();
        let mut processed = 0;
        while let Some(key) = self.queue.pop_due(now) {
            self.dispatch(key).await;
            processed += 1;
        }
        processed
    }

    async fn dispatch(&mut self, key: ObjectKey) {
        match self.reconciler.reconcile(&key).await {
            Ok(outcome) if outcome.record_missing => {
                debug!(resource = %key, "dispatch.record_gone");
                self.forget(&key);
            }
            Ok(outcome) => {
                self.backoff.reset(&key);
                if let Some(after) = outcome.requeue_after {
                    observability::metrics::increment_requeues_total(
                        TriggerSource::ScanInterval.as_str(),
                    );
                    self.queue.enqueue(key, Instant::now() + after);
                }
            }
            Err(e) => {
                let delay = self.backoff.next_delay(&key);
                warn!(
                    resource = %key,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "dispatch.reconcile_failed"
                );
                observability::metrics::increment_requeues_total(
                    TriggerSource::ErrorBackoff.as_str(),
                );
                self.queue.enqueue(key, Instant::now() + delay);
            }
        }
    }

    /// Process events and due keys until the event channel closes
    pub async fn run(mut self, mut events: mpsc::Receiver<DispatchEvent>) {
        loop {
            self.run_once().await;
            let next_due = self.queue.next_due();

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                () = sleep_until(next_due) => {}
            }
        }
        debug!("dispatch.stopped");
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Run the dispatcher driver until a shutdown signal arrives
pub async fn run_dispatcher(
    repositories: Api<ImageRepository>,
    reconciler: Arc<Reconciler>,
    backoff: BackoffTracker,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    info!("Starting dispatcher...");

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let dispatcher = tokio::spawn(Dispatcher::new(reconciler, backoff).run(rx));

    let mut stream = watcher(repositories, watcher::Config::default().any_semantic())
        .default_backoff()
        .boxed();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
                server_state.is_ready.store(false, Ordering::Relaxed);
                break;
            }
            event = stream.next() => match event {
                Some(Ok(event)) => {
                    for forwarded in dispatch_events(event) {
                        if tx.send(forwarded).await.is_err() {
                            return Err(anyhow!("dispatcher task stopped unexpectedly"));
                        }
                    }
                }
                Some(Err(e)) => warn!(error = %e, "watch.error"),
                None => break,
            }
        }
    }

    drop(tx);
    dispatcher.await?;
    info!("Dispatcher stopped gracefully");
    Ok(())
}

fn dispatch_events(event: watcher::Event<ImageRepository>) -> Vec<DispatchEvent> {
    let applied = |repo: &ImageRepository| DispatchEvent::Applied {
        key: ObjectKey::from_resource(repo),
        revision: Revision::of(repo),
    };
    match event {
        watcher::Event::Apply(repo) | watcher::Event::InitApply(repo) => vec![applied(&repo)],
        watcher::Event::Delete(repo) => vec![DispatchEvent::Deleted(ObjectKey::from_resource(&repo))],
        watcher::Event::Init | watcher::Event::InitDone => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_due_in_time_order() {
        let mut queue = DueQueue::new();
        let now = Instant::now();
        queue.enqueue(key("b"), now + Duration::from_secs(2));
        queue.enqueue(key("a"), now + Duration::from_secs(1));
        queue.enqueue(key("c"), now + Duration::from_secs(3));

        assert_eq!(queue.pop_due(now), None);
        let later = now + Duration::from_secs(2);
        assert_eq!(queue.pop_due(later), Some(key("a")));
        assert_eq!(queue.pop_due(later), Some(key("b")));
        assert_eq!(queue.pop_due(later), None);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_keeps_earliest_due_time() {
        let mut queue = DueQueue::new();
        let now = Instant::now();
        assert!(queue.enqueue(key("a"), now + Duration::from_secs(10)));
        assert!(!queue.enqueue(key("a"), now + Duration::from_secs(20)));
        assert!(queue.enqueue(key("a"), now + Duration::from_secs(5)));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(5)));
        assert_eq!(queue.pop_due(now + Duration::from_secs(30)), Some(key("a")));
        // superseded entry is skipped
        assert_eq!(queue.pop_due(now + Duration::from_secs(30)), None);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_keys_are_not_popped() {
        let mut queue = DueQueue::new();
        let now = Instant::now();
        queue.enqueue(key("a"), now);
        queue.enqueue(key("b"), now + Duration::from_secs(1));
        assert!(queue.remove(&key("a")));

        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(1)));
        assert_eq!(queue.pop_due(now + Duration::from_secs(1)), Some(key("b")));
    }

    #[test]
    fn test_watch_events_map_to_dispatch_events() {
        let mut repo = ImageRepository::new("podinfo", Default::default());
        repo.metadata.namespace = Some("apps".to_string());
        repo.metadata.uid = Some("0b5e7c1a".to_string());
        repo.metadata.generation = Some(4);

        assert_eq!(
            dispatch_events(watcher::Event::InitApply(repo.clone())),
            vec![DispatchEvent::Applied {
                key: ObjectKey::new("apps", "podinfo"),
                revision: Revision::new("0b5e7c1a", 4),
            }]
        );
        assert_eq!(
            dispatch_events(watcher::Event::Delete(repo)),
            vec![DispatchEvent::Deleted(ObjectKey::new("apps", "podinfo"))]
        );
        assert!(dispatch_events(watcher::Event::InitDone).is_empty());
    }
}
