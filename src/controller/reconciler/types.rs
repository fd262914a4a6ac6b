//! # Types
//!
//! Core types for the reconciler.

use crate::constants::{DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_SCAN_TIMEOUT_SECS};
use crate::controller::credentials::CredentialError;
use crate::controller::registry::{ReferenceError, RegistryError, RegistryGateway};
use crate::store::{RecordStore, SecretStore, StoreError, TagStore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to get ImageRepository: {0}")]
    RecordFetch(#[source] StoreError),
    #[error(transparent)]
    InvalidImageReference(#[from] ReferenceError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to store tags: {0}")]
    TagStore(#[source] StoreError),
    #[error("failed to update status: {0}")]
    StatusWriteFailed(#[source] StoreError),
}

impl ReconcilerError {
    /// Short label for metrics and logs
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::RecordFetch(_) => "record_fetch",
            ReconcilerError::InvalidImageReference(_) => "invalid_image_reference",
            ReconcilerError::Credential(_) => "credential",
            ReconcilerError::Registry(RegistryError::Timeout(_)) => "registry_timeout",
            ReconcilerError::Registry(_) => "registry",
            ReconcilerError::TagStore(_) => "tag_store",
            ReconcilerError::StatusWriteFailed(_) => "status_write",
        }
    }
}

/// Why a reconciliation was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Resource created or changed, or first sight after startup
    ResourceChange,
    /// Requeued to scan again once the scan interval elapses
    ScanInterval,
    /// Fibonacci backoff after a failed reconciliation
    ErrorBackoff,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::ResourceChange => "resource-change",
            TriggerSource::ScanInterval => "scan-interval",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// What the driver should do once a cycle finished without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// `None` means wait for the resource to change
    pub requeue_after: Option<Duration>,
    /// The record no longer exists, drivers can drop their state for the key
    pub record_missing: bool,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn done() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            record_missing: false,
        }
    }

    #[must_use]
    pub fn missing() -> Self {
        Self {
            requeue_after: None,
            record_missing: true,
        }
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += chrono::TimeDelta::from_std(by).unwrap_or(chrono::TimeDelta::MAX);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Runs reconcile cycles for `ImageRepository` records
///
/// Holds only shared, read-mostly collaborators; cycles for different keys
/// may run concurrently on the same instance.
pub struct Reconciler {
    pub(crate) records: Arc<dyn RecordStore>,
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) tags: Arc<dyn TagStore>,
    pub(crate) gateway: RegistryGateway,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) scan_timeout: Duration,
    pub(crate) default_scan_interval: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("scan_timeout", &self.scan_timeout)
            .field("default_scan_interval", &self.default_scan_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Reconciler with the system clock and default timings
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        secrets: Arc<dyn SecretStore>,
        tags: Arc<dyn TagStore>,
        gateway: RegistryGateway,
    ) -> Self {
        Self {
            records,
            secrets,
            tags,
            gateway,
            clock: Arc::new(SystemClock),
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECS),
            default_scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deadline for a single tag listing call
    #[must_use]
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Interval used when a record has no valid `scanInterval`
    #[must_use]
    pub fn with_default_scan_interval(mut self, interval: Duration) -> Self {
        self.default_scan_interval = interval;
        self
    }
}
