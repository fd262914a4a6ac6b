//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{ReconcilerError, TriggerSource};
use crate::crd::{ImageRepository, ObjectKey};
use crate::observability;
use crate::runtime::context::{ControllerContext, Revision};
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing repository does not
/// slow down the others.
pub fn handle_reconciliation_error(
    obj: Arc<ImageRepository>,
    error: &ReconcilerError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let key = ObjectKey::from_resource(&obj);

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    let delay = ctx.backoff.next_delay(&key);
    let attempts = ctx.backoff.attempts(&key);
    ctx.gate.record(&key, Revision::of(&obj), Some(delay), tokio::time::Instant::now());

    info!(
        "🔄 Retrying {} with Fibonacci backoff: {}s (error count: {}, trigger source: {})",
        key,
        delay.as_secs(),
        attempts,
        TriggerSource::ErrorBackoff.as_str()
    );

    observability::metrics::increment_requeues_total(TriggerSource::ErrorBackoff.as_str());
    Action::requeue(delay)
}

/// How a watch stream failure was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

impl WatchErrorKind {
    /// Classify from the rendered error
    ///
    /// 404 is checked before 401: a plain-text 404 body surfaces as a
    /// deserialization error that also mentions `WatchFailed`.
    pub fn classify(error: &str) -> Self {
        let is_not_found =
            error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
        if is_not_found {
            return Self::NotFound;
        }
        if error.contains("401") || error.contains("Unauthorized") {
            return Self::Unauthorized;
        }
        if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            return Self::Expired;
        }
        if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            return Self::Throttled;
        }
        Self::Other
    }
}

/// Handle watch stream errors with classification and backoff
///
/// Returns `true` when the error should be passed on to the stream consumer,
/// `false` when it has been absorbed here (logged and slept on) and should
/// be dropped from the stream.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> bool {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorKind::classify(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!(
                "   Check: kubectl auth can-i watch imagerepositories.image.toolkit.fluxcd.io --all-namespaces --as=system:serviceaccount:<namespace>:image-reflector-controller"
            );
            warn!(
                "⏳ Waiting {}s before retrying watch...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            false
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            false
        }
        WatchErrorKind::Throttled => {
            let current = backoff_ms.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms...",
                current
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            false
        }
        WatchErrorKind::NotFound => {
            warn!(
                "ImageRepository not found (404) - normal if the resource was deleted, check the CRD is installed otherwise. Error: {}",
                error_string
            );
            true
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            false
        }
    }
}
