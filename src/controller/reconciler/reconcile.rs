//! # Reconciliation Logic
//!
//! One reconcile cycle for an `ImageRepository`.
//!
//! Branches are checked in order and the first one that applies ends the cycle:
//!
//! 1. Record gone: nothing to do
//! 2. Suspended: Ready=False/Suspended
//! 3. Image does not parse: Ready=False/InvalidImageReference
//! 4. Scan not due yet: requeue for the remaining time
//! 5. Scan: resolve credentials, list tags, store them, Ready=True
//!
//! Each cycle writes the status at most once. Failures are recorded in the
//! status and returned, nothing is retried here.

use crate::controller::credentials::{self, Authenticator, CredentialError};
use crate::controller::registry::ImageReference;
use crate::controller::reconciler::types::{ReconcileOutcome, Reconciler, ReconcilerError};
use crate::controller::scheduler::{self, parse_scan_interval};
use crate::controller::status::{last_transition_time, with_readiness};
use crate::crd::{ConditionStatus, ImageRepository, ObjectKey, ReadyReason};
use crate::observability::metrics;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

pub const SUSPENDED_MESSAGE: &str = "ImageRepository is suspended, skipping reconciliation";

impl Reconciler {
    /// Run one reconcile cycle for `key`
    ///
    /// Returns when the record should be looked at again, or an error after
    /// the failure has been recorded in the status.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = info_span!(
            "reconcile",
            resource.name = %key.name,
            resource.namespace = %key.namespace,
            resource.kind = "ImageRepository"
        );

        async move {
            let start = Instant::now();
            metrics::increment_reconciliations();

            let result = self.run_cycle(key).await;

            metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
            match &result {
                Ok(outcome) => debug!(requeue_after = ?outcome.requeue_after, "reconcile.done"),
                Err(e) => {
                    metrics::increment_reconciliation_errors(e.reason());
                    warn!(error = %e, reason = e.reason(), "reconcile.failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_cycle(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcilerError> {
        let Some(record) = self
            .records
            .get(key)
            .await
            .map_err(ReconcilerError::RecordFetch)?
        else {
            debug!("reconcile.not_found");
            return Ok(ReconcileOutcome::missing());
        };
        let now = self.clock.now();

        if record.spec.suspend {
            info!("{SUSPENDED_MESSAGE}");
            let updated = with_readiness(
                &record,
                ConditionStatus::False,
                ReadyReason::Suspended,
                SUSPENDED_MESSAGE,
                now,
            );
            self.write_status(key, &updated).await?;
            return Ok(ReconcileOutcome::done());
        }

        let reference = match self.gateway.canonicalize(&record.spec.image) {
            Ok(reference) => reference,
            Err(e) => {
                warn!(image = %record.spec.image, error = %e, "reconcile.invalid_image");
                let updated = with_readiness(
                    &record,
                    ConditionStatus::False,
                    ReadyReason::InvalidImageReference,
                    e.to_string(),
                    now,
                );
                return self.fail(key, &updated, e.into()).await;
            }
        };
        let canonical = reference.canonical_name();
        let interval = self.scan_interval(&record);

        let stored_tags = match self.tags.tags(&canonical).await {
            Ok(tags) => tags.len(),
            Err(e) => {
                // unreadable counts as empty, which forces a scan
                warn!(image = %canonical, error = %e, "tag_store.read_failed");
                0
            }
        };

        let decision = scheduler::decide(interval, last_transition_time(&record), stored_tags, now);
        if !decision.scan_now {
            let known_name = record
                .status
                .as_ref()
                .map(|s| s.canonical_image_name.as_str())
                .unwrap_or_default();
            if known_name != canonical {
                let mut status = record.status.clone().unwrap_or_default();
                status.canonical_image_name.clone_from(&canonical);
                self.records
                    .update_status(key, &status)
                    .await
                    .map_err(ReconcilerError::StatusWriteFailed)?;
            }
            debug!(
                image = %canonical,
                next_check_in = ?decision.next_check_in,
                "reconcile.scan_not_due"
            );
            return Ok(ReconcileOutcome::requeue(decision.next_check_in));
        }

        let mut scanned = record.clone();
        scanned
            .status
            .get_or_insert_with(Default::default)
            .canonical_image_name
            .clone_from(&canonical);

        match self.scan(&key.namespace, &record, &reference).await {
            Ok(tags) => {
                let count = tags.len();
                if let Some(status) = scanned.status.as_mut() {
                    status.last_scan_result.tag_count = u32::try_from(count).unwrap_or(u32::MAX);
                }
                let updated = with_readiness(
                    &scanned,
                    ConditionStatus::True,
                    ReadyReason::ReconciliationSucceeded,
                    format!("successful scan, found {count} tags"),
                    now,
                );
                self.write_status(key, &updated).await?;
                metrics::set_tags_discovered(&canonical, count);
                info!(image = %canonical, tags = count, "reconcile.scanned");
                Ok(ReconcileOutcome::requeue(decision.next_check_in))
            }
            Err(e) => {
                let updated = with_readiness(
                    &scanned,
                    ConditionStatus::False,
                    ReadyReason::ReconciliationFailed,
                    e.to_string(),
                    now,
                );
                self.fail(key, &updated, e).await
            }
        }
    }

    /// Resolve credentials, list tags and record them in the tag store
    async fn scan(
        &self,
        namespace: &str,
        record: &ImageRepository,
        reference: &ImageReference,
    ) -> Result<Vec<String>, ReconcilerError> {
        let auth = match &record.spec.secret_ref {
            Some(secret_ref) => Some(
                self.authenticator(namespace, &secret_ref.name, reference)
                    .await?,
            ),
            None => None,
        };

        metrics::increment_scans();
        let tags = self
            .gateway
            .list_tags(reference, auth.as_ref(), self.scan_timeout)
            .await?;

        self.tags
            .set_tags(&reference.canonical_name(), tags.clone())
            .await
            .map_err(ReconcilerError::TagStore)?;
        Ok(tags)
    }

    async fn authenticator(
        &self,
        namespace: &str,
        name: &str,
        reference: &ImageReference,
    ) -> Result<Authenticator, CredentialError> {
        let secret = self
            .secrets
            .get(namespace, name)
            .await
            .map_err(|source| CredentialError::SecretFetch {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?
            .ok_or_else(|| CredentialError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        credentials::resolve(&secret, &self.gateway.credential_host(reference))
    }

    /// Effective scan interval, the default when unset or invalid
    pub(crate) fn scan_interval(&self, record: &ImageRepository) -> Duration {
        let Some(raw) = record.spec.scan_interval.as_deref() else {
            return self.default_scan_interval;
        };
        match parse_scan_interval(raw) {
            Ok(interval) => interval,
            Err(e) => {
                warn!(
                    scan_interval = raw,
                    error = %e,
                    default = ?self.default_scan_interval,
                    "Invalid scanInterval, using default"
                );
                metrics::increment_duration_parsing_errors();
                self.default_scan_interval
            }
        }
    }

    async fn write_status(
        &self,
        key: &ObjectKey,
        updated: &ImageRepository,
    ) -> Result<(), ReconcilerError> {
        let status = updated.status.clone().unwrap_or_default();
        self.records
            .update_status(key, &status)
            .await
            .map_err(ReconcilerError::StatusWriteFailed)
    }

    /// Record a failure in the status, then hand it back to the driver
    async fn fail(
        &self,
        key: &ObjectKey,
        updated: &ImageRepository,
        error: ReconcilerError,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if let Err(write_error) = self.write_status(key, updated).await {
            error!(error = %error, "reconcile.failure_not_recorded");
            return Err(write_error);
        }
        Err(error)
    }
}
