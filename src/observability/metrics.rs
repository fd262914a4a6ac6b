//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `image_reflector_reconciliations_total` - Total number of reconciliations
//! - `image_reflector_reconciliation_errors_total` - Reconciliation errors by reason
//! - `image_reflector_reconciliation_duration_seconds` - Duration of reconcile cycles
//! - `image_reflector_scans_total` - Total number of registry scans started
//! - `image_reflector_tags_discovered` - Tags found by the last scan, per repository
//! - `image_reflector_registry_request_duration_seconds` - Duration of tag listing calls
//! - `image_reflector_duration_parsing_errors_total` - Invalid `scanInterval` values
//! - `image_reflector_requeues_total` - Requeues by trigger source

use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "image_reflector_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_reflector_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "image_reflector_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SCANS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "image_reflector_scans_total",
        "Total number of registry scans started",
    )
    .expect("Failed to create SCANS_TOTAL metric - this should never happen")
});

static TAGS_DISCOVERED: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "image_reflector_tags_discovered",
            "Number of tags found by the last successful scan",
        ),
        &["repository"],
    )
    .expect("Failed to create TAGS_DISCOVERED metric - this should never happen")
});

static REGISTRY_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "image_reflector_registry_request_duration_seconds",
            "Duration of registry tag listing in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["registry", "outcome"],
    )
    .expect("Failed to create REGISTRY_REQUEST_DURATION metric - this should never happen")
});

static DURATION_PARSING_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "image_reflector_duration_parsing_errors_total",
        "Total number of duration parsing errors (scanInterval parsing failures)",
    )
    .expect("Failed to create DURATION_PARSING_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "image_reflector_requeues_total",
            "Total number of requeues by trigger source",
        ),
        &["trigger_source"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

fn register<C: Collector + Clone + 'static>(collector: &C) -> Result<()> {
    match REGISTRY.register(Box::new(collector.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Register all metrics with the registry served on `/metrics`
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<()> {
    register(&*RECONCILIATIONS_TOTAL)?;
    register(&*RECONCILIATION_ERRORS_TOTAL)?;
    register(&*RECONCILIATION_DURATION)?;
    register(&*SCANS_TOTAL)?;
    register(&*TAGS_DISCOVERED)?;
    register(&*REGISTRY_REQUEST_DURATION)?;
    register(&*DURATION_PARSING_ERRORS_TOTAL)?;
    register(&*REQUEUES_TOTAL)?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_scans() {
    SCANS_TOTAL.inc();
}

pub fn set_tags_discovered(repository: &str, count: usize) {
    TAGS_DISCOVERED
        .with_label_values(&[repository])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn observe_registry_request_duration(registry: &str, outcome: &str, duration: f64) {
    REGISTRY_REQUEST_DURATION
        .with_label_values(&[registry, outcome])
        .observe(duration);
}

pub fn increment_duration_parsing_errors() {
    DURATION_PARSING_ERRORS_TOTAL.inc();
}

pub fn increment_requeues_total(trigger_source: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger_source]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_labelled_metrics_are_gathered() {
        register_metrics().unwrap();
        increment_reconciliation_errors("registry_timeout");
        set_tags_discovered("ghcr.io/org/metrics-test", 3);
        increment_requeues_total("scan-interval");

        let text = prometheus::TextEncoder::new()
            .encode_to_string(&REGISTRY.gather())
            .unwrap();
        assert!(text.contains(r#"image_reflector_reconciliation_errors_total{reason="registry_timeout"}"#));
        assert!(text.contains("image_reflector_tags_discovered"));
        assert!(text.contains(r#"image_reflector_requeues_total{trigger_source="scan-interval"}"#));
        assert_eq!(
            TAGS_DISCOVERED
                .with_label_values(&["ghcr.io/org/metrics-test"])
                .get(),
            3
        );
    }
}
