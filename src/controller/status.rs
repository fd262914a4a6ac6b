//! # Status Tracking
//!
//! Builds the readiness block written to `ImageRepository.status`.
//!
//! The status carries a single `ready` condition. Every write replaces it
//! wholesale, so it always describes the latest cycle and never accumulates
//! history.

use crate::crd::{ConditionStatus, ImageRepository, ReadyCondition, ReadyReason};
use chrono::{DateTime, SecondsFormat, Utc};

/// Copy of `record` with its ready condition replaced
///
/// Also advances `observedGeneration` to the record's generation. Other status
/// fields are carried over untouched.
#[must_use]
pub fn with_readiness(
    record: &ImageRepository,
    status: ConditionStatus,
    reason: ReadyReason,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> ImageRepository {
    let mut updated = record.clone();
    let block = updated.status.get_or_insert_with(Default::default);
    block.ready = Some(ReadyCondition {
        status,
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: now.to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    block.observed_generation = record.metadata.generation.unwrap_or_default();
    updated
}

/// When the ready condition was last written, if ever
///
/// An unparseable timestamp is treated as absent, which makes the scheduler
/// scan straight away.
#[must_use]
pub fn last_transition_time(record: &ImageRepository) -> Option<DateTime<Utc>> {
    let ready = record.status.as_ref()?.ready.as_ref()?;
    DateTime::parse_from_rfc3339(&ready.last_transition_time)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
