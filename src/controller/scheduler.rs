//! # Scan Scheduler
//!
//! Decides whether an image repository is due for a scan and how long to wait
//! before checking again. Pure functions only; the caller supplies the clock.

use crate::constants::SCAN_DUE_THRESHOLD_SECS;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Result of a scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDecision {
    /// Scan the repository in this cycle
    pub scan_now: bool,
    /// Delay before the repository should be looked at again
    pub next_check_in: Duration,
}

impl ScanDecision {
    fn scan(interval: Duration) -> Self {
        Self {
            scan_now: true,
            next_check_in: interval,
        }
    }
}

/// Decide whether to scan now.
///
/// Rules, first match wins:
/// 1. never reconciled successfully (no ready transition) -> scan
/// 2. the tag store holds no tags for the repository -> scan
/// 3. less than a second left of the interval -> scan
///
/// Otherwise wait for the remainder of the interval.
///
/// Rule 2 means a repository that genuinely has zero tags is scanned on every
/// cycle, since an empty store cannot be told apart from a store that was reset.
#[must_use]
pub fn decide(
    scan_interval: Duration,
    last_transition_time: Option<DateTime<Utc>>,
    stored_tag_count: usize,
    now: DateTime<Utc>,
) -> ScanDecision {
    let Some(last) = last_transition_time else {
        return ScanDecision::scan(scan_interval);
    };

    if stored_tag_count == 0 {
        return ScanDecision::scan(scan_interval);
    }

    let interval = TimeDelta::from_std(scan_interval).unwrap_or(TimeDelta::MAX);
    let remaining = interval
        .checked_sub(&(now - last))
        .unwrap_or(TimeDelta::MAX);

    if remaining < TimeDelta::seconds(SCAN_DUE_THRESHOLD_SECS) {
        return ScanDecision::scan(scan_interval);
    }

    ScanDecision {
        scan_now: false,
        // remaining is at least one second here, so the conversion cannot fail
        next_check_in: remaining.to_std().unwrap_or(scan_interval),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("duration cannot be empty")]
    Empty,
    #[error("invalid duration '{0}', expected e.g. '30s', '5m', '1h30m'")]
    Format(String),
    #[error("duration '{0}' must be greater than zero")]
    Zero(String),
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$").expect("duration pattern is a valid regex")
});

static DURATION_PART_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h|d)").expect("duration part pattern is a valid regex")
});

/// Parse a scan interval such as `"10m"`, `"90s"` or `"1h30m"`.
///
/// Accepts the output of Go's `time.Duration.String()` for whole units
/// (`"10m0s"`) as well as single-unit strings.
pub fn parse_scan_interval(value: &str) -> Result<Duration, DurationParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let lower = trimmed.to_lowercase();
    if !DURATION_REGEX.is_match(&lower) {
        return Err(DurationParseError::Format(trimmed.to_string()));
    }

    let mut total_millis: u64 = 0;
    for captures in DURATION_PART_REGEX.captures_iter(&lower) {
        let number: u64 = captures["number"]
            .parse()
            .map_err(|_| DurationParseError::Overflow(trimmed.to_string()))?;
        let factor = match &captures["unit"] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(DurationParseError::Format(trimmed.to_string())),
        };
        total_millis = number
            .checked_mul(factor)
            .and_then(|part| total_millis.checked_add(part))
            .ok_or_else(|| DurationParseError::Overflow(trimmed.to_string()))?;
    }

    if total_millis == 0 {
        return Err(DurationParseError::Zero(trimmed.to_string()));
    }

    Ok(Duration::from_millis(total_millis))
}
