//! # ImageRepository Status
//!
//! Status types for tracking scan results and readiness.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the ImageRepository resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepositoryStatus {
    /// Outcome of the most recent reconciliation
    /// Replaced on every write, so it only ever describes the latest cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<ReadyCondition>,
    /// Last reconciled generation
    #[serde(default)]
    pub observed_generation: i64,
    /// Name of the image repository with all the implied bits made explicit,
    /// e.g. `index.docker.io/library/alpine` rather than `alpine`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canonical_image_name: String,
    /// Result of the last successful scan
    #[serde(default)]
    pub last_scan_result: ScanResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub tag_count: u32,
}

/// Readiness of the resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadyCondition {
    pub status: ConditionStatus,
    /// Machine-readable reason, one of the `ReadyReason` values
    pub reason: String,
    pub message: String,
    /// RFC3339 timestamp of when this condition was written
    pub last_transition_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason codes recorded on the ready condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyReason {
    /// `spec.suspend` is set, scans are skipped
    Suspended,
    /// `spec.image` could not be parsed
    InvalidImageReference,
    /// Credentials, registry or tag store failed during a scan
    ReconciliationFailed,
    ReconciliationSucceeded,
}

impl ReadyReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyReason::Suspended => "Suspended",
            ReadyReason::InvalidImageReference => "InvalidImageReference",
            ReadyReason::ReconciliationFailed => "ReconciliationFailed",
            ReadyReason::ReconciliationSucceeded => "ReconciliationSucceeded",
        }
    }
}

impl fmt::Display for ReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_with_camel_case_fields() {
        let status = ImageRepositoryStatus {
            ready: Some(ReadyCondition {
                status: ConditionStatus::True,
                reason: ReadyReason::ReconciliationSucceeded.to_string(),
                message: "successful scan, found 3 tags".to_string(),
                last_transition_time: "2026-10-19T10:00:00+00:00".to_string(),
            }),
            observed_generation: 2,
            canonical_image_name: "index.docker.io/library/alpine".to_string(),
            last_scan_result: ScanResult { tag_count: 3 },
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["ready"]["status"], "True");
        assert_eq!(json["ready"]["reason"], "ReconciliationSucceeded");
        assert_eq!(json["ready"]["lastTransitionTime"], "2026-10-19T10:00:00+00:00");
        assert_eq!(json["observedGeneration"], 2);
        assert_eq!(json["canonicalImageName"], "index.docker.io/library/alpine");
        assert_eq!(json["lastScanResult"]["tagCount"], 3);
    }

    #[test]
    fn test_empty_status_deserializes() {
        let status: ImageRepositoryStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status, ImageRepositoryStatus::default());
        assert!(status.ready.is_none());
    }
}
