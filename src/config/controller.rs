//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_START_SECS, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_METRICS_PORT, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_SCAN_TIMEOUT_SECS,
    DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::str::FromStr;
use std::time::Duration;

/// Which loop drives reconcile cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileDriver {
    /// kube-runtime `Controller` with its own requeue queue
    #[default]
    Controller,
    /// In-process `DueQueue` dispatcher fed by a watch stream
    Dispatcher,
}

impl FromStr for ReconcileDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "controller" => Ok(Self::Controller),
            "dispatcher" => Ok(Self::Dispatcher),
            other => Err(format!(
                "unknown reconcile driver '{other}', expected 'controller' or 'dispatcher'"
            )),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Scan interval used when a repository does not set `scanInterval`
    pub default_scan_interval_secs: u64,
    /// Deadline for a single tag listing call
    pub scan_timeout_secs: u64,
    /// First retry delay after a failed reconciliation
    pub backoff_start_secs: u64,
    /// Maximum retry delay after repeated failures
    pub backoff_max_secs: u64,
    /// How long to wait before restarting a failed watch stream
    pub watch_restart_delay_secs: u64,
    /// Limits how many repositories are reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    pub log_format: LogFormat,
    pub driver: ReconcileDriver,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            backoff_start_secs: DEFAULT_BACKOFF_START_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: LogFormat::default(),
            driver: ReconcileDriver::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            default_scan_interval_secs: parse_or(
                &lookup,
                "DEFAULT_SCAN_INTERVAL_SECS",
                defaults.default_scan_interval_secs,
            ),
            scan_timeout_secs: parse_or(&lookup, "SCAN_TIMEOUT_SECS", defaults.scan_timeout_secs),
            backoff_start_secs: parse_or(&lookup, "BACKOFF_START_SECS", defaults.backoff_start_secs),
            backoff_max_secs: parse_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            watch_restart_delay_secs: parse_or(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            max_concurrent_reconciliations: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_format: parse_or(&lookup, "LOG_FORMAT", defaults.log_format),
            driver: parse_or(&lookup, "RECONCILE_DRIVER", defaults.driver),
        }
    }

    /// Get default scan interval duration
    #[must_use]
    pub fn default_scan_interval(&self) -> Duration {
        Duration::from_secs(self.default_scan_interval_secs)
    }

    /// Get scan timeout duration
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
