//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the `ImageRepository` resource
pub const API_GROUP: &str = "image.toolkit.fluxcd.io";

/// Field manager name used for status patches
pub const FIELD_MANAGER: &str = "image-reflector-controller";

/// Default time between two scans of the same repository (seconds)
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 600;

/// Upper bound on a single tag listing call (seconds)
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;

/// A repository whose next scan is less than this far away is scanned immediately
pub const SCAN_DUE_THRESHOLD_SECS: i64 = 1;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default first retry delay after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_START_SECS: u64 = 5;

/// Default upper bound for the retry delay after repeated failures (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting watch stream after errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default maximum number of repositories reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Docker Hub registry host as it appears in canonical names
pub const DOCKER_HUB_REGISTRY: &str = "index.docker.io";

/// Docker Hub key used by `docker login` / `kubectl create secret docker-registry`
pub const DOCKER_HUB_CONFIG_KEY: &str = "https://index.docker.io/v1/";

/// Page size requested from the registry tag listing endpoint
pub const TAG_LIST_PAGE_SIZE: u32 = 1000;

/// Most tag listing pages followed for one repository
pub const MAX_TAG_LIST_PAGES: usize = 100;

/// Host serving the registry API for Docker Hub
pub const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";
