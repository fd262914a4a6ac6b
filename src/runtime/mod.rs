//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: tracing, metrics, probe server, Kubernetes client and reconciler setup
//! - `context`: per-key backoff and schedule state shared by the controller callbacks
//! - `watch_loop`: kube-runtime `Controller` driver (default)
//! - `dispatch`: single-task `DueQueue` driver
//! - `error_policy`: reconciliation and watch error handling

pub mod context;
pub mod dispatch;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
