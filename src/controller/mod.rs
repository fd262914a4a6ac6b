//! # Controller
//!
//! Core controller modules for the Image Reflector Controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `credentials`: Registry credentials from docker config secrets
//! - `reconciler`: Core reconciliation logic
//! - `registry`: Image references and tag listing
//! - `scheduler`: Scan scheduling decisions
//! - `server`: HTTP server for metrics and health checks
//! - `status`: Ready condition bookkeeping

pub mod backoff;
pub mod credentials;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod status;
