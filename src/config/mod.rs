//! # Configuration
//!
//! Controller configuration loaded from the environment.

mod controller;

pub use controller::{ControllerConfig, LogFormat, ReconcileDriver};
