//! Image Reflector Controller Library
//!
//! This library provides the core functionality for the Image Reflector Controller:
//! the `ImageRepository` resource, the reconcile cycle that scans registries for
//! tags, and the runtime that drives it.
//!
//! ## Quick Start
//!
//! ```rust
//! use image_reflector_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
