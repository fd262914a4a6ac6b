//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use image_reflector_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::controller::reconciler::{
    Clock, ReconcileOutcome, Reconciler, ReconcilerError, SystemClock, TriggerSource,
};

pub use crate::controller::registry::{
    HttpRegistryClient, ImageReference, RegistryError, RegistryGateway, TagLister,
};

pub use crate::store::{RecordStore, SecretPayload, SecretStore, StoreError, TagStore};

pub use crate::config::{ControllerConfig, LogFormat, ReconcileDriver};
