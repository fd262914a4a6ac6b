//! # Reconciler
//!
//! Core reconciliation logic for `ImageRepository` resources.
//!
//! The reconciler:
//! - Canonicalizes the image name of the repository
//! - Decides whether a scan is due
//! - Lists tags from the registry, with credentials from a secret if referenced
//! - Records the tags and updates the resource status
//!
//! It does not schedule anything itself. The driver (kube-runtime controller
//! or dispatcher) calls [`Reconciler::reconcile`] and requeues the key with
//! the returned delay.

pub mod reconcile;
pub mod types;

pub use reconcile::SUSPENDED_MESSAGE;
pub use types::{
    Clock, ManualClock, ReconcileOutcome, Reconciler, ReconcilerError, SystemClock, TriggerSource,
};
