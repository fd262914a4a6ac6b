//! # Custom Resource Definitions
//!
//! CRD types for the Image Reflector Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `ImageRepository` specification
//! - `status.rs` - Status types: ready condition and last scan result

mod spec;
mod status;

pub use spec::{ImageRepository, ImageRepositorySpec, SecretReference};
pub use status::{ConditionStatus, ImageRepositoryStatus, ReadyCondition, ReadyReason, ScanResult};

use std::fmt;

/// Namespace-qualified identity of an `ImageRepository`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a resource as seen by the watcher
    ///
    /// Cluster-scoped lookups never happen for namespaced kinds, so a missing
    /// namespace maps to `default` the same way the API server does.
    #[must_use]
    pub fn from_resource(repo: &ImageRepository) -> Self {
        Self::new(
            repo.metadata.namespace.as_deref().unwrap_or("default"),
            repo.metadata.name.as_deref().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
