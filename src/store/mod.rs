//! # Stores
//!
//! Storage seams used by the reconciler.
//!
//! - `RecordStore` - reads `ImageRepository` resources and writes their status
//! - `SecretStore` - reads registry credential secrets
//! - `TagStore` - remembers the tags found by the last scan of each repository
//!
//! Kubernetes-backed implementations live in `kube`, in-memory ones in `memory`.
//! All implementations must be safe to call concurrently for different keys.

use crate::crd::{ImageRepository, ImageRepositoryStatus, ObjectKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod kube;
pub mod memory;

pub use self::kube::{KubeRecordStore, KubeSecretStore};
pub use memory::{MemoryRecordStore, MemorySecretStore, MemoryTagStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] ::kube::Error),
    #[error("{0}")]
    Backend(String),
}

/// Source of `ImageRepository` records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a record by key, `None` if it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<ImageRepository>, StoreError>;

    /// Replace the status of a record
    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &ImageRepositoryStatus,
    ) -> Result<(), StoreError>;
}

/// Source of credential secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get a secret by namespace and name, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretPayload>, StoreError>;
}

/// Tags per canonical repository name
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Replace the tags recorded for a repository
    async fn set_tags(&self, repository: &str, tags: Vec<String>) -> Result<(), StoreError>;

    /// Tags recorded for a repository, empty if the repository is unknown
    async fn tags(&self, repository: &str) -> Result<Vec<String>, StoreError>;
}

/// Opaque secret contents as handed to the credential resolver
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretPayload {
    pub namespace: String,
    pub name: String,
    /// Secret type tag, e.g. `kubernetes.io/dockerconfigjson`
    pub secret_type: Option<String>,
    /// Decoded data entries
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SecretPayload {
    /// `namespace/name` of the secret, used in error messages
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPayload")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("secret_type", &self.secret_type)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}
