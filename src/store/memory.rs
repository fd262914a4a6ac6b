//! # In-Memory Stores
//!
//! `MemoryTagStore` is the tag store used by the controller process. The
//! record and secret stores back tests and embedded use of the reconciler.

use super::{RecordStore, SecretPayload, SecretStore, StoreError, TagStore};
use crate::crd::{ImageRepository, ImageRepositoryStatus, ObjectKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Backend("store lock poisoned".to_string())
}

/// Tags per canonical repository name, held in process memory
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    tags: RwLock<HashMap<String, Vec<String>>>,
    fail_writes: AtomicBool,
}

impl MemoryTagStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of repositories with recorded tags
    pub fn len(&self) -> usize {
        self.tags.read().map(|tags| tags.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all recorded tags
    pub fn clear(&self) {
        if let Ok(mut tags) = self.tags.write() {
            tags.clear();
        }
    }

    /// Make subsequent `set_tags` calls fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn set_tags(&self, repository: &str, tags: Vec<String>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!(
                "tag write rejected for {repository}"
            )));
        }
        self.tags
            .write()
            .map_err(poisoned)?
            .insert(repository.to_string(), tags);
        Ok(())
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tags
            .read()
            .map_err(poisoned)?
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }
}

/// `ImageRepository` records held in process memory
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<ObjectKey, ImageRepository>>,
    status_writes: AtomicUsize,
    fail_status_writes: AtomicBool,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, keyed by its metadata
    pub fn insert(&self, record: ImageRepository) {
        let key = ObjectKey::from_resource(&record);
        if let Ok(mut records) = self.records.write() {
            records.insert(key, record);
        }
    }

    pub fn remove(&self, key: &ObjectKey) -> Option<ImageRepository> {
        self.records.write().ok()?.remove(key)
    }

    /// Current copy of a record
    pub fn record(&self, key: &ObjectKey) -> Option<ImageRepository> {
        self.records.read().ok()?.get(key).cloned()
    }

    /// Number of successful status writes since creation
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Make subsequent status writes fail
    pub fn set_fail_status_writes(&self, fail: bool) {
        self.fail_status_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ImageRepository>, StoreError> {
        Ok(self.records.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &ImageRepositoryStatus,
    ) -> Result<(), StoreError> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!(
                "status write rejected for {key}"
            )));
        }

        let mut records = self.records.write().map_err(poisoned)?;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::Backend(format!("{key} not found")))?;
        record.status = Some(status.clone());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Secrets held in process memory
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<(String, String), SecretPayload>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, secret: SecretPayload) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert((secret.namespace.clone(), secret.name.clone()), secret);
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretPayload>, StoreError> {
        Ok(self
            .secrets
            .read()
            .map_err(poisoned)?
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}
