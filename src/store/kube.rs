//! # Kubernetes Stores
//!
//! `RecordStore` and `SecretStore` backed by the Kubernetes API.

use super::{RecordStore, SecretPayload, SecretStore, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::crd::{ImageRepository, ImageRepositoryStatus, ObjectKey};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::debug;

/// Reads `ImageRepository` resources and patches their status subresource
#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
}

impl KubeRecordStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ImageRepository> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRecordStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordStore for KubeRecordStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ImageRepository>, StoreError> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &ImageRepositoryStatus,
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.api(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?;
        debug!(resource.name = %key.name, resource.namespace = %key.namespace, "status.patched");
        Ok(())
    }
}

/// Reads secrets from the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretPayload>, StoreError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(secrets.get_opt(name).await?.map(SecretPayload::from))
    }
}

impl From<Secret> for SecretPayload {
    fn from(secret: Secret) -> Self {
        let mut data: std::collections::BTreeMap<String, Vec<u8>> = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect();

        // stringData is write-only on the API server but shows up in fixtures
        // and manifests that were never applied
        for (key, value) in secret.string_data.unwrap_or_default() {
            data.entry(key).or_insert_with(|| value.into_bytes());
        }

        Self {
            namespace: secret.metadata.namespace.unwrap_or_else(|| "default".to_string()),
            name: secret.metadata.name.unwrap_or_default(),
            secret_type: secret.type_,
            data,
        }
    }
}
