//! # ImageRepository Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};

/// ImageRepository Custom Resource Definition
///
/// Describes a container image repository whose tags are scanned periodically.
///
/// # Example
///
/// ```yaml
/// apiVersion: image.toolkit.fluxcd.io/v1alpha1
/// kind: ImageRepository
/// metadata:
///   name: podinfo
///   namespace: default
/// spec:
///   image: ghcr.io/stefanprodan/podinfo
///   scanInterval: 5m
///   secretRef:
///     name: regcred
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ImageRepository",
    group = "image.toolkit.fluxcd.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ImageRepositoryStatus",
    shortname = "imgrepo",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.ready.status"}, {"name":"Last scan", "type":"string", "jsonPath":".status.ready.lastTransitionTime"}, {"name":"Tags", "type":"integer", "jsonPath":".status.lastScanResult.tagCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepositorySpec {
    /// Image is the name of the image repository, e.g. `alpine` or `ghcr.io/org/app`
    pub image: String,
    /// Minimum time to wait between scans of the repository
    /// Format: duration string (e.g., "30s", "5m", "1h30m")
    /// Default: 10 minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<String>,
    /// Secret containing registry credentials, in the namespace of the ImageRepository
    /// The secret should be created with `kubectl create secret docker-registry`
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "credentialRef")]
    pub secret_ref: Option<SecretReference>,
    /// Suspend subsequent scans. Does not apply to a scan already in progress
    /// Default: false
    #[serde(default, alias = "suspended")]
    pub suspend: bool,
}

/// Reference to a secret in the same namespace as the referencing resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SecretReference {
    pub name: String,
}
