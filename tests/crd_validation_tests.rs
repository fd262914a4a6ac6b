//! # CRD Validation Tests
//!
//! Tests for the `ImageRepository` CRD to catch schema drift early.
//! Sample resources are deserialized the way the API server would hand them
//! to the controller.

use image_reflector_controller::crd::{ConditionStatus, ImageRepository};
use kube::core::CustomResourceExt;

#[test]
fn test_full_resource_deserializes() {
    let yaml = r#"
apiVersion: image.toolkit.fluxcd.io/v1alpha1
kind: ImageRepository
metadata:
  name: podinfo
  namespace: apps
  generation: 3
spec:
  image: ghcr.io/stefanprodan/podinfo
  scanInterval: 5m
  secretRef:
    name: ghcr-pull
  suspend: false
status:
  observedGeneration: 3
  canonicalImageName: ghcr.io/stefanprodan/podinfo
  lastScanResult:
    tagCount: 42
  ready:
    status: "True"
    reason: ReconciliationSucceeded
    message: successful scan, found 42 tags
    lastTransitionTime: "2026-10-19T08:30:00Z"
"#;

    let repo: ImageRepository = serde_yaml::from_str(yaml).expect("Should deserialize full resource");

    assert_eq!(repo.spec.image, "ghcr.io/stefanprodan/podinfo");
    assert_eq!(repo.spec.scan_interval.as_deref(), Some("5m"));
    assert_eq!(repo.spec.secret_ref.as_ref().map(|s| s.name.as_str()), Some("ghcr-pull"));
    assert!(!repo.spec.suspend);

    let status = repo.status.expect("status should be present");
    assert_eq!(status.observed_generation, 3);
    assert_eq!(status.last_scan_result.tag_count, 42);
    let ready = status.ready.expect("ready condition should be present");
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.reason, "ReconciliationSucceeded");
}

#[test]
fn test_minimal_resource_uses_defaults() {
    let yaml = r#"
apiVersion: image.toolkit.fluxcd.io/v1alpha1
kind: ImageRepository
metadata:
  name: alpine
spec:
  image: alpine
"#;

    let repo: ImageRepository = serde_yaml::from_str(yaml).expect("Should deserialize minimal resource");

    assert_eq!(repo.spec.scan_interval, None);
    assert_eq!(repo.spec.secret_ref, None);
    assert!(!repo.spec.suspend);
    assert!(repo.status.is_none());
}

#[test]
fn test_legacy_field_names_are_accepted() {
    let yaml = r#"
apiVersion: image.toolkit.fluxcd.io/v1alpha1
kind: ImageRepository
metadata:
  name: legacy
spec:
  image: registry.example.com/team/app
  credentialRef:
    name: regcred
  suspended: true
"#;

    let repo: ImageRepository = serde_yaml::from_str(yaml).expect("Should accept legacy field names");

    assert_eq!(repo.spec.secret_ref.map(|s| s.name), Some("regcred".to_string()));
    assert!(repo.spec.suspend);
}

#[test]
fn test_spec_serializes_camel_case_and_skips_unset_fields() {
    let repo: ImageRepository = serde_yaml::from_str(
        r#"
apiVersion: image.toolkit.fluxcd.io/v1alpha1
kind: ImageRepository
metadata:
  name: podinfo
spec:
  image: ghcr.io/stefanprodan/podinfo
  scanInterval: 1h
"#,
    )
    .unwrap();

    let json = serde_json::to_value(&repo.spec).unwrap();
    assert_eq!(json["scanInterval"], "1h");
    assert!(json.get("secretRef").is_none());
    assert_eq!(json["suspend"], false);
}

#[test]
fn test_generated_crd_metadata() {
    let crd = ImageRepository::crd();

    assert_eq!(crd.metadata.name.as_deref(), Some("imagerepositories.image.toolkit.fluxcd.io"));
    assert_eq!(crd.spec.group, "image.toolkit.fluxcd.io");
    assert_eq!(crd.spec.scope, "Namespaced");
    assert_eq!(crd.spec.names.kind, "ImageRepository");
    assert_eq!(crd.spec.names.short_names, Some(vec!["imgrepo".to_string()]));

    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    assert!(version.subresources.as_ref().and_then(|s| s.status.as_ref()).is_some());

    let columns: Vec<&str> = version
        .additional_printer_columns
        .as_ref()
        .map(|cols| cols.iter().map(|c| c.name.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(columns, vec!["Ready", "Last scan", "Tags"]);
}
