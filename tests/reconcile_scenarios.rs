//! # Reconcile Scenario Tests
//!
//! End-to-end reconcile cycles against in-memory stores and a scripted
//! registry, with the clock under test control.

mod common;

use common::{
    docker_registry_secret, repository, start_time, with_secret_ref, FakeTagLister, Harness,
    ListBehavior,
};
use image_reflector_controller::controller::credentials::CredentialError;
use image_reflector_controller::controller::reconciler::{ReconcilerError, SUSPENDED_MESSAGE};
use image_reflector_controller::controller::registry::RegistryError;
use image_reflector_controller::crd::{ConditionStatus, ObjectKey, ReadyReason};
use image_reflector_controller::store::TagStore;
use std::time::Duration;

const TEN_MINUTES: Duration = Duration::from_secs(600);

#[tokio::test]
async fn test_suspended_repository_is_not_scanned() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let mut repo = repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo");
    repo.spec.suspend = true;
    let key = harness.insert(repo);

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(outcome.requeue_after, None);
    assert_eq!(harness.lister.calls(), 0);
    let ready = harness.record(&key).status.unwrap().ready.unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, ReadyReason::Suspended.as_str());
    assert_eq!(ready.message, SUSPENDED_MESSAGE);
}

#[tokio::test]
async fn test_empty_image_is_an_invalid_reference() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let key = harness.insert(repository("default", "broken", ""));

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::InvalidImageReference(_)));
    assert_eq!(harness.lister.calls(), 0);
    let ready = harness.record(&key).status.unwrap().ready.unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, ReadyReason::InvalidImageReference.as_str());
    assert!(!ready.message.is_empty());
}

#[tokio::test]
async fn test_first_scan_records_tags_and_readiness() {
    let harness = Harness::new(FakeTagLister::returning(&["v1", "v2", "latest"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(outcome.requeue_after, Some(TEN_MINUTES));
    assert_eq!(harness.lister.calls(), 1);

    let status = harness.record(&key).status.unwrap();
    let ready = status.ready.unwrap();
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.reason, ReadyReason::ReconciliationSucceeded.as_str());
    assert_eq!(ready.message, "successful scan, found 3 tags");
    assert_eq!(ready.last_transition_time, "2026-10-19T08:30:00Z");
    assert_eq!(status.canonical_image_name, "ghcr.io/stefanprodan/podinfo");
    assert_eq!(status.last_scan_result.tag_count, 3);
    assert_eq!(status.observed_generation, 1);

    let stored = harness.tags.tags("ghcr.io/stefanprodan/podinfo").await.unwrap();
    assert_eq!(stored, vec!["v1", "v2", "latest"]);
}

#[tokio::test]
async fn test_cycle_before_interval_elapses_only_requeues() {
    let harness = Harness::new(FakeTagLister::returning(&["v1", "v2", "latest"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));
    harness.reconciler.reconcile(&key).await.unwrap();
    let writes = harness.records.status_writes();

    harness.clock.advance(Duration::from_secs(2));
    let outcome = harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(outcome.requeue_after, Some(TEN_MINUTES - Duration::from_secs(2)));
    assert_eq!(harness.lister.calls(), 1);
    assert_eq!(harness.records.status_writes(), writes);
}

#[tokio::test]
async fn test_rescan_once_interval_has_elapsed() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));
    harness.reconciler.reconcile(&key).await.unwrap();

    harness.lister.set_behavior(ListBehavior::Tags(vec!["v1".into(), "v2".into()]));
    harness.clock.advance(TEN_MINUTES);
    let outcome = harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(outcome.requeue_after, Some(TEN_MINUTES));
    assert_eq!(harness.lister.calls(), 2);
    let status = harness.record(&key).status.unwrap();
    assert_eq!(status.last_scan_result.tag_count, 2);
    assert_eq!(status.ready.unwrap().last_transition_time, "2026-10-19T08:40:00Z");
}

#[tokio::test]
async fn test_repository_without_tags_is_scanned_every_cycle() {
    let harness = Harness::new(FakeTagLister::returning(&[]));
    let key = harness.insert(repository("default", "empty", "ghcr.io/org/empty"));

    harness.reconciler.reconcile(&key).await.unwrap();
    harness.clock.advance(Duration::from_secs(5));
    harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(harness.lister.calls(), 2);
    let ready = harness.record(&key).status.unwrap().ready.unwrap();
    assert_eq!(ready.message, "successful scan, found 0 tags");
}

#[tokio::test(start_paused = true)]
async fn test_scan_deadline_exceeded_marks_not_ready() {
    let harness = Harness::new(FakeTagLister::new(ListBehavior::Hang(Duration::from_secs(30))));
    let key = harness.insert(repository("default", "slow", "registry.example.com/team/slow"));

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Registry(RegistryError::Timeout(_))));
    let ready = harness.record(&key).status.unwrap().ready.unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, ReadyReason::ReconciliationFailed.as_str());
    assert!(ready.message.contains("timed out"), "message: {}", ready.message);
    assert!(harness.tags.is_empty());
}

#[tokio::test]
async fn test_registry_failure_is_recorded_and_returned() {
    let harness = Harness::new(FakeTagLister::new(ListBehavior::Unavailable(
        "503 Service Unavailable".to_string(),
    )));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert_eq!(err.reason(), "registry");
    let ready = harness.record(&key).status.unwrap().ready.unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert!(ready.message.contains("503 Service Unavailable"));
}

#[tokio::test]
async fn test_tag_store_failure_is_recorded_and_returned() {
    let harness = Harness::new(FakeTagLister::returning(&["v1", "v2"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));
    harness.tags.set_fail_writes(true);

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::TagStore(_)));
    assert_eq!(err.reason(), "tag_store");
    assert_eq!(harness.lister.calls(), 1);
    assert_eq!(harness.records.status_writes(), 1);

    let status = harness.record(&key).status.unwrap();
    assert_eq!(status.last_scan_result.tag_count, 0);
    let ready = status.ready.unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, ReadyReason::ReconciliationFailed.as_str());
    assert_eq!(
        ready.message,
        "failed to store tags: tag write rejected for ghcr.io/stefanprodan/podinfo"
    );
    assert!(harness
        .tags
        .tags("ghcr.io/stefanprodan/podinfo")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_different_repositories_reconcile_concurrently() {
    let harness = Harness::on_tokio_time(FakeTagLister::new(ListBehavior::Hang(
        Duration::from_secs(5),
    )));
    let podinfo = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));
    let alpine = harness.insert(repository("apps", "alpine", "alpine"));
    let started = tokio::time::Instant::now();

    let (first, second) = tokio::join!(
        harness.reconciler.reconcile(&podinfo),
        harness.reconciler.reconcile(&alpine)
    );

    // both registry calls were in flight at the same time
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(first.unwrap().requeue_after, Some(TEN_MINUTES));
    assert_eq!(second.unwrap().requeue_after, Some(TEN_MINUTES));
    assert_eq!(harness.lister.calls(), 2);
    assert_eq!(harness.records.status_writes(), 2);
    assert_eq!(
        harness.record(&podinfo).status.unwrap().canonical_image_name,
        "ghcr.io/stefanprodan/podinfo"
    );
    assert_eq!(
        harness.record(&alpine).status.unwrap().canonical_image_name,
        "index.docker.io/library/alpine"
    );
}

#[tokio::test]
async fn test_docker_hub_credentials_from_secret() {
    let harness = Harness::new(FakeTagLister::returning(&["3.19", "3.20"]));
    harness.secrets.insert(docker_registry_secret());
    let key = harness.insert(with_secret_ref(
        repository("default", "alpine", "alpine"),
        "docker-registry",
    ));

    harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(
        harness.lister.last_credentials(),
        Some(("fooser".to_string(), "foopass".to_string()))
    );
    assert_eq!(
        harness.lister.last_repository().as_deref(),
        Some("index.docker.io/library/alpine")
    );
    let status = harness.record(&key).status.unwrap();
    assert_eq!(status.canonical_image_name, "index.docker.io/library/alpine");
}

#[tokio::test]
async fn test_anonymous_scan_without_secret_ref() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));

    harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(harness.lister.last_credentials(), None);
}

#[tokio::test]
async fn test_missing_secret_fails_without_scanning() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let key = harness.insert(with_secret_ref(
        repository("default", "alpine", "alpine"),
        "missing",
    ));

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcilerError::Credential(CredentialError::SecretNotFound { .. })
    ));
    assert_eq!(harness.lister.calls(), 0);
    let ready = harness.record(&key).status.unwrap().ready.unwrap();
    assert_eq!(ready.reason, ReadyReason::ReconciliationFailed.as_str());
    assert_eq!(ready.message, "secret default/missing not found");
}

#[tokio::test]
async fn test_secret_without_matching_host_fails() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    harness.secrets.insert(docker_registry_secret());
    let key = harness.insert(with_secret_ref(
        repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"),
        "docker-registry",
    ));

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcilerError::Credential(CredentialError::NotFound { .. })
    ));
    assert_eq!(harness.lister.calls(), 0);
}

#[tokio::test]
async fn test_status_write_failure_is_reported() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));
    harness.records.set_fail_status_writes(true);

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::StatusWriteFailed(_)));
    assert!(harness.record(&key).status.is_none());
}

#[tokio::test]
async fn test_invalid_scan_interval_falls_back_to_default() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let mut repo = repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo");
    repo.spec.scan_interval = Some("every so often".to_string());
    let key = harness.insert(repo);

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();

    assert_eq!(outcome.requeue_after, Some(TEN_MINUTES));
}

#[tokio::test]
async fn test_custom_scan_interval_is_honoured() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));
    let mut repo = repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo");
    repo.spec.scan_interval = Some("1m".to_string());
    let key = harness.insert(repo);

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));

    harness.clock.advance(Duration::from_secs(45));
    let outcome = harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(15)));
}

#[tokio::test]
async fn test_missing_record_is_a_no_op() {
    let harness = Harness::new(FakeTagLister::returning(&["v1"]));

    let outcome = harness
        .reconciler
        .reconcile(&ObjectKey::new("default", "gone"))
        .await
        .unwrap();

    assert_eq!(outcome.requeue_after, None);
    assert!(outcome.record_missing);
    assert_eq!(harness.lister.calls(), 0);
    assert_eq!(harness.records.status_writes(), 0);
}

#[tokio::test]
async fn test_each_cycle_writes_status_at_most_once() {
    let harness = Harness::new(FakeTagLister::returning(&["v1", "v2"]));
    let key = harness.insert(repository("default", "podinfo", "ghcr.io/stefanprodan/podinfo"));

    harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(harness.records.status_writes(), 1);

    harness.clock.set(start_time() + chrono::TimeDelta::minutes(11));
    harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(harness.records.status_writes(), 2);
}
