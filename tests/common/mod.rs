//! Common test utilities for reconciler integration tests
//!
//! Provides a reconciler wired to in-memory stores, a scripted tag lister and
//! a manual clock.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use image_reflector_controller::controller::credentials::Authenticator;
use image_reflector_controller::controller::reconciler::{Clock, ManualClock, Reconciler};
use image_reflector_controller::controller::registry::{
    ImageReference, RegistryError, RegistryGateway, TagLister,
};
use image_reflector_controller::crd::{
    ImageRepository, ImageRepositorySpec, ObjectKey, SecretReference,
};
use image_reflector_controller::store::{
    MemoryRecordStore, MemorySecretStore, MemoryTagStore, SecretPayload,
};
use k8s_openapi::api::core::v1::Secret;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so it runs a single time per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // another test may already have installed it
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// What the fake registry does when asked for tags
#[derive(Debug, Clone)]
pub enum ListBehavior {
    Tags(Vec<String>),
    Unavailable(String),
    /// Sleep before answering, to trip the scan deadline
    Hang(Duration),
}

/// Tag lister that follows a script and records how it was called
#[derive(Debug)]
pub struct FakeTagLister {
    behavior: Mutex<ListBehavior>,
    calls: AtomicUsize,
    last_credentials: Mutex<Option<(String, String)>>,
    last_repository: Mutex<Option<String>>,
}

impl FakeTagLister {
    pub fn new(behavior: ListBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            last_credentials: Mutex::new(None),
            last_repository: Mutex::new(None),
        }
    }

    pub fn returning(tags: &[&str]) -> Self {
        Self::new(ListBehavior::Tags(tags.iter().map(|t| (*t).to_string()).collect()))
    }

    pub fn set_behavior(&self, behavior: ListBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_credentials(&self) -> Option<(String, String)> {
        self.last_credentials.lock().unwrap().clone()
    }

    pub fn last_repository(&self) -> Option<String> {
        self.last_repository.lock().unwrap().clone()
    }
}

#[async_trait]
impl TagLister for FakeTagLister {
    async fn list(
        &self,
        reference: &ImageReference,
        auth: Option<&Authenticator>,
    ) -> Result<Vec<String>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_repository.lock().unwrap() = Some(reference.canonical_name());
        *self.last_credentials.lock().unwrap() = auth.map(|a| {
            let (user, pass) = a.credentials();
            (user.to_string(), pass.to_string())
        });

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ListBehavior::Tags(tags) => Ok(tags),
            ListBehavior::Unavailable(reason) => Err(RegistryError::Unavailable {
                registry: reference.registry.clone(),
                reason,
            }),
            ListBehavior::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            }
        }
    }
}

/// 2026-10-19T08:30:00Z
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
}

pub fn repository(namespace: &str, name: &str, image: &str) -> ImageRepository {
    let mut repo = ImageRepository::new(
        name,
        ImageRepositorySpec {
            image: image.to_string(),
            ..Default::default()
        },
    );
    repo.metadata.namespace = Some(namespace.to_string());
    repo.metadata.uid = Some(uid(name));
    repo.metadata.generation = Some(1);
    repo
}

/// Uid given to the first incarnation of a repository named `name`
pub fn uid(name: &str) -> String {
    format!("uid-{name}")
}

pub fn with_secret_ref(mut repo: ImageRepository, secret: &str) -> ImageRepository {
    repo.spec.secret_ref = Some(SecretReference {
        name: secret.to_string(),
    });
    repo
}

/// The `docker-registry` dockerconfigjson secret from `tests/fixtures`
pub fn docker_registry_secret() -> SecretPayload {
    let raw = include_str!("../fixtures/docker-registry-secret.json");
    let secret: Secret = serde_json::from_str(raw).unwrap();
    SecretPayload::from(secret)
}

/// Wall clock that follows tokio's (possibly paused) time
#[derive(Debug)]
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::TimeDelta::from_std(self.start.elapsed()).unwrap()
    }
}

/// Reconciler over in-memory stores with handles to every collaborator
pub struct Harness {
    pub records: Arc<MemoryRecordStore>,
    pub secrets: Arc<MemorySecretStore>,
    pub tags: Arc<MemoryTagStore>,
    pub lister: Arc<FakeTagLister>,
    /// Drives the reconciler unless built with `on_tokio_time`
    pub clock: Arc<ManualClock>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(lister: FakeTagLister) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        Self::build(lister, clock.clone(), clock)
    }

    /// Harness whose reconciler reads time from tokio, for paused-time tests
    pub fn on_tokio_time(lister: FakeTagLister) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        Self::build(lister, clock, Arc::new(TokioClock::new(start_time())))
    }

    fn build(lister: FakeTagLister, manual: Arc<ManualClock>, clock: Arc<dyn Clock>) -> Self {
        let records = Arc::new(MemoryRecordStore::new());
        let secrets = Arc::new(MemorySecretStore::new());
        let tags = Arc::new(MemoryTagStore::new());
        let lister = Arc::new(lister);

        let reconciler = Reconciler::new(
            records.clone(),
            secrets.clone(),
            tags.clone(),
            RegistryGateway::new(lister.clone()),
        )
        .with_clock(clock);

        Self {
            records,
            secrets,
            tags,
            lister,
            clock: manual,
            reconciler: Arc::new(reconciler),
        }
    }

    pub fn insert(&self, repo: ImageRepository) -> ObjectKey {
        let key = ObjectKey::from_resource(&repo);
        self.records.insert(repo);
        key
    }

    pub fn record(&self, key: &ObjectKey) -> ImageRepository {
        self.records.record(key).unwrap()
    }
}
