//! # Registry Gateway
//!
//! Everything the reconciler needs from a container registry.
//!
//! - `reference` - image reference parsing and canonical names
//! - `client` - Docker Registry HTTP API v2 tag listing
//!
//! [`RegistryGateway`] wraps a [`TagLister`] so every listing call is bounded
//! by a deadline. Dropping the returned future cancels the request in flight.

use crate::constants::DOCKER_HUB_CONFIG_KEY;
use crate::controller::credentials::Authenticator;
use crate::observability::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod client;
pub mod reference;

pub use client::HttpRegistryClient;
pub use reference::{ImageReference, ReferenceError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("timed out listing tags after {0:?}")]
    Timeout(Duration),
    #[error("registry {registry} unavailable: {reason}")]
    Unavailable { registry: String, reason: String },
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Lists the tags of a repository
#[async_trait]
pub trait TagLister: Send + Sync {
    async fn list(
        &self,
        reference: &ImageReference,
        auth: Option<&Authenticator>,
    ) -> Result<Vec<String>, RegistryError>;
}

/// Key under which credentials for a registry are stored in a docker config
///
/// Docker Hub credentials are written by `docker login` under its legacy v1
/// URL, every other registry under its bare host.
#[must_use]
pub fn credential_host(reference: &ImageReference) -> String {
    if reference.is_docker_hub() {
        DOCKER_HUB_CONFIG_KEY.to_string()
    } else {
        reference.registry.clone()
    }
}

#[derive(Clone)]
pub struct RegistryGateway {
    lister: Arc<dyn TagLister>,
}

impl std::fmt::Debug for RegistryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryGateway").finish_non_exhaustive()
    }
}

impl RegistryGateway {
    #[must_use]
    pub fn new(lister: Arc<dyn TagLister>) -> Self {
        Self { lister }
    }

    /// Parse `image` into a reference with the registry made explicit
    pub fn canonicalize(&self, image: &str) -> Result<ImageReference, ReferenceError> {
        ImageReference::parse(image)
    }

    #[must_use]
    pub fn credential_host(&self, reference: &ImageReference) -> String {
        credential_host(reference)
    }

    /// List tags, giving up after `deadline`
    pub async fn list_tags(
        &self,
        reference: &ImageReference,
        auth: Option<&Authenticator>,
        deadline: Duration,
    ) -> Result<Vec<String>, RegistryError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(deadline, self.lister.list(reference, auth)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout(deadline)),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(RegistryError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::observe_registry_request_duration(
            &reference.registry,
            outcome,
            start.elapsed().as_secs_f64(),
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLister(Vec<String>);

    #[async_trait]
    impl TagLister for FixedLister {
        async fn list(
            &self,
            _reference: &ImageReference,
            _auth: Option<&Authenticator>,
        ) -> Result<Vec<String>, RegistryError> {
            Ok(self.0.clone())
        }
    }

    struct HangingLister;

    #[async_trait]
    impl TagLister for HangingLister {
        async fn list(
            &self,
            _reference: &ImageReference,
            _auth: Option<&Authenticator>,
        ) -> Result<Vec<String>, RegistryError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_credential_host() {
        let hub = ImageReference::parse("alpine").unwrap();
        assert_eq!(credential_host(&hub), "https://index.docker.io/v1/");

        let ghcr = ImageReference::parse("ghcr.io/org/app").unwrap();
        assert_eq!(credential_host(&ghcr), "ghcr.io");

        let local = ImageReference::parse("localhost:5000/app").unwrap();
        assert_eq!(credential_host(&local), "localhost:5000");
    }

    #[tokio::test]
    async fn test_list_tags_passes_through() {
        let gateway = RegistryGateway::new(Arc::new(FixedLister(vec!["v1".into(), "v2".into()])));
        let reference = gateway.canonicalize("ghcr.io/org/app").unwrap();
        let tags = gateway
            .list_tags(&reference, None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(tags, vec!["v1".to_string(), "v2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_tags_times_out() {
        let gateway = RegistryGateway::new(Arc::new(HangingLister));
        let reference = gateway.canonicalize("alpine").unwrap();
        let err = gateway
            .list_tags(&reference, None, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Timeout(d) if d == Duration::from_secs(10)));
        assert!(err.to_string().contains("timed out"));
    }
}
