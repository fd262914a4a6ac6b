//! # Credential Resolution
//!
//! Turns a registry credential secret into an [`Authenticator`] for one host.
//!
//! Supported secret types:
//! - `kubernetes.io/dockerconfigjson` (`kubectl create secret docker-registry`)
//! - `kubernetes.io/dockercfg` (legacy `~/.dockercfg` layout)
//!
//! Credentials live for a single reconcile cycle and are zeroed on drop.

use crate::store::{SecretPayload, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("auth for \"{host}\" not found in secret {secret}")]
    NotFound { host: String, secret: String },
    #[error("unknown secret type \"{secret_type}\" in secret {secret}")]
    UnsupportedType { secret_type: String, secret: String },
    #[error("secret {secret} is malformed: {reason}")]
    Malformed { secret: String, reason: String },
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("failed to get secret {namespace}/{name}: {source}")]
    SecretFetch {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },
}

/// Username and password for a registry
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Registry authentication, one variant per supported credential kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticator {
    Basic(BasicCredentials),
}

impl Authenticator {
    /// `(username, password)` to present to the registry
    #[must_use]
    pub fn credentials(&self) -> (&str, &str) {
        match self {
            Authenticator::Basic(basic) => (&basic.username, &basic.password),
        }
    }
}

/// Secret types the resolver understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrySecretKind {
    DockerConfigJson,
    DockerCfg,
}

impl RegistrySecretKind {
    #[must_use]
    pub fn from_type(secret_type: &str) -> Option<Self> {
        match secret_type {
            "kubernetes.io/dockerconfigjson" => Some(Self::DockerConfigJson),
            "kubernetes.io/dockercfg" => Some(Self::DockerCfg),
            _ => None,
        }
    }

    /// Data key holding the config document
    #[must_use]
    pub fn data_key(&self) -> &'static str {
        match self {
            Self::DockerConfigJson => ".dockerconfigjson",
            Self::DockerCfg => ".dockercfg",
        }
    }
}

#[derive(Deserialize)]
struct DockerConfigJson {
    #[serde(default, alias = "Auths")]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Default, Deserialize, Zeroize, ZeroizeOnDrop)]
struct AuthEntry {
    #[serde(default, alias = "Username")]
    username: Option<String>,
    #[serde(default, alias = "Password")]
    password: Option<String>,
    /// base64 of `username:password`
    #[serde(default, alias = "Auth")]
    auth: Option<String>,
}

/// Resolve the credentials for `registry_host` from a secret.
///
/// The host must match a key of the config document exactly.
pub fn resolve(secret: &SecretPayload, registry_host: &str) -> Result<Authenticator, CredentialError> {
    let secret_type = secret.secret_type.as_deref().unwrap_or_default();
    let kind =
        RegistrySecretKind::from_type(secret_type).ok_or_else(|| CredentialError::UnsupportedType {
            secret_type: secret_type.to_string(),
            secret: secret.identity(),
        })?;

    let malformed = |reason: String| CredentialError::Malformed {
        secret: secret.identity(),
        reason,
    };

    let document = secret
        .data
        .get(kind.data_key())
        .ok_or_else(|| malformed(format!("missing data key \"{}\"", kind.data_key())))?;

    let mut auths = match kind {
        RegistrySecretKind::DockerConfigJson => {
            serde_json::from_slice::<DockerConfigJson>(document)
                .map_err(|e| malformed(e.to_string()))?
                .auths
        }
        RegistrySecretKind::DockerCfg => serde_json::from_slice::<HashMap<String, AuthEntry>>(document)
            .map_err(|e| malformed(e.to_string()))?,
    };

    let entry = auths
        .remove(registry_host)
        .ok_or_else(|| CredentialError::NotFound {
            host: registry_host.to_string(),
            secret: secret.identity(),
        })?;

    basic_from_entry(&entry)
        .map(Authenticator::Basic)
        .map_err(|reason| malformed(format!("entry for \"{registry_host}\": {reason}")))
}

fn basic_from_entry(entry: &AuthEntry) -> Result<BasicCredentials, String> {
    if let Some(username) = entry.username.as_deref().filter(|u| !u.is_empty()) {
        return Ok(BasicCredentials::new(
            username,
            entry.password.as_deref().unwrap_or_default(),
        ));
    }

    let encoded = entry
        .auth
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| "neither username nor auth is set".to_string())?;
    let mut decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("auth is not valid base64: {e}"))?;
    let result = std::str::from_utf8(&decoded)
        .map_err(|e| format!("auth is not valid UTF-8: {e}"))
        .and_then(|pair| {
            pair.split_once(':')
                .map(|(user, pass)| BasicCredentials::new(user, pass))
                .ok_or_else(|| "auth is not of the form username:password".to_string())
        });
    decoded.zeroize();
    result
}
