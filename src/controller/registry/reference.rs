//! # Image References
//!
//! Parses `[registry/]repository[:tag][@digest]` and makes the implied parts
//! explicit. `alpine` becomes `index.docker.io/library/alpine`.

use crate::constants::DOCKER_HUB_REGISTRY;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("could not parse reference: image name is empty")]
    Empty,
    #[error("could not parse reference {image}: invalid registry \"{registry}\"")]
    InvalidRegistry { image: String, registry: String },
    #[error(
        "could not parse reference {image}: repository \"{repository}\" can only contain the characters `abcdefghijklmnopqrstuvwxyz0123456789_-./`"
    )]
    InvalidRepository { image: String, repository: String },
    #[error("could not parse reference {image}: invalid tag \"{tag}\"")]
    InvalidTag { image: String, tag: String },
    #[error("could not parse reference {image}: invalid digest \"{digest}\"")]
    InvalidDigest { image: String, digest: String },
}

static REGISTRY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?$",
    )
    .expect("registry pattern is a valid regex")
});

static COMPONENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("component pattern is a valid regex")
});

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is a valid regex")
});

static DIGEST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$")
        .expect("digest pattern is a valid regex")
});

/// A parsed image reference with registry and repository made explicit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, with port if one was given
    pub registry: String,
    /// Repository path within the registry
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference.
    ///
    /// The first path component is taken as the registry when it contains a
    /// `.` or `:` or is `localhost`. Anything else lives on Docker Hub.
    pub fn parse(image: &str) -> Result<Self, ReferenceError> {
        let input = image.trim();
        if input.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) => {
                if !DIGEST_REGEX.is_match(digest) {
                    return Err(ReferenceError::InvalidDigest {
                        image: input.to_string(),
                        digest: digest.to_string(),
                    });
                }
                (rest, Some(digest.to_string()))
            }
            None => (input, None),
        };

        // a colon after the last slash starts the tag, earlier ones belong to a port
        let (name, tag) = match rest.rfind(':') {
            Some(idx) if !rest[idx + 1..].contains('/') => {
                let tag = &rest[idx + 1..];
                if !TAG_REGEX.is_match(tag) {
                    return Err(ReferenceError::InvalidTag {
                        image: input.to_string(),
                        tag: tag.to_string(),
                    });
                }
                (&rest[..idx], Some(tag.to_string()))
            }
            _ => (rest, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first, remainder)
            }
            _ => (DOCKER_HUB_REGISTRY, name),
        };

        if !REGISTRY_REGEX.is_match(registry) {
            return Err(ReferenceError::InvalidRegistry {
                image: input.to_string(),
                registry: registry.to_string(),
            });
        }

        let registry = if registry == "docker.io" {
            DOCKER_HUB_REGISTRY
        } else {
            registry
        };

        if repository.is_empty() || !repository.split('/').all(|c| COMPONENT_REGEX.is_match(c)) {
            return Err(ReferenceError::InvalidRepository {
                image: input.to_string(),
                repository: repository.to_string(),
            });
        }

        let repository = if registry == DOCKER_HUB_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository.to_string()
        };

        Ok(Self {
            registry: registry.to_string(),
            repository,
            tag,
            digest,
        })
    }

    /// `registry/repository`, used as the scan target and the tag store key
    #[must_use]
    pub fn canonical_name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    #[must_use]
    pub fn is_docker_hub(&self) -> bool {
        self.registry == DOCKER_HUB_REGISTRY
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
