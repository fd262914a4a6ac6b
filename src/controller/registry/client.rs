//! Docker Registry HTTP API v2 Client
//!
//! Lists repository tags with `GET /v2/<name>/tags/list`.
//!
//! This implementation:
//! - Uses plain HTTP for `localhost` and loopback registries, HTTPS otherwise
//! - Follows `Link: <...>; rel="next"` pagination, up to a page limit and
//!   stopping at a link back to a page already read
//! - Answers `401` challenges with a bearer token from the challenge realm,
//!   or with basic credentials when the registry asks for them
//!
//! References:
//! - [Listing image tags](https://distribution.github.io/distribution/spec/api/#listing-image-tags)
//! - [Token authentication](https://distribution.github.io/distribution/spec/auth/token/)

use super::{ImageReference, RegistryError, TagLister};
use crate::constants::{DOCKER_HUB_API_HOST, MAX_TAG_LIST_PAGES, TAG_LIST_PAGE_SIZE};
use crate::controller::credentials::Authenticator;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::LazyLock;
use tracing::{debug, info_span, warn, Instrument};

static CHALLENGE_PARAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<key>[A-Za-z]+)="(?P<value>[^"]*)""#).expect("challenge pattern is a valid regex")
});

static NEXT_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?P<target>[^>]+)>\s*;\s*rel="?next"?"#).expect("link pattern is a valid regex")
});

/// Response of the tag listing endpoint
///
/// `tags` is `null` for a repository without tags on some registries.
#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Response of a token endpoint
///
/// `access_token` is the OAuth2 name for the same value, either may be set.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

/// Credentials presented on a request after a challenge was answered
enum Authorization {
    Bearer(String),
    Basic,
}

/// Registry client over HTTP
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    http_client: Client,
    max_pages: usize,
}

impl HttpRegistryClient {
    pub fn new() -> Result<Self, RegistryError> {
        let http_client = Client::builder()
            .user_agent(concat!("image-reflector-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http_client))
    }

    /// Use an already configured client, e.g. one with custom root certificates
    #[must_use]
    pub fn with_client(http_client: Client) -> Self {
        Self {
            http_client,
            max_pages: MAX_TAG_LIST_PAGES,
        }
    }

    /// Fail listings that need more than `max_pages` pages
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    async fn send(
        &self,
        url: &Url,
        authorization: Option<&Authorization>,
        auth: Option<&Authenticator>,
    ) -> Result<reqwest::Response, RegistryError> {
        let mut request = self.http_client.get(url.clone());
        match (authorization, auth) {
            (Some(Authorization::Bearer(token)), _) => request = request.bearer_auth(token),
            (Some(Authorization::Basic), Some(auth)) => {
                let (username, password) = auth.credentials();
                request = request.basic_auth(username, Some(password));
            }
            _ => {}
        }
        Ok(request.send().await?)
    }

    /// Turn a `WWW-Authenticate` challenge into request credentials
    async fn authorize(
        &self,
        challenge: Challenge,
        reference: &ImageReference,
        auth: Option<&Authenticator>,
    ) -> Result<Authorization, RegistryError> {
        match challenge {
            Challenge::Basic => {
                if auth.is_none() {
                    return Err(unavailable(reference, "registry requires credentials"));
                }
                Ok(Authorization::Basic)
            }
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let scope = scope.unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
                let mut query = vec![("scope", scope)];
                if let Some(service) = service {
                    query.push(("service", service));
                }

                let mut request = self.http_client.get(&realm).query(&query);
                if let Some(auth) = auth {
                    let (username, password) = auth.credentials();
                    request = request.basic_auth(username, Some(password));
                }

                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(unavailable(
                        reference,
                        &format!("token request to {realm} returned {}", response.status()),
                    ));
                }
                let body: TokenResponse = response.json().await?;
                body.token
                    .or(body.access_token)
                    .filter(|t| !t.is_empty())
                    .map(Authorization::Bearer)
                    .ok_or_else(|| unavailable(reference, "token response did not contain a token"))
            }
        }
    }
}

#[async_trait]
impl TagLister for HttpRegistryClient {
    async fn list(
        &self,
        reference: &ImageReference,
        auth: Option<&Authenticator>,
    ) -> Result<Vec<String>, RegistryError> {
        let span = info_span!(
            "registry.list_tags",
            registry = %reference.registry,
            repository = %reference.repository
        );

        async move {
            let mut url = tags_url(reference)?;
            let mut authorization: Option<Authorization> = None;
            let mut tags = Vec::new();
            let mut visited = HashSet::new();

            loop {
                if visited.len() == self.max_pages {
                    return Err(unavailable(
                        reference,
                        &format!("tag list exceeds {} pages", self.max_pages),
                    ));
                }
                visited.insert(url.clone());

                let mut response = self.send(&url, authorization.as_ref(), auth).await?;

                if response.status() == StatusCode::UNAUTHORIZED && authorization.is_none() {
                    let challenge = parse_challenge(response.headers())
                        .ok_or_else(|| unavailable(reference, "unauthorized without a usable challenge"))?;
                    debug!(challenge = ?challenge, "registry.challenge");
                    authorization = Some(self.authorize(challenge, reference, auth).await?);
                    response = self.send(&url, authorization.as_ref(), auth).await?;
                }

                let status = response.status();
                if !status.is_success() {
                    return Err(unavailable(reference, &format!("GET {url} returned {status}")));
                }

                let next = next_link(response.headers(), &url);
                let page: TagList = response.json().await?;
                let page_tags = page.tags.unwrap_or_default();
                debug!(count = page_tags.len(), "registry.page");
                tags.extend(page_tags);

                match next {
                    Some(next) if visited.contains(&next) => {
                        warn!(next = %next, "registry.pagination_loop");
                        break;
                    }
                    Some(next) => url = next,
                    None => break,
                }
            }

            Ok::<_, RegistryError>(tags)
        }
        .instrument(span)
        .await
    }
}

fn unavailable(reference: &ImageReference, reason: &str) -> RegistryError {
    RegistryError::Unavailable {
        registry: reference.registry.clone(),
        reason: reason.to_string(),
    }
}

/// First page URL of the tag listing for `reference`
fn tags_url(reference: &ImageReference) -> Result<Url, RegistryError> {
    let host = if reference.is_docker_hub() {
        DOCKER_HUB_API_HOST
    } else {
        reference.registry.as_str()
    };
    let scheme = if is_insecure_host(host) { "http" } else { "https" };
    let raw = format!(
        "{scheme}://{host}/v2/{}/tags/list?n={TAG_LIST_PAGE_SIZE}",
        reference.repository
    );
    Url::parse(&raw).map_err(|e| unavailable(reference, &format!("invalid registry URL {raw}: {e}")))
}

/// `localhost` and loopback registries are reached over plain HTTP
fn is_insecure_host(registry: &str) -> bool {
    let host = match registry.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => registry,
    };
    host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn parse_challenge(headers: &HeaderMap) -> Option<Challenge> {
    let value = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?.trim();
    let (scheme, params) = value.split_once(' ').unwrap_or((value, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params: HashMap<String, String> = CHALLENGE_PARAM_REGEX
        .captures_iter(params)
        .map(|c| (c["key"].to_lowercase(), c["value"].to_string()))
        .collect();
    Some(Challenge::Bearer {
        realm: params.remove("realm")?,
        service: params.remove("service"),
        scope: params.remove("scope"),
    })
}

/// Next page from a `Link` header, resolved against the current URL
fn next_link(headers: &HeaderMap, current: &Url) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| NEXT_LINK_REGEX.captures(value))
        .and_then(|captures| current.join(&captures["target"]).ok())
}
