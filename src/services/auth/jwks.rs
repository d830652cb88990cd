//! Issuer signing keys (JWK Set) retrieval.
//!
//! The key source is the only place that talks to the issuer's certificate endpoint.
//! Documents are cached raw, keyed by URI, for as long as `Cache-Control: max-age` allows.
//! Every network fetch also leaves a `jwks-refreshed:<uri>` marker; while it lives, requests
//! for a refresh are refused so unknown `kid`s cannot drive traffic to the issuer.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::cache::{CacheClient, CacheError};

pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("failed to fetch {uri}: {source}")]
    Http {
        uri: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{uri} returned HTTP {status}")]
    Status { uri: String, status: u16 },
    #[error("invalid JWKS document: {0}")]
    InvalidDocument(String),
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A key set, and whether it was fetched from the issuer for this call.
#[derive(Debug, Clone)]
pub struct KeySet {
    pub jwks: JwkSet,
    pub fetched: bool,
}

/// Where verification keys come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    // Current key set; may be served from cache.
    async fn keys(&self) -> Result<KeySet, KeySourceError>;

    // Fetch again for a key the current set lacks (key rotation).
    // `None` when the set was fetched too recently to ask again.
    async fn refresh(&self) -> Result<Option<JwkSet>, KeySourceError>;
}

/// Fetches the JWK Set over HTTPS with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpKeySource<C: CacheClient> {
    http: reqwest::Client,
    jwks_uri: String,
    cache: C,
    default_ttl: Duration,
    min_refresh_interval: Duration,
}

impl<C: CacheClient> HttpKeySource<C> {
    pub fn new(
        http: reqwest::Client,
        jwks_uri: impl Into<String>,
        cache: C,
        default_ttl: Duration,
    ) -> Self {
        Self {
            http,
            jwks_uri: jwks_uri.into(),
            cache,
            default_ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    /// Zero disables the limit.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    fn cache_key(&self) -> String {
        format!("jwks:{}", self.jwks_uri)
    }

    fn refreshed_key(&self) -> String {
        format!("jwks-refreshed:{}", self.jwks_uri)
    }

    async fn recently_fetched(&self) -> bool {
        if self.min_refresh_interval.is_zero() {
            return false;
        }

        match self.cache.get_string(&self.refreshed_key()).await {
            Ok(marker) => marker.is_some(),
            Err(e) => {
                warn!(
                    error = %e,
                    backend = self.cache.backend_name(),
                    "JWKS refresh marker read failed"
                );
                false
            }
        }
    }

    async fn fetch(&self) -> Result<JwkSet, KeySourceError> {
        debug!(uri = %self.jwks_uri, "fetching JWKS");

        let response = self
            .http
            .get(&self.jwks_uri)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| KeySourceError::Http {
                uri: self.jwks_uri.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::Status {
                uri: self.jwks_uri.clone(),
                status: status.as_u16(),
            });
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl);

        let body = response.text().await.map_err(|source| KeySourceError::Http {
            uri: self.jwks_uri.clone(),
            source,
        })?;

        if !self.min_refresh_interval.is_zero() {
            let marker = self
                .cache
                .set_with_ttl(&self.refreshed_key(), "1", self.min_refresh_interval)
                .await;
            if let Err(e) = marker {
                warn!(
                    error = %e,
                    backend = self.cache.backend_name(),
                    "JWKS refresh marker write failed"
                );
            }
        }

        let set: JwkSet = serde_json::from_str(&body)
            .map_err(|e| KeySourceError::InvalidDocument(e.to_string()))?;

        if !ttl.is_zero() {
            if let Err(e) = self.cache.set_with_ttl(&self.cache_key(), &body, ttl).await {
                warn!(
                    error = %e,
                    backend = self.cache.backend_name(),
                    "JWKS cache write failed"
                );
            }
        }

        Ok(set)
    }
}

#[async_trait]
impl<C: CacheClient> KeySource for HttpKeySource<C> {
    async fn keys(&self) -> Result<KeySet, KeySourceError> {
        let key = self.cache_key();

        match self.cache.get_string(&key).await {
            Ok(Some(doc)) => match serde_json::from_str::<JwkSet>(&doc) {
                Ok(jwks) => return Ok(KeySet { jwks, fetched: false }),
                Err(e) => {
                    warn!(error = %e, key = %key, "discarding unparsable cached JWKS");
                    self.cache.del(&key).await.ok();
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, backend = self.cache.backend_name(), "JWKS cache read failed");
            }
        }

        let jwks = self.fetch().await?;
        Ok(KeySet { jwks, fetched: true })
    }

    async fn refresh(&self) -> Result<Option<JwkSet>, KeySourceError> {
        if self.recently_fetched().await {
            debug!(uri = %self.jwks_uri, "JWKS fetched recently, not refreshing");
            return Ok(None);
        }

        self.fetch().await.map(Some)
    }
}
/// Lifetime, in seconds, granted by a `Cache-Control` header value.
///
/// `no-store` / `no-cache` yield `Some(0)`; a header without `max-age` yields `None`.
pub fn parse_max_age(header: &str) -> Option<u64> {
    let mut max_age = None;

    for directive in header.split(',').map(|d| d.trim().to_ascii_lowercase()) {
        if directive == "no-store" || directive == "no-cache" {
            return Some(0);
        }
        if let Some(value) = directive.strip_prefix("max-age=") {
            max_age = value.trim_matches('"').parse().ok();
        }
    }

    max_age
}
