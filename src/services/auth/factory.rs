/// Factory: build verification services from application `Config`.
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ConfigError, VerifyBackend};
use crate::services::auth::provider::{Authorizer, FacebookProvider, GoogleProvider};
use crate::services::auth::{HttpKeySource, JwksVerifier, TokenInfoVerifier, TokenVerifier};
use crate::services::cache::{MemoryCache, client::ttl_seconds};

pub fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Verifier for `audience`, using the backend selected in config.
pub fn build_verifier(
    config: &Config,
    audience: &str,
    http: reqwest::Client,
    cache: MemoryCache,
) -> Result<Arc<dyn TokenVerifier>, ConfigError> {
    if audience.trim().is_empty() {
        return Err(ConfigError::Missing("CLIENT_ID"));
    }

    let verifier: Arc<dyn TokenVerifier> = match config.backend {
        VerifyBackend::Jwks => {
            let keys = HttpKeySource::new(
                http,
                config.jwks_uri.clone(),
                cache,
                ttl_seconds(config.jwks_cache_ttl_seconds),
            )
            .with_min_refresh_interval(ttl_seconds(config.jwks_min_refresh_seconds));
            Arc::new(
                JwksVerifier::new(Arc::new(keys), audience, config.issuers.clone())
                    .with_algorithms(config.algorithms.clone())
                    .with_leeway(config.leeway_seconds),
            )
        }
        VerifyBackend::TokenInfo => Arc::new(TokenInfoVerifier::new(
            http,
            config.tokeninfo_url.clone(),
            audience,
            config.issuers.clone(),
        )),
    };

    Ok(verifier)
}

/// Registry with Google (when a client id is configured) then Facebook (when configured).
pub fn build_authorizer(
    config: &Config,
    http: reqwest::Client,
    cache: MemoryCache,
) -> Result<Authorizer, ConfigError> {
    let mut authorizer = Authorizer::new();

    if let Some(client_id) = config.client_id.as_deref() {
        let verifier = build_verifier(config, client_id, http, cache)?;
        authorizer = authorizer.with_provider(Arc::new(GoogleProvider::new(client_id, verifier)));
    }

    if let Some(facebook) = &config.facebook {
        authorizer = authorizer.with_provider(Arc::new(FacebookProvider::new(
            facebook.client_id.clone(),
            facebook.client_secret.clone(),
        )));
    }

    Ok(authorizer)
}
