/*
 * Responsibility
 * - 1 回の実行で共有するコンテキスト (AppState)
 *   - config, HTTP client, JWKS cache
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::services::auth::{self, Authorizer, TokenVerifier};
use crate::services::cache::MemoryCache;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub cache: MemoryCache,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let http = auth::build_http_client(&config)?;

        Ok(Self {
            config: Arc::new(config),
            http,
            cache: MemoryCache::new(),
        })
    }

    pub fn verifier(&self) -> Result<Arc<dyn TokenVerifier>, ConfigError> {
        let audience = self.config.require_client_id()?;
        auth::build_verifier(&self.config, audience, self.http.clone(), self.cache.clone())
    }

    pub fn authorizer(&self) -> Result<Authorizer, ConfigError> {
        auth::build_authorizer(&self.config, self.http.clone(), self.cache.clone())
    }
}
