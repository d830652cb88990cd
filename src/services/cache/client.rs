//! String cache with TTL for documents fetched from issuers (JWK Sets).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors.
///
/// Kept independent from `VerifyError` so callers can decide how to fail
/// (the key source treats a broken cache as a miss).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// A minimal, string-based cache interface.
///
/// Implementations must be cheap to clone (typically `Arc<...>` inside).
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get a live value. Expired entries read as `None`.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Store (or replace) a value with TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Delete a key. Returns number of deleted keys.
    async fn del(&self, key: &str) -> CacheResult<u64>;
}

pub fn ttl_seconds(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}
