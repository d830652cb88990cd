use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local cache. Clones share the same storage.
///
/// Expired entries are evicted lazily on read; there is no background sweeper.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".into()))
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.lock()?;

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }

        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let ttl = TimeDelta::from_std(ttl).map_err(|e| CacheError::InvalidValue(e.to_string()))?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| CacheError::InvalidValue("ttl out of range".into()))?;

        self.lock()?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        Ok(self.lock()?.remove(key).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::client::ttl_seconds;

    #[tokio::test]
    async fn stores_and_reads_back() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("jwks:a", "{}", ttl_seconds(60)).await.unwrap();

        assert_eq!(cache.get_string("jwks:a").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.get_string("jwks:b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let cache = MemoryCache::new();
        let other = cache.clone();
        cache.set_with_ttl("k", "v", ttl_seconds(60)).await.unwrap();

        assert_eq!(other.get_string("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn zero_ttl_entries_are_never_served() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("k", "v", Duration::ZERO).await.unwrap();

        assert_eq!(cache.get_string("k").await.unwrap(), None);
        // evicted on read
        assert_eq!(cache.del("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn del_reports_removed_count() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("k", "v", ttl_seconds(60)).await.unwrap();

        assert_eq!(cache.del("k").await.unwrap(), 1);
        assert_eq!(cache.del("k").await.unwrap(), 0);
        assert_eq!(cache.backend_name(), "memory");
    }
}
