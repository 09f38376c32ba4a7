//! Cache layer
//!
//! An in-process cache (moka) for read-mostly lookups such as the category
//! list. Values are stored serialized, so any `Serialize` type can be cached
//! under a string key.
//!
//! # Usage
//!
//! ```rust,ignore
//! use newsdesk::cache::{create_cache, CacheLayer};
//! use newsdesk::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("categories:active", &categories, cache.default_ttl()).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The methods are generic over the cached type, so this trait is used with
/// concrete implementations rather than as a trait object.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration)
        -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

/// Shared cache handle
pub type SharedCache = Arc<MemoryCache>;

/// Create the cache described by the configuration
pub fn create_cache(config: &CacheConfig) -> SharedCache {
    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_entries, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 1800,
            max_entries: 100,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(1800));

        cache
            .set("key", &"value".to_string(), cache.default_ttl())
            .await
            .unwrap();
        let result: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(result, Some("value".to_string()));
    }
}
