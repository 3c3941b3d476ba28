//! TTL key-value cache used to persist poll progress across restarts.

use crate::codec::{self, CodecError};
use crate::config::{CacheBackendKind, CacheConfig};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache backend unreachable: {0}")]
    Unreachable(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Raw string store with per-key TTL.
///
/// A miss is `Ok(None)` / `Ok(false)`. Any backend failure is returned as an
/// error so callers never mistake an outage for a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync + fmt::Debug {
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remaining lifetime, `Duration::MAX` for keys without expiry.
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Reset the TTL of an existing key. Returns false when the key is missing.
    async fn update_ttl(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;
}

/// Build the configured backend. A networked backend is probed before returning.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, CacheError> {
    match config.backend {
        CacheBackendKind::Memory => Ok(Arc::new(MemoryCache::new(config.max_items))),
        CacheBackendKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheError::Unreachable("REDIS_URL not set".to_string()))?;
            let cache = RedisCache::connect(url, config.connect_timeout).await?;
            Ok(Arc::new(cache))
        }
    }
}

/// Typed view over a [`CacheBackend`] with key namespacing, a default TTL and
/// the codec pipeline applied to values.
pub struct Datastore<T> {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    default_ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Datastore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            key_prefix: self.key_prefix.clone(),
            default_ttl: self.default_ttl,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Datastore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("backend", &self.backend)
            .field("key_prefix", &self.key_prefix)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<T> Datastore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        key_prefix: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
            default_ttl,
            _marker: PhantomData,
        }
    }

    pub fn from_config(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self::new(backend, config.key_prefix.clone(), config.default_ttl)
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Full backend key, `<prefix>:<key>`.
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.backend.exists(&self.namespaced(key)).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.backend.get(&self.namespaced(key)).await? {
            Some(text) => Ok(Some(codec::decode(&text)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.put_with_ttl(key, value, self.default_ttl).await
    }

    pub async fn put_with_ttl(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let text = codec::encode(value)?;
        self.backend.put(&self.namespaced(key), text, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete(&self.namespaced(key)).await
    }

    pub async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.backend.remaining_ttl(&self.namespaced(key)).await
    }

    pub async fn update_ttl(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.backend.update_ttl(&self.namespaced(key), ttl).await
    }
}
