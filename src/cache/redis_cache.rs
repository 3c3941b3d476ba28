//! Redis-backed cache for deployments that restart pollers on other hosts.

use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::fmt;
use std::time::Duration;

pub struct RedisCache {
    conn: ConnectionManager,
    url: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache").field("url", &self.url).finish()
    }
}

impl RedisCache {
    /// Open a managed connection and PING it, failing if either step exceeds `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Unreachable(e.to_string()))?;

        let probe = async {
            let mut conn = ConnectionManager::new(client).await?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>((conn, pong))
        };
        let (conn, pong) = tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| CacheError::Unreachable(format!("no PING reply within {:?}", timeout)))?
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;

        tracing::info!(url = %redact_url(url), reply = %pong, "connected to redis cache");
        Ok(Self {
            conn,
            url: redact_url(url),
        })
    }
}

fn backend_err(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Strip any password from a connection URL before it is logged.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// Convert a Redis PTTL reply: -2 means missing, -1 means no expiry.
fn pttl_to_remaining(pttl: i64) -> Option<Duration> {
    match pttl {
        -2 => None,
        -1 => Some(Duration::MAX),
        ms if ms >= 0 => Some(Duration::from_millis(ms as u64)),
        _ => None,
    }
}

/// Redis rejects a zero expiry, so round sub-millisecond TTLs up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(count > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn.clone();
        let pttl: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(pttl_to_remaining(pttl))
    }

    async fn update_ttl(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pttl_mapping() {
        assert_eq!(pttl_to_remaining(-2), None);
        assert_eq!(pttl_to_remaining(-1), Some(Duration::MAX));
        assert_eq!(pttl_to_remaining(1500), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("redis://:hunter2@cache.internal:6379/0"),
            "redis://***@cache.internal:6379/0"
        );
        assert_eq!(redact_url("redis://127.0.0.1/"), "redis://127.0.0.1/");
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = RedisCache::connect("not a url", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_connect_fails_fast_when_unreachable() {
        let result = RedisCache::connect("redis://127.0.0.1:1/", Duration::from_millis(500)).await;
        assert!(matches!(result, Err(CacheError::Unreachable(_))));
    }
}
