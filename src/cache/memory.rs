//! Process-local bounded cache.

use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
    hits: u64,
    last_access: u64,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    /// Logical access counter used for recency.
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Live slot for `key`, dropping it first if its TTL has passed.
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Slot> {
        if self.slots.get(key).is_some_and(|s| s.is_expired(now)) {
            self.slots.remove(key);
            return None;
        }
        self.slots.get_mut(key)
    }

    fn purge_expired(&mut self, now: Instant) {
        self.slots.retain(|_, slot| !slot.is_expired(now));
    }

    /// Drop the least valuable slot: fewest hits, then least recently used.
    fn evict_one(&mut self) -> Option<String> {
        let victim = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| (slot.hits, slot.last_access))
            .map(|(key, _)| key.clone())?;
        self.slots.remove(&victim);
        Some(victim)
    }
}

/// In-memory TTL cache with an item ceiling.
///
/// Both TTL expiry and capacity eviction happen under the same lock, so
/// concurrent sessions never observe a half-removed entry.
#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_items: usize,
}

impl MemoryCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_items: max_items.max(1),
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.purge_expired(now);
        inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self.inner.lock().live(key, now).is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        Ok(inner.live(key, now).map(|slot| {
            slot.hits += 1;
            slot.last_access = tick;
            slot.value.clone()
        }))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();

        if !inner.slots.contains_key(key) && inner.slots.len() >= self.max_items {
            inner.purge_expired(now);
            while inner.slots.len() >= self.max_items {
                if let Some(victim) = inner.evict_one() {
                    tracing::debug!(key = %victim, "evicted cache entry at capacity");
                } else {
                    break;
                }
            }
        }

        let hits = inner.slots.get(key).map(|s| s.hits).unwrap_or(0);
        inner.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: now.checked_add(ttl),
                hits,
                last_access: tick,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.lock().slots.remove(key);
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        Ok(self.inner.lock().live(key, now).map(|slot| match slot.expires_at {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::MAX,
        }))
    }

    async fn update_ttl(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.live(key, now) {
            Some(slot) => {
                slot.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
