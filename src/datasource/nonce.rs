//! Nonce source for signed exchange requests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing nonces. Shared by every request signed with
/// the same API key.
pub trait NonceProvider: Send + Sync + fmt::Debug {
    fn next_nonce(&self) -> u64;
}

/// Wall-clock milliseconds, bumped by one whenever two calls land in the same
/// millisecond or the clock steps backwards.
#[derive(Debug, Default)]
pub struct MonotonicNonce {
    last: AtomicU64,
}

impl MonotonicNonce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start above `floor`, e.g. the last nonce a previous process used.
    pub fn starting_after(floor: u64) -> Self {
        Self {
            last: AtomicU64::new(floor),
        }
    }
}

impl NonceProvider for MonotonicNonce {
    fn next_nonce(&self) -> u64 {
        let wall = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(current.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}
