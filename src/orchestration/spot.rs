//! Spot price loop: fetch and report on every tick until cancelled.

use super::session::{spawn_session, SessionHandle, SessionState, SessionTracker};
use super::PollError;
use crate::cache::Datastore;
use crate::datasource::{DataSourceError, SpotPriceSource};
use crate::domain::{Clock, CurrencyPair, SpotQuote, SystemClock};
use crate::messaging::{Dispatcher, Recipients, SpotPriceAlert};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const SPOT_KEY_PREFIX: &str = "spotprice";

/// Ticker lookups are cheap; fail fast.
pub const SPOT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const SPOT_CACHE_WRITE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SpotPricePoller {
    source: Arc<dyn SpotPriceSource>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    recipients: Recipients,
    poll_interval: Duration,
    fetch_timeout: Duration,
    cache_write_timeout: Duration,
    cache: Option<Datastore<SpotQuote>>,
}

impl SpotPricePoller {
    pub fn new(
        source: Arc<dyn SpotPriceSource>,
        dispatcher: Arc<dyn Dispatcher>,
        recipients: Recipients,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            dispatcher,
            clock: Arc::new(SystemClock),
            recipients,
            poll_interval,
            fetch_timeout: SPOT_FETCH_TIMEOUT,
            cache_write_timeout: SPOT_CACHE_WRITE_TIMEOUT,
            cache: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_cache_write_timeout(mut self, cache_write_timeout: Duration) -> Self {
        self.cache_write_timeout = cache_write_timeout;
        self
    }

    /// Keep the last quote per pair in the cache.
    pub fn with_cache(mut self, cache: Datastore<SpotQuote>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_key(pair: &CurrencyPair) -> String {
        format!("{}:{}", SPOT_KEY_PREFIX, pair.entity_key())
    }

    pub fn spawn(&self, pair: CurrencyPair, cancel: CancellationToken) -> SessionHandle {
        tracing::info!(pair = %pair, "tracking spot price");
        let poller = self.clone();
        spawn_session(format!("spot:{}", pair.entity_key()), move |tracker| {
            poller.run(tracker, pair, cancel)
        })
    }

    async fn run(
        self,
        tracker: SessionTracker,
        pair: CurrencyPair,
        cancel: CancellationToken,
    ) -> Result<(), PollError> {
        let symbol = pair.symbol();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tracker.transition(SessionState::Waiting);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(session = %tracker.id(), pair = %pair, "spot session cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            tracker.transition(SessionState::Fetching);
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                fetched = timeout(self.fetch_timeout, self.source.fetch_spot_price(&symbol)) => {
                    fetched.unwrap_or(Err(DataSourceError::Timeout))
                }
            };
            let price = match fetched {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(session = %tracker.id(), symbol = %symbol, error = %e, "spot fetch failed, skipping tick");
                    continue;
                }
            };
            let quote = SpotQuote {
                pair: pair.clone(),
                price,
                at: self.clock.now(),
            };

            if let Some(cache) = &self.cache {
                let key = Self::cache_key(&pair);
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    written = timeout(self.cache_write_timeout, cache.put(&key, &quote)) => written,
                };
                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(session = %tracker.id(), key = %key, error = %e, "cache write failed")
                    }
                    Err(_) => tracing::warn!(session = %tracker.id(), key = %key, "cache write timed out"),
                }
            }

            tracker.transition(SessionState::Notifying);
            match self
                .dispatcher
                .send(&SpotPriceAlert::new(quote), &self.recipients)
                .await
            {
                Ok(()) => tracing::debug!(session = %tracker.id(), symbol = %symbol, price = %price, "spot price sent"),
                Err(e) => tracing::warn!(session = %tracker.id(), symbol = %symbol, error = %e, "dispatch failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        let pair: CurrencyPair = "eth/usd".parse().unwrap();
        assert_eq!(SpotPricePoller::cache_key(&pair), "spotprice:ETH-USD-1");
    }
}
