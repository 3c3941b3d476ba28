//! Spot price loop against a scripted ticker.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pollwatch::cache::{CacheBackend, CacheError, Datastore, MemoryCache};
use pollwatch::datasource::{DataSourceError, MockSpotPriceSource};
use pollwatch::domain::{CurrencyPair, Decimal, ManualClock, SpotQuote};
use pollwatch::messaging::{Recipients, RecordingDispatcher};
use pollwatch::orchestration::SpotPricePoller;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn price(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_reports_every_tick_until_cancelled() {
    let source = Arc::new(
        MockSpotPriceSource::new()
            .with_price(price("3400.10"))
            .with_error(DataSourceError::RateLimited)
            .with_price(price("3401.25")),
    );
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let backend = Arc::new(MemoryCache::new(16));
    let store: Datastore<SpotQuote> = Datastore::new(backend, "lavamonster", Duration::from_secs(60));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 0).unwrap(),
    ));
    let poller = SpotPricePoller::new(
        source.clone(),
        dispatcher.clone(),
        Recipients::default(),
        Duration::from_millis(10),
    )
    .with_clock(clock)
    .with_cache(store.clone());

    let pair: CurrencyPair = "ETH/USD:2".parse().unwrap();
    let token = CancellationToken::new();
    let handle = poller.spawn(pair.clone(), token.clone());
    assert_eq!(handle.entity(), "spot:ETH-USD-2");

    eventually(|| dispatcher.count() >= 3).await;
    token.cancel();
    timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("spot session should stop")
        .unwrap();

    let sent = dispatcher.plaintexts();
    assert_eq!(sent[0], "2 ETH = 6800.2 USD as of 2024-05-01 13:45:00 UTC");
    assert_eq!(sent[1], "2 ETH = 6802.5 USD as of 2024-05-01 13:45:00 UTC");
    // The rate-limited tick produced no message.
    assert!(source.fetch_count() > dispatcher.count());

    let last = store
        .get(&SpotPricePoller::cache_key(&pair))
        .await
        .unwrap()
        .expect("last quote cached");
    assert_eq!(last.price, price("3401.25"));
}

#[tokio::test]
async fn test_dispatch_failure_keeps_polling() {
    let source = Arc::new(MockSpotPriceSource::new().with_price(price("1.5")));
    let dispatcher = Arc::new(RecordingDispatcher::new().failing_times(2));
    let poller = SpotPricePoller::new(
        source.clone(),
        dispatcher.clone(),
        Recipients::default(),
        Duration::from_millis(10),
    );

    let token = CancellationToken::new();
    let handle = poller.spawn("BTC/USD".parse().unwrap(), token.clone());
    eventually(|| dispatcher.count() >= 1).await;
    token.cancel();
    timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(dispatcher.attempts() >= 3);
}

#[tokio::test]
async fn test_already_cancelled_token_stops_immediately() {
    let source = Arc::new(MockSpotPriceSource::new().with_price(price("1")));
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let poller = SpotPricePoller::new(
        source.clone(),
        dispatcher.clone(),
        Recipients::default(),
        Duration::from_millis(10),
    );
    let token = CancellationToken::new();
    token.cancel();

    let handle = poller.spawn("ETH/USD".parse().unwrap(), token);
    timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.fetch_count(), 0);
    assert_eq!(dispatcher.attempts(), 0);
}

/// A backend whose writes never complete.
#[derive(Debug)]
struct StalledCache;

#[async_trait]
impl CacheBackend for StalledCache {
    async fn exists(&self, _: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
        std::future::pending().await
    }

    async fn delete(&self, _: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn remaining_ttl(&self, _: &str) -> Result<Option<Duration>, CacheError> {
        Ok(None)
    }

    async fn update_ttl(&self, _: &str, _: Duration) -> Result<bool, CacheError> {
        Ok(false)
    }
}

fn stalled_store() -> Datastore<SpotQuote> {
    Datastore::new(Arc::new(StalledCache), "lavamonster", Duration::from_secs(60))
}

#[tokio::test]
async fn test_stalled_cache_write_still_reports() {
    let source = Arc::new(MockSpotPriceSource::new().with_price(price("2")));
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let poller = SpotPricePoller::new(
        source,
        dispatcher.clone(),
        Recipients::default(),
        Duration::from_millis(10),
    )
    .with_cache(stalled_store())
    .with_cache_write_timeout(Duration::from_millis(20));

    let token = CancellationToken::new();
    let handle = poller.spawn("ETH/USD".parse().unwrap(), token.clone());
    eventually(|| dispatcher.count() >= 2).await;
    token.cancel();
    timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_cache_write() {
    let source = Arc::new(MockSpotPriceSource::new().with_price(price("2")));
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let poller = SpotPricePoller::new(
        source.clone(),
        dispatcher.clone(),
        Recipients::default(),
        Duration::from_millis(10),
    )
    .with_cache(stalled_store());

    let token = CancellationToken::new();
    let handle = poller.spawn("ETH/USD".parse().unwrap(), token.clone());
    eventually(|| source.fetch_count() >= 1).await;
    sleep(Duration::from_millis(20)).await;
    token.cancel();
    timeout(Duration::from_secs(1), handle.wait())
        .await
        .expect("cancel should not wait out the write timeout")
        .unwrap();
    // Stuck in the default 15s write, so nothing went out.
    assert_eq!(dispatcher.attempts(), 0);
}
