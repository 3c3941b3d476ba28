//! Flight Decision Loop: one session per tracked flight.

use super::session::{spawn_session, SessionHandle, SessionState, SessionTracker};
use super::PollError;
use crate::cache::Datastore;
use crate::config::FlightNotificationsConfig;
use crate::datasource::{select_flight, DataSourceError, FlightSource};
use crate::domain::{AirportInfo, Clock, FlightState, IdentType, SystemClock};
use crate::engine::{decide, SentNotifications};
use crate::messaging::{Dispatcher, FlightAlert, Recipients};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Cache key prefix for flight entries.
pub const FLIGHT_KEY_PREFIX: &str = "flightdata";

/// Everything a restarted session needs to pick up where it left off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightCacheEntry {
    pub identity_hash: String,
    pub flight: FlightState,
    pub origin: AirportInfo,
    pub destination: AirportInfo,
    pub sent: SentNotifications,
    pub recipients: Recipients,
    pub notifications: FlightNotificationsConfig,
    pub poll_interval: Duration,
    pub updated_at: DateTime<Utc>,
}

impl FlightCacheEntry {
    pub fn cache_key(fa_flight_id: &str) -> String {
        format!("{}:{}", FLIGHT_KEY_PREFIX, fa_flight_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightPollerSettings {
    pub poll_interval: Duration,
    /// Bound on a full flight or airport lookup.
    pub fetch_timeout: Duration,
    pub cache_read_timeout: Duration,
    pub cache_write_timeout: Duration,
}

impl Default for FlightPollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(60),
            cache_read_timeout: Duration::from_secs(60),
            cache_write_timeout: Duration::from_secs(15),
        }
    }
}

/// Spawns and drives flight sessions. Cheap to clone; every session gets
/// its own copy.
#[derive(Debug, Clone)]
pub struct FlightPoller {
    source: Arc<dyn FlightSource>,
    dispatcher: Arc<dyn Dispatcher>,
    cache: Datastore<FlightCacheEntry>,
    clock: Arc<dyn Clock>,
    notifications: FlightNotificationsConfig,
    recipients: Recipients,
    settings: FlightPollerSettings,
}

impl FlightPoller {
    pub fn new(
        source: Arc<dyn FlightSource>,
        dispatcher: Arc<dyn Dispatcher>,
        cache: Datastore<FlightCacheEntry>,
        notifications: FlightNotificationsConfig,
        recipients: Recipients,
    ) -> Self {
        Self {
            source,
            dispatcher,
            cache,
            clock: Arc::new(SystemClock),
            notifications,
            recipients,
            settings: FlightPollerSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: FlightPollerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &FlightPollerSettings {
        &self.settings
    }

    /// Look up the flight a user-supplied identifier refers to.
    pub async fn resolve(
        &self,
        ident: &str,
        ident_type: IdentType,
    ) -> Result<FlightState, PollError> {
        let flights = self
            .bounded(self.source.fetch_flights(ident, ident_type))
            .await
            .map_err(|e| match e {
                DataSourceError::NotFound(_) => PollError::FlightNotFound(ident.to_string()),
                other => PollError::Bootstrap(other),
            })?;
        select_flight(flights, ident_type, self.clock.now())
            .ok_or_else(|| PollError::FlightNotFound(ident.to_string()))
    }

    /// Resolve `ident` and start polling it.
    ///
    /// Resolution happens before the session is spawned, so an unknown flight
    /// or an unreachable provider is returned here rather than through the
    /// handle.
    pub async fn spawn(
        &self,
        ident: &str,
        ident_type: IdentType,
        cancel: CancellationToken,
    ) -> Result<SessionHandle, PollError> {
        let flight = self.resolve(ident, ident_type).await?;
        tracing::info!(
            ident = %ident,
            fa_flight_id = %flight.fa_flight_id,
            status = %flight.status,
            "tracking flight"
        );
        let poller = self.clone();
        Ok(spawn_session(format!("flight:{}", ident), move |tracker| {
            poller.run(tracker, flight, cancel)
        }))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DataSourceError>>,
    ) -> Result<T, DataSourceError> {
        timeout(self.settings.fetch_timeout, call)
            .await
            .unwrap_or(Err(DataSourceError::Timeout))
    }

    async fn run(
        self,
        tracker: SessionTracker,
        resolved: FlightState,
        cancel: CancellationToken,
    ) -> Result<(), PollError> {
        let key = FlightCacheEntry::cache_key(&resolved.fa_flight_id);
        let bootstrapped = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(session = %tracker.id(), "flight session cancelled during bootstrap");
                return Ok(());
            }
            bootstrapped = self.bootstrap(&tracker, &key, resolved) => bootstrapped,
        };
        let mut entry = bootstrapped?;
        entry.sent.disable_by_config(&self.notifications);

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first_tick = true;

        loop {
            if entry.sent.sent_all() {
                tracing::info!(
                    session = %tracker.id(),
                    fa_flight_id = %entry.flight.fa_flight_id,
                    "all notifications sent"
                );
                return Ok(());
            }

            tracker.transition(SessionState::Waiting);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(session = %tracker.id(), "flight session cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            let now = self.clock.now();

            // The first tick works from the snapshot fetched at bootstrap.
            if !first_tick {
                tracker.transition(SessionState::Fetching);
                let refreshed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!(session = %tracker.id(), "flight session cancelled");
                        return Ok(());
                    }
                    refreshed = self.refresh(&entry.flight.fa_flight_id) => refreshed,
                };
                match refreshed {
                    Ok(flight) => entry.flight = flight.reconcile(&entry.flight),
                    Err(e) => {
                        tracing::warn!(
                            session = %tracker.id(),
                            fa_flight_id = %entry.flight.fa_flight_id,
                            error = %e,
                            "flight fetch failed, skipping tick"
                        );
                        continue;
                    }
                }
            }
            first_tick = false;

            entry.updated_at = now;
            self.persist(&tracker, &key, &entry).await;

            tracker.transition(SessionState::Deciding);
            let Some(category) = decide(&entry.flight, &entry.sent, &self.notifications, now) else {
                tracing::debug!(
                    session = %tracker.id(),
                    status = %entry.flight.status,
                    pending = ?entry.sent.pending(),
                    "nothing to send"
                );
                continue;
            };

            tracker.transition(SessionState::Notifying);
            let alert = FlightAlert::new(
                category,
                &entry.flight,
                &entry.origin,
                &entry.destination,
                self.notifications.use_local_time,
            );
            match self.dispatcher.send(&alert, &self.recipients).await {
                Ok(()) => {
                    entry.sent.mark_sent(category);
                    tracing::info!(
                        session = %tracker.id(),
                        fa_flight_id = %entry.flight.fa_flight_id,
                        category = %category,
                        "notification sent"
                    );
                    self.persist(&tracker, &key, &entry).await;
                }
                Err(e) => tracing::warn!(
                    session = %tracker.id(),
                    category = %category,
                    error = %e,
                    "dispatch failed, will retry next tick"
                ),
            }
        }
    }

    /// Restore progress from the cache, or build a fresh entry with airport
    /// metadata. Airport lookup failures are fatal.
    async fn bootstrap(
        &self,
        tracker: &SessionTracker,
        key: &str,
        resolved: FlightState,
    ) -> Result<FlightCacheEntry, PollError> {
        tracker.transition(SessionState::CheckingCache);
        let cached = match timeout(self.settings.cache_read_timeout, self.cache.get(key)).await {
            Ok(Ok(cached)) => cached,
            Ok(Err(e)) => {
                tracing::warn!(session = %tracker.id(), key = %key, error = %e, "cache read failed");
                None
            }
            Err(_) => {
                tracing::warn!(session = %tracker.id(), key = %key, "cache read timed out");
                None
            }
        };

        let identity_hash = resolved.identity_hash();
        if let Some(cached) = cached {
            if cached.identity_hash == identity_hash {
                tracing::info!(
                    session = %tracker.id(),
                    fa_flight_id = %resolved.fa_flight_id,
                    pending = ?cached.sent.pending(),
                    "restored flight from cache"
                );
                return Ok(FlightCacheEntry {
                    flight: resolved.reconcile(&cached.flight),
                    recipients: self.recipients.clone(),
                    notifications: self.notifications,
                    poll_interval: self.settings.poll_interval,
                    ..cached
                });
            }
            tracing::warn!(session = %tracker.id(), key = %key, "cached entry belongs to another flight, ignoring");
        }

        tracker.transition(SessionState::Fetching);
        let origin = self
            .bounded(self.source.fetch_airport(&resolved.origin.code))
            .await
            .map_err(PollError::Bootstrap)?;
        let destination = self
            .bounded(self.source.fetch_airport(&resolved.destination.code))
            .await
            .map_err(PollError::Bootstrap)?;

        Ok(FlightCacheEntry {
            identity_hash,
            flight: resolved,
            origin,
            destination,
            sent: SentNotifications::new(),
            recipients: self.recipients.clone(),
            notifications: self.notifications,
            poll_interval: self.settings.poll_interval,
            updated_at: self.clock.now(),
        })
    }

    async fn refresh(&self, fa_flight_id: &str) -> Result<FlightState, DataSourceError> {
        let flights = self
            .bounded(self.source.fetch_flights(fa_flight_id, IdentType::FaFlightId))
            .await?;
        select_flight(flights, IdentType::FaFlightId, self.clock.now())
            .ok_or_else(|| DataSourceError::NotFound(format!("flight {}", fa_flight_id)))
    }

    async fn persist(&self, tracker: &SessionTracker, key: &str, entry: &FlightCacheEntry) {
        match timeout(self.settings.cache_write_timeout, self.cache.put(key, entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(session = %tracker.id(), key = %key, error = %e, "cache write failed")
            }
            Err(_) => tracing::warn!(session = %tracker.id(), key = %key, "cache write timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::codec;
    use crate::domain::FlightIdent;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(
            FlightCacheEntry::cache_key("UAL2614-1714500000-airline-0001"),
            "flightdata:UAL2614-1714500000-airline-0001"
        );
    }

    #[test]
    fn test_cache_entry_survives_codec() {
        let flight = FlightState {
            fa_flight_id: "DAL5-1".to_string(),
            ident: FlightIdent {
                ident: "DAL5".to_string(),
                icao: Some("DAL5".to_string()),
                iata: Some("DL5".to_string()),
            },
            status: "En Route".to_string(),
            ..Default::default()
        };
        let mut sent = SentNotifications::new();
        sent.mark_sent(crate::engine::NotificationCategory::Takeoff);
        let entry = FlightCacheEntry {
            identity_hash: flight.identity_hash(),
            flight,
            origin: AirportInfo::default(),
            destination: AirportInfo::default(),
            sent,
            recipients: Recipients {
                sms_number: Some("+15550100".to_string()),
                ..Default::default()
            },
            notifications: FlightNotificationsConfig::default(),
            poll_interval: Duration::from_secs(60),
            updated_at: Utc::now(),
        };
        let text = codec::encode(&entry).unwrap();
        assert_eq!(codec::decode::<FlightCacheEntry>(&text).unwrap(), entry);
    }

    #[tokio::test]
    async fn test_resolve_maps_provider_errors() {
        let source = crate::datasource::MockFlightSource::new()
            .with_error(DataSourceError::NotFound("flight".to_string()))
            .with_error(DataSourceError::RateLimited);
        let poller = FlightPoller::new(
            Arc::new(source),
            Arc::new(crate::messaging::RecordingDispatcher::new()),
            Datastore::new(Arc::new(MemoryCache::new(8)), "t", Duration::from_secs(60)),
            FlightNotificationsConfig::default(),
            Recipients::default(),
        );
        assert!(matches!(
            poller.resolve("UA1", IdentType::Designator).await,
            Err(PollError::FlightNotFound(_))
        ));
        assert!(matches!(
            poller.resolve("UA1", IdentType::Designator).await,
            Err(PollError::Bootstrap(DataSourceError::RateLimited))
        ));
    }
}
