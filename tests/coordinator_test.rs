//! Coordinator: start, stop, shutdown and outcome collection.

use chrono::{Duration as ChronoDuration, Utc};
use pollwatch::cache::{Datastore, MemoryCache};
use pollwatch::config::FlightNotificationsConfig;
use pollwatch::datasource::{DataSourceError, MockFlightSource, MockSpotPriceSource};
use pollwatch::domain::{AirportInfo, Decimal, FlightEndpoint, FlightIdent, FlightState, IdentType};
use pollwatch::messaging::{Recipients, RecordingDispatcher};
use pollwatch::orchestration::{Coordinator, FlightPoller, FlightPollerSettings, PollError, SpotPricePoller};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn airport(code: &str) -> AirportInfo {
    AirportInfo {
        code: code.to_string(),
        name: code.to_string(),
        city: String::new(),
        timezone: "UTC".to_string(),
    }
}

/// A flight that left the gate a few minutes ago and will keep polling.
fn departed() -> FlightState {
    let now = Utc::now();
    let mut flight = FlightState {
        fa_flight_id: "DAL5-1714500000-airline-0002".to_string(),
        ident: FlightIdent {
            ident: "DAL5".to_string(),
            icao: Some("DAL5".to_string()),
            iata: Some("DL5".to_string()),
        },
        origin: FlightEndpoint {
            code: "KATL".to_string(),
            ..Default::default()
        },
        destination: FlightEndpoint {
            code: "KJFK".to_string(),
            ..Default::default()
        },
        status: "Taxiing / Left Gate".to_string(),
        ..Default::default()
    };
    flight.gate_departure.scheduled = Some(now - ChronoDuration::minutes(10));
    flight.gate_departure.actual = Some(now - ChronoDuration::minutes(5));
    flight.runway_arrival.scheduled = Some(now + ChronoDuration::hours(2));
    flight
}

fn flight_poller(source: MockFlightSource, dispatcher: Arc<RecordingDispatcher>) -> FlightPoller {
    FlightPoller::new(
        Arc::new(source),
        dispatcher,
        Datastore::new(Arc::new(MemoryCache::new(16)), "lavamonster", Duration::from_secs(60)),
        FlightNotificationsConfig::default(),
        Recipients::default(),
    )
    .with_settings(FlightPollerSettings {
        poll_interval: Duration::from_millis(10),
        ..FlightPollerSettings::default()
    })
}

fn spot_poller(dispatcher: Arc<RecordingDispatcher>) -> SpotPricePoller {
    let source = MockSpotPriceSource::new().with_price(Decimal::from_str_canonical("3400").unwrap());
    SpotPricePoller::new(
        Arc::new(source),
        dispatcher,
        Recipients::default(),
        Duration::from_millis(10),
    )
}

#[tokio::test]
async fn test_shutdown_stops_every_session() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let flights = flight_poller(
        MockFlightSource::new()
            .with_flight(departed())
            .with_airport(airport("KATL"))
            .with_airport(airport("KJFK")),
        dispatcher.clone(),
    );
    let spots = spot_poller(dispatcher.clone());

    let mut coordinator = Coordinator::new();
    let flight = coordinator
        .start_flight(&flights, "DL5", IdentType::Designator)
        .await
        .unwrap();
    let spot = coordinator
        .start_spot(&spots, "ETH/USD".parse().unwrap())
        .unwrap();
    assert_eq!(flight, "flight:DL5");
    assert_eq!(spot, "spot:ETH-USD-1");
    assert_eq!(coordinator.len(), 2);

    sleep(Duration::from_millis(50)).await;
    coordinator.shutdown();
    let failures = timeout(Duration::from_secs(5), coordinator.join_all())
        .await
        .expect("sessions should wind down");
    assert!(failures.is_empty(), "{:?}", failures);
    assert!(dispatcher.count() >= 2);
}

#[tokio::test]
async fn test_duplicate_entity_rejected() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let spots = spot_poller(dispatcher);
    let mut coordinator = Coordinator::new();

    coordinator
        .start_spot(&spots, "ETH/USD".parse().unwrap())
        .unwrap();
    let err = coordinator
        .start_spot(&spots, "eth/usd".parse().unwrap())
        .unwrap_err();
    assert!(matches!(err, PollError::AlreadyTracked(ref e) if e == "spot:ETH-USD-1"));

    // A different amount is a different entity.
    coordinator
        .start_spot(&spots, "ETH/USD:5".parse().unwrap())
        .unwrap();
    assert_eq!(coordinator.len(), 2);

    coordinator.shutdown();
    assert!(coordinator.join_all().await.is_empty());
}

#[tokio::test]
async fn test_stop_cancels_one_session() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let spots = spot_poller(dispatcher);
    let mut coordinator = Coordinator::new();
    let eth = coordinator
        .start_spot(&spots, "ETH/USD".parse().unwrap())
        .unwrap();
    coordinator
        .start_spot(&spots, "BTC/USD".parse().unwrap())
        .unwrap();

    assert!(coordinator.stop(&eth));
    assert!(!coordinator.stop("spot:DOGE-USD-1"));
    assert!(!coordinator.cancellation_token().is_cancelled());

    coordinator.shutdown();
    assert!(coordinator.join_all().await.is_empty());
}

#[tokio::test]
async fn test_bootstrap_failure_not_registered() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let flights = flight_poller(
        MockFlightSource::new().with_error(DataSourceError::HttpError {
            status: 503,
            message: "Server error".to_string(),
        }),
        dispatcher,
    );
    let mut coordinator = Coordinator::new();

    let err = coordinator
        .start_flight(&flights, "DL5", IdentType::Designator)
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Bootstrap(DataSourceError::HttpError { status: 503, .. })));
    assert!(coordinator.is_empty());
}

#[tokio::test]
async fn test_join_all_reports_session_failures() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    // Resolves, but the destination airport is unknown.
    let flights = flight_poller(
        MockFlightSource::new()
            .with_flight(departed())
            .with_airport(airport("KATL")),
        dispatcher,
    );
    let mut coordinator = Coordinator::new();
    coordinator
        .start_flight(&flights, "DL5", IdentType::Designator)
        .await
        .unwrap();

    let failures = timeout(Duration::from_secs(5), coordinator.join_all())
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "flight:DL5");
    assert!(matches!(failures[0].1, PollError::Bootstrap(DataSourceError::NotFound(_))));
}

#[tokio::test]
async fn test_finished_session_is_not_replaced() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let flights = flight_poller(
        MockFlightSource::new()
            .with_flight(departed())
            .with_airport(airport("KATL")),
        dispatcher,
    );
    let mut coordinator = Coordinator::new();
    coordinator
        .start_flight(&flights, "DL5", IdentType::Designator)
        .await
        .unwrap();

    // The missing destination airport ends the session with an error.
    timeout(Duration::from_secs(5), async {
        while coordinator.is_running("flight:DL5") {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let err = coordinator
        .start_flight(&flights, "DL5", IdentType::Designator)
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::AlreadyTracked(ref e) if e == "flight:DL5"));
    assert_eq!(coordinator.len(), 1);

    let failures = timeout(Duration::from_secs(5), coordinator.join_all())
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].1, PollError::Bootstrap(DataSourceError::NotFound(_))));
}
