//! Scripted data sources for tests without network calls.

use super::{DataSourceError, FlightSource, SpotPriceSource};
use crate::domain::{AirportInfo, Decimal, FlightState, IdentType};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays queued responses in order; the last one repeats once the queue
/// is down to a single entry.
#[derive(Debug)]
struct Script<T> {
    queue: Mutex<VecDeque<Result<T, DataSourceError>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, response: Result<T, DataSourceError>) {
        self.queue.lock().push_back(response);
    }

    fn next(&self) -> Result<T, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock();
        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(DataSourceError::Other("script exhausted".to_string())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(DataSourceError::Other("nothing scripted".to_string())))
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Mock flight source. Every fetch returns the next scripted snapshot.
#[derive(Debug)]
pub struct MockFlightSource {
    flights: Script<FlightState>,
    airports: HashMap<String, AirportInfo>,
    airport_calls: AtomicUsize,
}

impl MockFlightSource {
    pub fn new() -> Self {
        Self {
            flights: Script::new(),
            airports: HashMap::new(),
            airport_calls: AtomicUsize::new(0),
        }
    }

    /// Queue a successful fetch.
    pub fn with_flight(self, flight: FlightState) -> Self {
        self.flights.push(Ok(flight));
        self
    }

    /// Queue a failed fetch.
    pub fn with_error(self, error: DataSourceError) -> Self {
        self.flights.push(Err(error));
        self
    }

    pub fn with_airport(mut self, airport: AirportInfo) -> Self {
        self.airports.insert(airport.code.clone(), airport);
        self
    }

    /// Queue a snapshot after construction, e.g. from a running test.
    pub fn push_flight(&self, flight: FlightState) {
        self.flights.push(Ok(flight));
    }

    pub fn fetch_count(&self) -> usize {
        self.flights.calls()
    }

    pub fn airport_fetch_count(&self) -> usize {
        self.airport_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockFlightSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlightSource for MockFlightSource {
    async fn fetch_flights(
        &self,
        ident: &str,
        ident_type: IdentType,
    ) -> Result<Vec<FlightState>, DataSourceError> {
        let flight = self.flights.next()?;
        let matches = match ident_type {
            IdentType::FaFlightId => flight.fa_flight_id == ident,
            IdentType::Designator => {
                flight.ident.ident == ident
                    || flight.ident.iata.as_deref() == Some(ident)
                    || flight.ident.icao.as_deref() == Some(ident)
            }
        };
        Ok(if matches { vec![flight] } else { Vec::new() })
    }

    async fn fetch_airport(&self, code: &str) -> Result<AirportInfo, DataSourceError> {
        self.airport_calls.fetch_add(1, Ordering::SeqCst);
        self.airports
            .get(code)
            .cloned()
            .ok_or_else(|| DataSourceError::NotFound(format!("airport {}", code)))
    }
}

/// Mock spot price source.
#[derive(Debug)]
pub struct MockSpotPriceSource {
    prices: Script<Decimal>,
}

impl MockSpotPriceSource {
    pub fn new() -> Self {
        Self {
            prices: Script::new(),
        }
    }

    pub fn with_price(self, price: Decimal) -> Self {
        self.prices.push(Ok(price));
        self
    }

    pub fn with_error(self, error: DataSourceError) -> Self {
        self.prices.push(Err(error));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.prices.calls()
    }
}

impl Default for MockSpotPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpotPriceSource for MockSpotPriceSource {
    async fn fetch_spot_price(&self, _symbol: &str) -> Result<Decimal, DataSourceError> {
        self.prices.next()
    }
}
