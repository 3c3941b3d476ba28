//! Live data sources for flight status and spot prices.

use crate::domain::{AirportInfo, Decimal, FlightState, IdentType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

pub mod flightaware;
pub mod gemini;
pub mod mock;
pub mod nonce;

pub use flightaware::FlightAwareClient;
pub use gemini::GeminiClient;
pub use mock::{MockFlightSource, MockSpotPriceSource};
pub use nonce::{MonotonicNonce, NonceProvider};

/// Flight status provider.
///
/// Implementations do not retry; callers bound each call with their own timeout.
#[async_trait]
pub trait FlightSource: Send + Sync + fmt::Debug {
    /// Fetch every flight matching `ident`.
    ///
    /// # Returns
    /// All matching flights in provider order. Use [`select_flight`] to pick one.
    async fn fetch_flights(
        &self,
        ident: &str,
        ident_type: IdentType,
    ) -> Result<Vec<FlightState>, DataSourceError>;

    /// Fetch airport metadata by provider airport code.
    async fn fetch_airport(&self, code: &str) -> Result<AirportInfo, DataSourceError>;
}

/// Spot price provider.
#[async_trait]
pub trait SpotPriceSource: Send + Sync + fmt::Debug {
    /// Last traded price for an exchange symbol such as `ETHUSD`.
    async fn fetch_spot_price(&self, symbol: &str) -> Result<Decimal, DataSourceError>;
}

/// Choose the flight a user most likely means.
///
/// A designator matches a whole schedule, so take the earliest flight whose
/// scheduled departure falls today (UTC) or later, else the latest one.
/// A provider flight id takes the earliest match.
pub fn select_flight(
    mut flights: Vec<FlightState>,
    ident_type: IdentType,
    now: DateTime<Utc>,
) -> Option<FlightState> {
    flights.sort_by_key(|f| f.gate_departure.scheduled);
    match ident_type {
        IdentType::FaFlightId => flights.into_iter().next(),
        IdentType::Designator => {
            let today = now.date_naive();
            let upcoming = flights.iter().position(|f| {
                f.gate_departure
                    .scheduled
                    .is_some_and(|s| s.date_naive() >= today)
            });
            match upcoming {
                Some(idx) => Some(flights.swap_remove(idx)),
                None => flights.pop(),
            }
        }
    }
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// The provider has no such flight, airport or symbol
    NotFound(String),
    /// The caller's deadline passed before the provider answered
    Timeout,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::NotFound(what) => write!(f, "Not found: {}", what),
            DataSourceError::Timeout => write!(f, "Timed out"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

impl From<reqwest::Error> for DataSourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataSourceError::Timeout
        } else if err.is_decode() {
            DataSourceError::ParseError(err.to_string())
        } else {
            DataSourceError::NetworkError(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to an error.
pub(crate) fn status_error(status: reqwest::StatusCode, what: &str) -> DataSourceError {
    match status.as_u16() {
        429 => DataSourceError::RateLimited,
        404 => DataSourceError::NotFound(what.to_string()),
        code if status.is_server_error() => DataSourceError::HttpError {
            status: code,
            message: "Server error".to_string(),
        },
        code => DataSourceError::HttpError {
            status: code,
            message: "Client error".to_string(),
        },
    }
}
