//! Flight snapshot types as reported by the flight data provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a user-supplied flight identifier should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentType {
    /// Airline designator such as `UA2614`; may match several flights.
    Designator,
    /// The provider's unique flight id.
    FaFlightId,
}

impl IdentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentType::Designator => "designator",
            IdentType::FaFlightId => "fa_flight_id",
        }
    }
}

impl fmt::Display for IdentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "designator" => Ok(IdentType::Designator),
            "fa_flight_id" | "faflightid" => Ok(IdentType::FaFlightId),
            other => Err(format!("unknown identifier type {}", other)),
        }
    }
}

/// Scheduled, estimated and actual time of one life-cycle milestone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneTimestamps {
    pub scheduled: Option<DateTime<Utc>>,
    pub estimated: Option<DateTime<Utc>>,
    pub actual: Option<DateTime<Utc>>,
}

impl MilestoneTimestamps {
    pub fn new(
        scheduled: Option<DateTime<Utc>>,
        estimated: Option<DateTime<Utc>>,
        actual: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            scheduled,
            estimated,
            actual,
        }
    }

    /// A milestone has occurred once the provider reports an actual time.
    pub fn occurred(&self) -> bool {
        self.actual.is_some()
    }

    /// Estimated time, falling back to the schedule when no estimate exists.
    pub fn best_estimate(&self) -> Option<DateTime<Utc>> {
        self.estimated.or(self.scheduled)
    }

    /// Keep a previously observed actual time when a fresh snapshot dropped it.
    /// Returns true if the previous value was carried over.
    fn latch_actual(&mut self, previous: &MilestoneTimestamps) -> bool {
        if self.actual.is_none() && previous.actual.is_some() {
            self.actual = previous.actual;
            return true;
        }
        false
    }
}

/// Flight identifiers in the provider's three code systems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightIdent {
    pub ident: String,
    pub icao: Option<String>,
    pub iata: Option<String>,
}

impl FlightIdent {
    /// Passenger-facing flight number, IATA first.
    pub fn display_code(&self) -> &str {
        self.iata
            .as_deref()
            .or(self.icao.as_deref())
            .unwrap_or(&self.ident)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightEndpoint {
    pub code: String,
    pub gate: Option<String>,
    pub terminal: Option<String>,
}

/// Snapshot of one flight. Replaced wholesale on every successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightState {
    pub fa_flight_id: String,
    pub ident: FlightIdent,
    pub origin: FlightEndpoint,
    pub destination: FlightEndpoint,
    /// Pushback from the origin gate ("out").
    pub gate_departure: MilestoneTimestamps,
    /// Wheels off ("off").
    pub runway_departure: MilestoneTimestamps,
    /// Wheels on ("on").
    pub runway_arrival: MilestoneTimestamps,
    /// Arrival at the destination gate ("in").
    pub gate_arrival: MilestoneTimestamps,
    pub baggage_claim: Option<String>,
    pub status: String,
    pub cancelled: bool,
    pub diverted: bool,
}

impl FlightState {
    pub fn flight_number(&self) -> &str {
        self.ident.display_code()
    }

    /// Merge a fresh snapshot over the previous one.
    ///
    /// The fresh snapshot wins for every field except actual milestone times:
    /// once observed, an actual time is never allowed to revert to unset.
    pub fn reconcile(mut self, previous: &FlightState) -> FlightState {
        let latched = [
            self.gate_departure.latch_actual(&previous.gate_departure),
            self.runway_departure.latch_actual(&previous.runway_departure),
            self.runway_arrival.latch_actual(&previous.runway_arrival),
            self.gate_arrival.latch_actual(&previous.gate_arrival),
        ];
        if latched.iter().any(|l| *l) {
            tracing::debug!(
                fa_flight_id = %self.fa_flight_id,
                "provider dropped an actual milestone time, keeping previous value"
            );
        }
        self
    }

    /// Stable short hash of the flight's identity, used to tag cache entries.
    pub fn identity_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.fa_flight_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.ident.ident.as_bytes());
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}

/// Airport metadata needed to render local times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirportInfo {
    pub code: String,
    pub name: String,
    pub city: String,
    /// IANA zone name, e.g. `America/Chicago`.
    pub timezone: String,
}
