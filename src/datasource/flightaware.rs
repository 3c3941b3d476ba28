//! FlightAware AeroAPI client.

use super::{status_error, DataSourceError, FlightSource};
use crate::domain::{AirportInfo, FlightEndpoint, FlightIdent, FlightState, IdentType, MilestoneTimestamps};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct FlightAwareClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for FlightAwareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightAwareClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FlightAwareClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Value, DataSourceError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("x-apikey", &self.api_key)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, what));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| DataSourceError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl FlightSource for FlightAwareClient {
    async fn fetch_flights(
        &self,
        ident: &str,
        ident_type: IdentType,
    ) -> Result<Vec<FlightState>, DataSourceError> {
        debug!(ident = %ident, ident_type = %ident_type, "fetching flights");
        let body = self
            .get_json(
                &format!("flights/{}", ident),
                &[("ident_type", ident_type.as_str())],
                &format!("flight {}", ident),
            )
            .await?;
        parse_flights(&body)
    }

    async fn fetch_airport(&self, code: &str) -> Result<AirportInfo, DataSourceError> {
        debug!(code = %code, "fetching airport");
        let body = self
            .get_json(&format!("airports/{}", code), &[], &format!("airport {}", code))
            .await?;
        parse_airport(&body)
    }
}

fn opt_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn opt_time(value: &Value, key: &str) -> Result<Option<DateTime<Utc>>, DataSourceError> {
    match value.get(key).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", key, e))),
    }
}

fn milestone(value: &Value, suffix: &str) -> Result<MilestoneTimestamps, DataSourceError> {
    Ok(MilestoneTimestamps::new(
        opt_time(value, &format!("scheduled_{}", suffix))?,
        opt_time(value, &format!("estimated_{}", suffix))?,
        opt_time(value, &format!("actual_{}", suffix))?,
    ))
}

fn endpoint(value: &Value, side: &str) -> FlightEndpoint {
    let airport = value.get(side).filter(|v| !v.is_null());
    let code = airport
        .and_then(|a| {
            opt_str(a, "code_iata")
                .or_else(|| opt_str(a, "code_icao"))
                .or_else(|| opt_str(a, "code"))
        })
        .unwrap_or_default();
    FlightEndpoint {
        code,
        gate: opt_str(value, &format!("gate_{}", side)),
        terminal: opt_str(value, &format!("terminal_{}", side)),
    }
}

pub(crate) fn parse_flight(value: &Value) -> Result<FlightState, DataSourceError> {
    let fa_flight_id = opt_str(value, "fa_flight_id")
        .ok_or_else(|| DataSourceError::ParseError("Missing fa_flight_id field".to_string()))?;
    let ident = opt_str(value, "ident")
        .ok_or_else(|| DataSourceError::ParseError("Missing ident field".to_string()))?;

    Ok(FlightState {
        fa_flight_id,
        ident: FlightIdent {
            ident,
            icao: opt_str(value, "ident_icao"),
            iata: opt_str(value, "ident_iata"),
        },
        origin: endpoint(value, "origin"),
        destination: endpoint(value, "destination"),
        gate_departure: milestone(value, "out")?,
        runway_departure: milestone(value, "off")?,
        runway_arrival: milestone(value, "on")?,
        gate_arrival: milestone(value, "in")?,
        baggage_claim: opt_str(value, "baggage_claim"),
        status: opt_str(value, "status").unwrap_or_default(),
        cancelled: value.get("cancelled").and_then(|v| v.as_bool()).unwrap_or(false),
        diverted: value.get("diverted").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

pub(crate) fn parse_flights(body: &Value) -> Result<Vec<FlightState>, DataSourceError> {
    let flights_json = body
        .get("flights")
        .and_then(|v| v.as_array())
        .ok_or_else(|| DataSourceError::ParseError("Expected flights array".to_string()))?;

    let mut flights = Vec::with_capacity(flights_json.len());
    for flight_json in flights_json {
        match parse_flight(flight_json) {
            Ok(flight) => flights.push(flight),
            Err(e) => warn!(error = %e, "skipping unparseable flight"),
        }
    }
    Ok(flights)
}

pub(crate) fn parse_airport(body: &Value) -> Result<AirportInfo, DataSourceError> {
    let code = opt_str(body, "code_iata")
        .or_else(|| opt_str(body, "airport_code"))
        .or_else(|| opt_str(body, "code_icao"))
        .ok_or_else(|| DataSourceError::ParseError("Missing airport_code field".to_string()))?;
    Ok(AirportInfo {
        code,
        name: opt_str(body, "name").unwrap_or_default(),
        city: opt_str(body, "city").unwrap_or_default(),
        timezone: opt_str(body, "timezone").unwrap_or_else(|| "UTC".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn flight_json() -> Value {
        serde_json::json!({
            "ident": "UAL2614",
            "ident_icao": "UAL2614",
            "ident_iata": "UA2614",
            "fa_flight_id": "UAL2614-1714367400-airline-1234",
            "origin": {"code": "KORD", "code_icao": "KORD", "code_iata": "ORD", "code_lid": "ORD"},
            "destination": {"code": "KSFO", "code_icao": "KSFO", "code_iata": "SFO"},
            "gate_origin": "C17",
            "gate_destination": null,
            "terminal_origin": "1",
            "terminal_destination": "3",
            "baggage_claim": "",
            "scheduled_out": "2024-05-01T13:45:00Z",
            "estimated_out": "2024-05-01T13:55:00Z",
            "actual_out": "2024-05-01T13:58:00Z",
            "scheduled_off": "2024-05-01T14:00:00Z",
            "estimated_off": null,
            "actual_off": null,
            "scheduled_on": "2024-05-01T18:20:00Z",
            "estimated_on": "2024-05-01T18:31:00Z",
            "actual_on": null,
            "scheduled_in": "2024-05-01T18:30:00Z",
            "status": "Taxiing / Left Gate",
            "cancelled": false,
            "diverted": false
        })
    }

    #[test]
    fn test_parse_flight_valid() {
        let flight = parse_flight(&flight_json()).unwrap();
        assert_eq!(flight.flight_number(), "UA2614");
        assert_eq!(flight.origin.code, "ORD");
        assert_eq!(flight.origin.gate.as_deref(), Some("C17"));
        assert_eq!(flight.destination.gate, None);
        assert_eq!(flight.destination.terminal.as_deref(), Some("3"));
        assert_eq!(flight.baggage_claim, None);
        assert_eq!(
            flight.gate_departure.actual,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 13, 58, 0).unwrap())
        );
        assert!(flight.gate_departure.occurred());
        assert!(!flight.runway_departure.occurred());
        assert_eq!(flight.gate_arrival.estimated, None);
    }

    #[test]
    fn test_parse_flight_rejects_bad_time() {
        let mut json = flight_json();
        json["actual_out"] = Value::String("yesterday".to_string());
        assert!(matches!(
            parse_flight(&json),
            Err(DataSourceError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_flights_skips_malformed_entries() {
        let body = serde_json::json!({
            "flights": [flight_json(), {"ident": "UAL1"}],
            "links": null,
            "num_pages": 1
        });
        let flights = parse_flights(&body).unwrap();
        assert_eq!(flights.len(), 1);
    }

    #[test]
    fn test_parse_flights_requires_array() {
        let body = serde_json::json!({"error": "nope"});
        assert!(parse_flights(&body).is_err());
    }

    #[test]
    fn test_parse_flight_without_origin() {
        let mut json = flight_json();
        json["origin"] = Value::Null;
        let flight = parse_flight(&json).unwrap();
        assert_eq!(flight.origin.code, "");
    }

    #[test]
    fn test_parse_airport() {
        let body = serde_json::json!({
            "airport_code": "KSFO",
            "code_icao": "KSFO",
            "code_iata": "SFO",
            "name": "San Francisco Int'l",
            "city": "San Francisco",
            "timezone": "America/Los_Angeles"
        });
        let airport = parse_airport(&body).unwrap();
        assert_eq!(airport.code, "SFO");
        assert_eq!(airport.timezone, "America/Los_Angeles");
    }
}
