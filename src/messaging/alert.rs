//! Flight and spot price notification payloads.

use super::Message;
use crate::domain::{AirportInfo, Decimal, FlightEndpoint, FlightState, MilestoneTimestamps, SpotQuote};
use crate::engine::NotificationCategory;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const TIME_FORMAT: &str = "%a %b %-d %H:%M";

/// Format `at` in the airport's zone when asked to and the zone is known,
/// otherwise in UTC.
pub fn format_time(at: Option<DateTime<Utc>>, airport: &AirportInfo, local: bool) -> String {
    let Some(at) = at else {
        return "unknown".to_string();
    };
    let zone = if local {
        airport.timezone.parse::<Tz>().ok()
    } else {
        None
    };
    match zone {
        Some(tz) => at.with_timezone(&tz).format(&format!("{} %Z", TIME_FORMAT)).to_string(),
        None => format!("{} UTC", at.format(TIME_FORMAT)),
    }
}

fn place(airport: &AirportInfo, endpoint: &FlightEndpoint) -> String {
    let code = if airport.code.is_empty() {
        endpoint.code.as_str()
    } else {
        airport.code.as_str()
    };
    if airport.city.is_empty() {
        code.to_string()
    } else {
        format!("{} ({})", code, airport.city)
    }
}

fn gate_line(endpoint: &FlightEndpoint) -> Option<String> {
    match (&endpoint.gate, &endpoint.terminal) {
        (Some(gate), Some(terminal)) => Some(format!("Terminal {}, gate {}", terminal, gate)),
        (Some(gate), None) => Some(format!("Gate {}", gate)),
        (None, Some(terminal)) => Some(format!("Terminal {}", terminal)),
        (None, None) => None,
    }
}

/// One flight milestone notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightAlert {
    pub category: NotificationCategory,
    pub flight: FlightState,
    pub origin: AirportInfo,
    pub destination: AirportInfo,
    pub use_local_time: bool,
}

impl FlightAlert {
    pub fn new(
        category: NotificationCategory,
        flight: &FlightState,
        origin: &AirportInfo,
        destination: &AirportInfo,
        use_local_time: bool,
    ) -> Self {
        Self {
            category,
            flight: flight.clone(),
            origin: origin.clone(),
            destination: destination.clone(),
            use_local_time,
        }
    }

    fn at_origin(&self, t: Option<DateTime<Utc>>) -> String {
        format_time(t, &self.origin, self.use_local_time)
    }

    fn at_destination(&self, t: Option<DateTime<Utc>>) -> String {
        format_time(t, &self.destination, self.use_local_time)
    }

    fn arrival_estimate(&self) -> Option<DateTime<Utc>> {
        let f = &self.flight;
        f.gate_arrival
            .best_estimate()
            .or_else(|| f.runway_arrival.best_estimate())
    }

    fn departure_estimate(m: &MilestoneTimestamps) -> Option<DateTime<Utc>> {
        m.actual.or_else(|| m.best_estimate())
    }

    fn headline(&self) -> String {
        let f = &self.flight;
        let number = f.flight_number();
        let from = place(&self.origin, &f.origin);
        let to = place(&self.destination, &f.destination);
        match self.category {
            NotificationCategory::PreDeparture => format!(
                "{} departs {} at {}",
                number,
                from,
                self.at_origin(Self::departure_estimate(&f.gate_departure))
            ),
            NotificationCategory::GateDeparture => format!(
                "{} left the gate at {} at {}",
                number,
                from,
                self.at_origin(f.gate_departure.actual)
            ),
            NotificationCategory::Takeoff => format!(
                "{} took off from {} at {}",
                number,
                from,
                self.at_origin(f.runway_departure.actual)
            ),
            NotificationCategory::PreArrival => format!(
                "{} arrives at {} at {}",
                number,
                to,
                self.at_destination(self.arrival_estimate())
            ),
            NotificationCategory::Landing => format!(
                "{} landed at {} at {}",
                number,
                to,
                self.at_destination(f.runway_arrival.actual)
            ),
            NotificationCategory::GateArrival => format!(
                "{} arrived at the gate at {} at {}",
                number,
                to,
                self.at_destination(f.gate_arrival.actual)
            ),
            NotificationCategory::BaggageClaim => {
                format!("Baggage for {} is arriving at {}", number, to)
            }
        }
    }

    fn details(&self) -> Vec<String> {
        let f = &self.flight;
        let mut lines = Vec::new();
        match self.category {
            NotificationCategory::PreDeparture => {
                lines.push(format!(
                    "Scheduled departure: {}",
                    self.at_origin(f.gate_departure.scheduled)
                ));
                lines.extend(gate_line(&f.origin));
            }
            NotificationCategory::GateDeparture | NotificationCategory::Takeoff => {
                lines.push(format!(
                    "Estimated arrival at {}: {}",
                    place(&self.destination, &f.destination),
                    self.at_destination(self.arrival_estimate())
                ));
            }
            NotificationCategory::PreArrival => {
                lines.push(format!(
                    "Scheduled arrival: {}",
                    self.at_destination(f.gate_arrival.scheduled)
                ));
                lines.extend(gate_line(&f.destination));
            }
            NotificationCategory::Landing | NotificationCategory::GateArrival => {
                lines.extend(gate_line(&f.destination));
            }
            NotificationCategory::BaggageClaim => {}
        }
        if let Some(claim) = &f.baggage_claim {
            if matches!(
                self.category,
                NotificationCategory::Landing
                    | NotificationCategory::GateArrival
                    | NotificationCategory::BaggageClaim
            ) {
                lines.push(format!("Baggage claim {}", claim));
            }
        }
        lines
    }
}

impl Message for FlightAlert {
    fn render_plaintext(&self) -> String {
        let mut text = format!("{}.", self.headline());
        for line in self.details() {
            text.push('\n');
            text.push_str(&line);
        }
        text
    }

    fn render_rich(&self) -> String {
        let mut text = format!("*{}*", self.headline());
        for line in self.details() {
            text.push_str("\n• ");
            text.push_str(&line);
        }
        text
    }
}

/// Periodic spot price update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotPriceAlert {
    pub quote: SpotQuote,
}

impl SpotPriceAlert {
    pub fn new(quote: SpotQuote) -> Self {
        Self { quote }
    }

    /// Amount and value to show. Falls back to the unit price when the
    /// configured amount overflows the total.
    fn amount_and_value(&self) -> (Decimal, Decimal) {
        let q = &self.quote;
        match q.total() {
            Some(total) => (q.pair.amount, total.round_dp(2)),
            None => (Decimal::one(), q.price.round_dp(2)),
        }
    }
}

impl Message for SpotPriceAlert {
    fn render_plaintext(&self) -> String {
        let q = &self.quote;
        let (amount, value) = self.amount_and_value();
        format!(
            "{} {} = {} {} as of {} UTC",
            amount,
            q.pair.base,
            value,
            q.pair.quote,
            q.at.format("%Y-%m-%d %H:%M:%S")
        )
    }

    fn render_rich(&self) -> String {
        let q = &self.quote;
        let (amount, value) = self.amount_and_value();
        format!(
            "*{}* {} {} = `{}` {}\n_{} UTC_",
            q.pair,
            amount,
            q.pair.base,
            value,
            q.pair.quote,
            q.at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
