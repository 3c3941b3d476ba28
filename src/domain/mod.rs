//! Domain types shared by the pollers.
//!
//! - Flight snapshots with scheduled/estimated/actual milestone times
//! - Currency pairs and spot quotes backed by a lossless decimal
//! - A clock abstraction for tick timestamps

pub mod clock;
pub mod decimal;
pub mod flight;
pub mod spot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::Decimal;
pub use flight::{AirportInfo, FlightEndpoint, FlightIdent, FlightState, IdentType, MilestoneTimestamps};
pub use spot::{CurrencyPair, SpotQuote};
