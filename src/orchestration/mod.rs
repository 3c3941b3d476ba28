//! Poll loops and their coordination.

use crate::datasource::DataSourceError;
use thiserror::Error;

pub mod coordinator;
pub mod flight;
pub mod session;
pub mod spot;

pub use coordinator::Coordinator;
pub use flight::{FlightCacheEntry, FlightPoller, FlightPollerSettings};
pub use session::{SessionHandle, SessionState};
pub use spot::SpotPricePoller;

/// Terminal session errors. Steady-state failures are logged, never returned.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("bootstrap fetch failed: {0}")]
    Bootstrap(#[source] DataSourceError),
    #[error("no flight found for {0}")]
    FlightNotFound(String),
    #[error("{0} is already being polled")]
    AlreadyTracked(String),
    #[error("session aborted: {0}")]
    Aborted(String),
}
