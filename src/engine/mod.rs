//! Pure notification logic: dedup record, phase classification and the
//! per-tick decision table. No I/O happens here.

pub mod decision;
pub mod dedup;
pub mod phase;

pub use decision::decide;
pub use dedup::{NotificationCategory, SentNotifications};
pub use phase::{arrived_gate, classify, departed_gate, landed, took_off, FlightEvents, Phase};
