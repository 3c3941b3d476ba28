//! Derive a flight's life-cycle phase from its milestone times.

use crate::domain::FlightState;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Scheduled departure is still ahead.
    Pending,
    /// Left the gate or the runway, not yet down.
    InProgress,
    /// Landed or reached the arrival gate.
    Arrived,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pending => write!(f, "pending"),
            Phase::InProgress => write!(f, "in progress"),
            Phase::Arrived => write!(f, "arrived"),
        }
    }
}

pub fn departed_gate(state: &FlightState) -> bool {
    state.gate_departure.occurred()
}

pub fn took_off(state: &FlightState) -> bool {
    state.runway_departure.occurred()
}

pub fn landed(state: &FlightState) -> bool {
    state.runway_arrival.occurred()
}

pub fn arrived_gate(state: &FlightState) -> bool {
    state.gate_arrival.occurred()
}

/// Milestone flags for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlightEvents {
    /// Scheduled gate departure is after `now`.
    pub pending: bool,
    pub departed_gate: bool,
    pub took_off: bool,
    pub landed: bool,
    pub arrived_gate: bool,
}

impl FlightEvents {
    pub fn observe(state: &FlightState, now: DateTime<Utc>) -> Self {
        Self {
            pending: state
                .gate_departure
                .scheduled
                .is_some_and(|scheduled| scheduled > now),
            departed_gate: departed_gate(state),
            took_off: took_off(state),
            landed: landed(state),
            arrived_gate: arrived_gate(state),
        }
    }

    /// First matching phase in priority order Pending, InProgress, Arrived.
    ///
    /// `None` covers the gap between a passed schedule and the first actual
    /// time, e.g. a delayed departure.
    pub fn phase(&self) -> Option<Phase> {
        if self.pending {
            Some(Phase::Pending)
        } else if (self.departed_gate || self.took_off) && !(self.landed || self.arrived_gate) {
            Some(Phase::InProgress)
        } else if self.landed || self.arrived_gate {
            Some(Phase::Arrived)
        } else {
            None
        }
    }
}

pub fn classify(state: &FlightState, now: DateTime<Utc>) -> Option<Phase> {
    FlightEvents::observe(state, now).phase()
}
