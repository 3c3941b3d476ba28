//! Pick the single flight notification to send on a tick.

use super::dedup::{NotificationCategory, SentNotifications};
use super::phase::{FlightEvents, Phase};
use crate::config::FlightNotificationsConfig;
use crate::domain::FlightState;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// True when `target` is at most `offset` after `now`. Past targets qualify.
fn within(target: Option<DateTime<Utc>>, now: DateTime<Utc>, offset: Duration) -> bool {
    let Some(target) = target else {
        return false;
    };
    match chrono::Duration::from_std(offset) {
        Ok(offset) => target - now <= offset,
        Err(_) => true,
    }
}

/// Choose at most one category to dispatch. `now` is the tick timestamp and
/// is used for every comparison.
pub fn decide(
    state: &FlightState,
    sent: &SentNotifications,
    config: &FlightNotificationsConfig,
    now: DateTime<Utc>,
) -> Option<NotificationCategory> {
    use NotificationCategory::*;

    let events = FlightEvents::observe(state, now);
    match events.phase()? {
        Phase::Pending => {
            let due = within(
                state.gate_departure.scheduled,
                now,
                config.pre_departure.offset,
            );
            (!sent.is_sent(PreDeparture) && due).then_some(PreDeparture)
        }
        Phase::InProgress => {
            let arrival_due = within(
                state.runway_arrival.best_estimate(),
                now,
                config.pre_arrival.offset,
            );
            if !sent.is_sent(PreArrival) && arrival_due {
                Some(PreArrival)
            } else if sent.is_sent(GateDeparture) && sent.is_sent(Takeoff) {
                None
            } else if events.departed_gate && !events.took_off {
                (!sent.is_sent(GateDeparture)).then_some(GateDeparture)
            } else if events.took_off {
                (!sent.is_sent(Takeoff)).then_some(Takeoff)
            } else {
                None
            }
        }
        Phase::Arrived => {
            if sent.is_sent(GateArrival) && sent.is_sent(Landing) {
                None
            } else if events.landed && !events.arrived_gate {
                (!sent.is_sent(Landing)).then_some(Landing)
            } else if events.arrived_gate {
                // Gate arrival switched off but landing still owed.
                if sent.is_sent(GateArrival) {
                    Some(Landing)
                } else {
                    Some(GateArrival)
                }
            } else {
                None
            }
        }
    }
}
