//! Record of which flight notifications have already fired.

use crate::config::FlightNotificationsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flight notification categories in life-cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotificationCategory {
    PreDeparture,
    GateDeparture,
    Takeoff,
    PreArrival,
    Landing,
    GateArrival,
    BaggageClaim,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 7] = [
        NotificationCategory::PreDeparture,
        NotificationCategory::GateDeparture,
        NotificationCategory::Takeoff,
        NotificationCategory::PreArrival,
        NotificationCategory::Landing,
        NotificationCategory::GateArrival,
        NotificationCategory::BaggageClaim,
    ];

    /// Categories implied as sent once `self` fires.
    pub fn prerequisites(self) -> &'static [NotificationCategory] {
        use NotificationCategory::*;
        match self {
            PreDeparture => &[],
            GateDeparture => &[PreDeparture],
            Takeoff => &[PreDeparture, GateDeparture],
            PreArrival => &[PreDeparture],
            Landing => &[PreDeparture, GateDeparture, Takeoff, PreArrival],
            GateArrival => &[PreDeparture, GateDeparture, Takeoff, PreArrival, Landing],
            BaggageClaim => &[],
        }
    }

    /// Baggage claim is optional and never holds a session open.
    pub fn required_for_completion(self) -> bool {
        self != NotificationCategory::BaggageClaim
    }

    pub fn is_enabled(self, config: &FlightNotificationsConfig) -> bool {
        use NotificationCategory::*;
        match self {
            PreDeparture => config.pre_departure.enabled,
            GateDeparture => config.gate_departure,
            Takeoff => config.takeoff,
            PreArrival => config.pre_arrival.enabled,
            Landing => config.landing,
            GateArrival => config.gate_arrival,
            BaggageClaim => config.baggage_claim,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationCategory::PreDeparture => "pre-departure",
            NotificationCategory::GateDeparture => "gate departure",
            NotificationCategory::Takeoff => "takeoff",
            NotificationCategory::PreArrival => "pre-arrival",
            NotificationCategory::Landing => "landing",
            NotificationCategory::GateArrival => "gate arrival",
            NotificationCategory::BaggageClaim => "baggage claim",
        };
        f.write_str(name)
    }
}

/// Bitset of sent categories. Disabled categories are stored as sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentNotifications {
    bits: u8,
}

impl SentNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `category` and every category it implies.
    pub fn mark_sent(&mut self, category: NotificationCategory) {
        self.bits |= category.bit();
        for prerequisite in category.prerequisites() {
            self.bits |= prerequisite.bit();
        }
    }

    pub fn is_sent(&self, category: NotificationCategory) -> bool {
        self.bits & category.bit() != 0
    }

    /// True once every category that counts toward completion is sent.
    pub fn sent_all(&self) -> bool {
        NotificationCategory::ALL
            .iter()
            .filter(|c| c.required_for_completion())
            .all(|c| self.is_sent(*c))
    }

    /// Treat every category switched off in `config` as permanently sent.
    pub fn disable_by_config(&mut self, config: &FlightNotificationsConfig) {
        for category in NotificationCategory::ALL {
            if !category.is_enabled(config) {
                self.bits |= category.bit();
            }
        }
    }

    pub fn pending(&self) -> Vec<NotificationCategory> {
        NotificationCategory::ALL
            .iter()
            .copied()
            .filter(|c| !self.is_sent(*c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NotificationCategory::*;

    #[test]
    fn test_closure_marks_every_prerequisite() {
        for category in NotificationCategory::ALL {
            let mut sent = SentNotifications::new();
            sent.mark_sent(category);
            assert!(sent.is_sent(category), "{} not marked", category);
            for prerequisite in category.prerequisites() {
                assert!(
                    sent.is_sent(*prerequisite),
                    "{} should imply {}",
                    category,
                    prerequisite
                );
            }
        }
    }

    #[test]
    fn test_closure_does_not_mark_later_categories() {
        let mut sent = SentNotifications::new();
        sent.mark_sent(Takeoff);
        assert!(!sent.is_sent(PreArrival));
        assert!(!sent.is_sent(Landing));
        assert!(!sent.is_sent(GateArrival));
    }

    #[test]
    fn test_pre_arrival_only_implies_pre_departure() {
        let mut sent = SentNotifications::new();
        sent.mark_sent(PreArrival);
        assert_eq!(sent.pending(), vec![GateDeparture, Takeoff, Landing, GateArrival, BaggageClaim]);
    }

    #[test]
    fn test_gate_arrival_completes_without_baggage_claim() {
        let mut sent = SentNotifications::new();
        assert!(!sent.sent_all());
        sent.mark_sent(GateArrival);
        assert!(!sent.is_sent(BaggageClaim));
        assert!(sent.sent_all());
    }

    #[test]
    fn test_landing_alone_is_not_complete() {
        let mut sent = SentNotifications::new();
        sent.mark_sent(Landing);
        assert!(!sent.sent_all());
    }

    #[test]
    fn test_disable_by_config() {
        let config = FlightNotificationsConfig {
            gate_arrival: false,
            ..Default::default()
        };
        let mut sent = SentNotifications::new();
        sent.disable_by_config(&config);
        // Defaults disable pre-departure and baggage claim.
        assert!(sent.is_sent(PreDeparture));
        assert!(sent.is_sent(GateArrival));
        assert!(sent.is_sent(BaggageClaim));
        assert!(!sent.is_sent(Landing));
        assert!(!sent.sent_all());

        sent.mark_sent(Landing);
        assert!(sent.sent_all());
    }

    #[test]
    fn test_everything_disabled_is_complete() {
        let config = FlightNotificationsConfig {
            pre_departure: crate::config::PreEventConfig {
                enabled: false,
                offset: std::time::Duration::ZERO,
            },
            pre_arrival: crate::config::PreEventConfig {
                enabled: false,
                offset: std::time::Duration::ZERO,
            },
            gate_departure: false,
            takeoff: false,
            landing: false,
            gate_arrival: false,
            baggage_claim: false,
            use_local_time: false,
        };
        let mut sent = SentNotifications::new();
        sent.disable_by_config(&config);
        assert!(sent.sent_all());
    }
}
