use std::time::{Duration, Instant};

/// The two relay channels the device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayId {
    Relay1,
    Relay2,
}

impl RelayId {
    pub const ALL: [RelayId; 2] = [RelayId::Relay1, RelayId::Relay2];

    /// Path segment on the device, doubling as the persisted state key.
    pub fn key(self) -> &'static str {
        match self {
            RelayId::Relay1 => "relay1",
            RelayId::Relay2 => "relay2",
        }
    }

    /// Key the display name is persisted under.
    pub fn name_key(self) -> &'static str {
        match self {
            RelayId::Relay1 => "relay1_name",
            RelayId::Relay2 => "relay2_name",
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            RelayId::Relay1 => "Relay 1",
            RelayId::Relay2 => "Relay 2",
        }
    }

    pub fn index(self) -> usize {
        match self {
            RelayId::Relay1 => 0,
            RelayId::Relay2 => 1,
        }
    }
}

/// One relay as the panel knows it. The device is never consulted before
/// showing this; it is whatever was persisted, until a state read says
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    pub is_on: bool,
    pub name: String,
}

impl RelayState {
    pub fn default_for(relay: RelayId) -> Self {
        Self {
            is_on: false,
            name: relay.default_name().to_owned(),
        }
    }
}

/// One-shot countdown armed against a relay. Lives only in process memory
/// and dies with it.
///
/// All time arithmetic takes the current `Instant` from the caller so the
/// countdown can be exercised in tests without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct CountdownTimer {
    armed_at: Instant,
    duration: Duration,
    initial_state: bool,
}

impl CountdownTimer {
    pub fn new(duration_secs: u64, initial_state: bool, now: Instant) -> Self {
        Self {
            armed_at: now,
            duration: Duration::from_secs(duration_secs),
            initial_state,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.duration.saturating_sub(now.duration_since(self.armed_at))
    }

    /// Whole seconds left, for the countdown label.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        self.remaining(now).as_secs()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now) == Duration::ZERO
    }

    /// The state the relay flips to on expiry: the opposite of whatever it
    /// was when the timer was armed, no matter what happened in between.
    pub fn target_state(&self) -> bool {
        !self.initial_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_device_paths() {
        assert_eq!(RelayId::Relay1.key(), "relay1");
        assert_eq!(RelayId::Relay2.key(), "relay2");
        assert_eq!(RelayId::Relay1.name_key(), "relay1_name");
        assert_eq!(RelayId::Relay2.name_key(), "relay2_name");
    }

    #[test]
    fn countdown_runs_down_and_expires() {
        let t0 = Instant::now();
        let timer = CountdownTimer::new(10, false, t0);

        assert_eq!(timer.remaining_secs(t0), 10);
        assert!(!timer.is_expired(t0));

        assert_eq!(timer.remaining_secs(t0 + Duration::from_secs(3)), 7);

        assert!(timer.is_expired(t0 + Duration::from_secs(10)));
        assert_eq!(timer.remaining(t0 + Duration::from_secs(60)), Duration::ZERO);
    }

    #[test]
    fn target_is_negation_of_armed_state() {
        let t0 = Instant::now();
        assert!(CountdownTimer::new(5, false, t0).target_state());
        assert!(!CountdownTimer::new(5, true, t0).target_state());
    }

    #[test]
    fn zero_second_timer_is_expired_immediately() {
        let t0 = Instant::now();
        let timer = CountdownTimer::new(0, true, t0);
        assert!(timer.is_expired(t0));
        assert!(!timer.target_state());
    }
}
