use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use conduit_core::Timestamp;
use conduit_core::time::utc_to_local;
use conduit_ports::Clock;

/// Wall-clock time for live subscriptions
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }

    /// Current wall-clock time as read on an exchange in `time_zone`
    pub fn now_in(&self, time_zone: Tz) -> NaiveDateTime {
        utc_to_local(self.now(), time_zone)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
