use chrono::Duration;
use conduit_core::Timestamp;
use conduit_ports::Clock;
use parking_lot::RwLock;
use std::sync::Arc;

/// Clock that only moves when explicitly advanced or set
///
/// Used to drive backtests and to make live-mode components deterministic in tests:
/// a bar aggregator reading this clock releases a bar exactly when the test says
/// its close time has passed.
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a new manual clock frozen at `initial_time`
    pub fn new(initial_time: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            current_time: RwLock::new(initial_time),
        })
    }

    /// Advance the clock by a specified duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current_time.write();
        *current += duration;
    }

    /// Explicitly set the time
    ///
    /// Warning: This can move time backwards. Use with caution.
    pub fn set_time(&self, time: Timestamp) {
        *self.current_time.write() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current_time.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
