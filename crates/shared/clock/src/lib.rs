//! Conduit Clock Infrastructure
//!
//! Time sources and time-zone plumbing shared by every pipeline stage:
//!
//! - [`SystemClock`]: wall-clock time for live subscriptions
//! - [`ManualClock`]: time that only moves when told to (backtests, tests)
//! - [`TimeZoneOffsetProvider`]: precomputed local/UTC conversion for one zone
//!   over a bounded window
//! - [`Alarm`]: a single background timer that fires a callback at a deadline
//!
//! ## Usage
//!
//! ```ignore
//! use conduit_clock::{ManualClock, TimeZoneOffsetProvider};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(start);
//! clock.advance(Duration::minutes(1));
//!
//! let offsets = TimeZoneOffsetProvider::new(chrono_tz::America::New_York, start, end);
//! let local = offsets.from_utc(clock.now());
//! ```

mod alarm;
mod manual;
mod offset;
mod system;

pub use alarm::Alarm;
pub use manual::ManualClock;
pub use offset::TimeZoneOffsetProvider;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use conduit_ports::Clock;
