use chrono::NaiveDateTime;
use chrono_tz::Tz;

/// Port for exchange trading hours
///
/// All times are wall-clock times in the exchange's own time zone.
/// Implementations are immutable lookups and are shared across subscriptions.
pub trait ExchangeCalendar: Send + Sync {
    /// Time zone the exchange's sessions are defined in
    fn time_zone(&self) -> Tz;

    /// Whether any session is open at some point within `[start, end)`
    ///
    /// A zero-length interval asks whether the market is open at `start`.
    fn is_open_during_bar(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        extended_market_hours: bool,
    ) -> bool;

    /// First moment strictly after `time` at which the market goes from closed to open
    ///
    /// Returns `NaiveDateTime::MAX` when the market never opens again.
    fn next_market_open(&self, time: NaiveDateTime, extended_market_hours: bool) -> NaiveDateTime;

    /// Get the calendar's name/identifier for debugging
    fn name(&self) -> &str {
        "ExchangeCalendar"
    }
}
