//! Conduit Exchange Calendars
//!
//! Implementations of the exchange calendar port for the Conduit pipeline.

mod market_hours;
mod session;

pub use market_hours::MarketHours;
pub use session::SessionRule;

// Re-export the trait from ports for convenience
pub use conduit_ports::ExchangeCalendar;

/// Factory function to create a calendar by name
pub fn create_calendar(name: &str) -> Box<dyn ExchangeCalendar> {
    match name.to_lowercase().as_str() {
        "24/7" | "always-open" | "crypto" => Box::new(MarketHours::always_open(chrono_tz::UTC)),
        _ => Box::new(MarketHours::us_equity()), // Default
    }
}
