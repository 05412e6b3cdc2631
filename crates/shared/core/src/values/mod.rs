use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

mod resolution;

pub use resolution::Resolution;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value - uses Decimal for precision
pub type Quantity = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Symbol identifier for a subscribed instrument
pub type Symbol = String;
