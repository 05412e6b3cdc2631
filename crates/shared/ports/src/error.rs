use chrono::NaiveDateTime;
use conduit_core::Symbol;
use thiserror::Error;

/// Errors raised inside the subscription pipeline
///
/// None of these unwind past a subscription: they are logged and the affected
/// subscription stops producing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Out of order data for {symbol}: next ends at {next_end} before previous starts at {previous_time}")]
    OutOfOrderData {
        symbol: Symbol,
        previous_time: NaiveDateTime,
        next_end: NaiveDateTime,
    },

    #[error("Data source faulted: {0}")]
    SourceFaulted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
