//! Conduit Core Domain
//!
//! Pure market-data types for the Conduit subscription pipeline.
//! This crate contains no threads, no I/O, and is 100% unit testable.

pub mod entities;
pub mod time;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Corporate actions
    Auxiliary,
    // Stream elements
    DataKind,
    DataPoint,
    DelistingKind,
    Payload,
    // Market data payloads
    Quote,
    TradeBar,
};
pub use values::{Price, Quantity, Resolution, Symbol, Timestamp};
