//! Conduit Ports
//!
//! Port definitions (traits) for the Conduit subscription pipeline.
//! These define the boundaries between the pipeline stages and their collaborators:
//! time sources, exchange calendars, and the raw data streams being transformed.

mod calendar;
mod clock;
mod error;
mod resolution;
mod stream;

pub use calendar::ExchangeCalendar;
pub use clock::Clock;
pub use error::{FeedError, FeedResult};
pub use resolution::ResolutionSource;
pub use stream::{Advance, DataStream};
