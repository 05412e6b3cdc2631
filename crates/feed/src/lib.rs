//! Conduit Feed
//!
//! The market-data subscription pipeline. Raw per-instrument streams are turned into
//! gap-free bar streams and delivered either synchronously or through background
//! producers sharing one worker pool.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │  DataStream  │──▶│ AggregatorStream │──▶│ FillForward │──▶│   Subscription   │
//! │ (raw ticks / │   │  (BarAggregator) │   │             │   │ (sync or queued) │
//! │    bars)     │   └─────────────────┘   └─────────────┘   └──────────────────┘
//! └──────────────┘                                                    ▲
//!                         WeightedWorkScheduler ── Producer ──▶ EnqueueableQueue
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use conduit_feed::{SubscriptionBuilder, SubscriptionRequest, IterStream};
//!
//! let request = SubscriptionRequest::new("SPY", Resolution::Minute, start, end, New_York)
//!     .with_fill_forward(Arc::new(Duration::minutes(1)));
//! let subscription = SubscriptionBuilder::new(request, calendar).build(IterStream::new(bars))?;
//! for data in subscription {
//!     println!("{} {}", data.emit_time_utc, data.data.value);
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod fill_forward;
pub mod queue;
pub mod resolution;
pub mod scheduler;
pub mod signal;
pub mod source;
pub mod subscription;

pub use aggregator::{AggregatorStream, BarAggregator};
pub use config::{ConfigError, ConsumerConfig, FeedConfig, SchedulerConfig};
pub use fill_forward::{FillForward, FillForwardParams, FillForwardPhase};
pub use queue::EnqueueableQueue;
pub use resolution::DynamicResolution;
pub use scheduler::{WeightedWorkScheduler, WorkHandle, WorkId, WorkOutcome};
pub use signal::NewDataSignal;
pub use source::{ChannelStream, FallibleStream, IterStream};
pub use subscription::{
    StopHandle, Subscription, SubscriptionBuilder, SubscriptionData, SubscriptionRequest,
};

// Re-export the ports the pipeline is built on
pub use conduit_ports::{
    Advance, Clock, DataStream, ExchangeCalendar, FeedError, FeedResult, ResolutionSource,
};
