//! Subscriptions
//!
//! A [`Subscription`] is the consumer-facing handle for one instrument. The
//! [`SubscriptionBuilder`] stacks the pipeline stages over a raw [`DataStream`]:
//!
//! ```text
//! raw ──▶ AggregatorStream (ticks → bars) ──▶ FillForward ──▶ consumer
//! ```
//!
//! Built with [`SubscriptionBuilder::build`], the consumer pulls through the whole
//! stack on its own thread. Built with [`SubscriptionBuilder::schedule`], a producer
//! on the shared [`WeightedWorkScheduler`] pulls the stack and fills an
//! [`EnqueueableQueue`] the consumer drains.

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use conduit_clock::TimeZoneOffsetProvider;
use conduit_core::{DataPoint, Resolution, Symbol, Timestamp};
use conduit_ports::{
    Advance, Clock, DataStream, ExchangeCalendar, FeedError, FeedResult, ResolutionSource,
};
use log::{debug, error, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::aggregator::{AggregatorStream, BarAggregator};
use crate::config::ConsumerConfig;
use crate::fill_forward::{FillForward, FillForwardParams};
use crate::queue::EnqueueableQueue;
use crate::scheduler::{WeightedWorkScheduler, WorkHandle, WorkOutcome};
use crate::signal::NewDataSignal;

/// What to subscribe to
#[derive(Clone)]
pub struct SubscriptionRequest {
    pub symbol: Symbol,
    /// Period of the bars the consumer receives
    pub data_resolution: Resolution,
    /// Fill-forward cadence; `None` disables fill-forward
    pub fill_forward_resolution: Option<Arc<dyn ResolutionSource>>,
    pub extended_market_hours: bool,
    pub start_utc: Timestamp,
    pub end_utc: Timestamp,
    /// Zone the source's bar boundaries are defined in
    pub data_time_zone: Tz,
    /// Zone of the exchange calendar; stream times are local to it
    pub exchange_time_zone: Tz,
}

impl SubscriptionRequest {
    /// Request without fill-forward whose data is stamped in the exchange's zone
    pub fn new(
        symbol: impl Into<Symbol>,
        data_resolution: Resolution,
        start_utc: Timestamp,
        end_utc: Timestamp,
        exchange_time_zone: Tz,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            data_resolution,
            fill_forward_resolution: None,
            extended_market_hours: false,
            start_utc,
            end_utc,
            data_time_zone: exchange_time_zone,
            exchange_time_zone,
        }
    }

    pub fn with_fill_forward(mut self, resolution: Arc<dyn ResolutionSource>) -> Self {
        self.fill_forward_resolution = Some(resolution);
        self
    }

    pub fn with_extended_market_hours(mut self, extended: bool) -> Self {
        self.extended_market_hours = extended;
        self
    }

    pub fn with_data_time_zone(mut self, time_zone: Tz) -> Self {
        self.data_time_zone = time_zone;
        self
    }
}

/// One element delivered to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionData {
    pub data: DataPoint,
    /// `data.end_time` in UTC, the instant the element becomes visible
    pub emit_time_utc: Timestamp,
}

/// Assembles the pipeline for one subscription
pub struct SubscriptionBuilder {
    request: SubscriptionRequest,
    calendar: Arc<dyn ExchangeCalendar>,
    aggregation_clock: Option<Arc<dyn Clock>>,
    live: bool,
    consumer: ConsumerConfig,
}

impl SubscriptionBuilder {
    pub fn new(request: SubscriptionRequest, calendar: Arc<dyn ExchangeCalendar>) -> Self {
        Self {
            request,
            calendar,
            aggregation_clock: None,
            live: false,
            consumer: ConsumerConfig::default(),
        }
    }

    /// The raw stream carries ticks: aggregate them into `data_resolution` bars
    pub fn aggregate_ticks(mut self, clock: Arc<dyn Clock>) -> Self {
        self.aggregation_clock = Some(clock);
        self
    }

    /// Bars close on the clock rather than on the next tick
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    pub fn consumer(mut self, consumer: ConsumerConfig) -> Self {
        self.consumer = consumer;
        self
    }

    fn offsets(&self) -> FeedResult<Arc<TimeZoneOffsetProvider>> {
        let request = &self.request;
        if request.end_utc < request.start_utc {
            return Err(FeedError::InvalidConfiguration(format!(
                "{}: subscription ends at {} before it starts at {}",
                request.symbol, request.end_utc, request.start_utc
            )));
        }
        if self.calendar.time_zone() != request.exchange_time_zone {
            return Err(FeedError::InvalidConfiguration(format!(
                "{}: calendar {} runs in {} but the request says {}",
                request.symbol,
                self.calendar.name(),
                self.calendar.time_zone(),
                request.exchange_time_zone
            )));
        }

        let margin = Duration::days(1);
        Ok(Arc::new(TimeZoneOffsetProvider::new(
            request.exchange_time_zone,
            request
                .start_utc
                .checked_sub_signed(margin)
                .unwrap_or(request.start_utc),
            request
                .end_utc
                .checked_add_signed(margin)
                .unwrap_or(request.end_utc),
        )))
    }

    fn assemble<S>(
        &self,
        raw: S,
        offsets: &Arc<TimeZoneOffsetProvider>,
        signal: &Arc<NewDataSignal>,
    ) -> FeedResult<Box<dyn DataStream>>
    where
        S: DataStream + 'static,
    {
        let request = &self.request;
        let mut stream: Box<dyn DataStream> = Box::new(raw);

        if let Some(clock) = &self.aggregation_clock {
            let bar_size = request.data_resolution.to_duration();
            let aggregator = if self.live {
                let signal = Arc::downgrade(signal);
                BarAggregator::live(bar_size, Arc::clone(offsets), Arc::clone(clock), move || {
                    if let Some(signal) = signal.upgrade() {
                        signal.notify();
                    }
                })?
            } else {
                BarAggregator::new(bar_size, Arc::clone(offsets), Arc::clone(clock))?
            };
            stream = Box::new(AggregatorStream::new(stream, aggregator));
        }

        if let Some(fill_forward_resolution) = &request.fill_forward_resolution {
            let params = FillForwardParams {
                data_resolution: request.data_resolution.to_duration(),
                fill_forward_resolution: Arc::clone(fill_forward_resolution),
                extended_market_hours: request.extended_market_hours,
                subscription_end: offsets.from_utc(request.end_utc),
                data_time_zone: request.data_time_zone,
            };
            stream = Box::new(FillForward::new(
                stream,
                Arc::clone(&self.calendar),
                Arc::clone(offsets),
                params,
            )?);
        }

        Ok(stream)
    }

    /// Subscription pulled synchronously by the consumer
    pub fn build<S>(self, raw: S) -> FeedResult<Subscription>
    where
        S: DataStream + 'static,
    {
        let offsets = self.offsets()?;
        let signal = NewDataSignal::new();
        let stream = self.assemble(raw, &offsets, &signal)?;
        debug!("{}: synchronous subscription built", self.request.symbol);

        Ok(Subscription::new(
            self.request,
            offsets,
            signal,
            Source::Synchronous(stream),
            &self.consumer,
        ))
    }

    /// Subscription whose stack is pulled by a producer on `scheduler`
    pub fn schedule<S>(self, raw: S, scheduler: &WeightedWorkScheduler) -> FeedResult<Subscription>
    where
        S: DataStream + 'static,
    {
        let offsets = self.offsets()?;
        let signal = NewDataSignal::new();
        let stream = self.assemble(raw, &offsets, &signal)?;

        let queue = Arc::new(EnqueueableQueue::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let mut producer = Producer {
            symbol: self.request.symbol.clone(),
            stream,
            queue: Arc::clone(&queue),
            stopped: Arc::clone(&stopped),
        };

        let backlog = Arc::clone(&queue);
        let handle = scheduler.queue_work(
            move |batch_size| producer.produce(batch_size),
            move || {
                if backlog.has_finished() {
                    0
                } else {
                    backlog.len()
                }
            },
        );
        signal.bind(handle.clone());
        info!("{}: scheduled as work {}", self.request.symbol, handle.id());

        let mut subscription = Subscription::new(
            self.request,
            offsets,
            signal,
            Source::Worker { queue, handle },
            &self.consumer,
        );
        subscription.stopped = stopped;
        Ok(subscription)
    }
}

/// Worker-side half of a scheduled subscription
///
/// Dropping it closes the stream and finishes the queue, so the consumer sees the
/// end of data whether the producer finished, faulted or was discarded by the
/// scheduler.
struct Producer {
    symbol: Symbol,
    stream: Box<dyn DataStream>,
    queue: Arc<EnqueueableQueue<DataPoint>>,
    stopped: Arc<AtomicBool>,
}

impl Producer {
    fn produce(&mut self, batch_size: usize) -> WorkOutcome {
        let mut produced = 0;
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return WorkOutcome::Finished;
            }
            match self.stream.advance() {
                Ok(Advance::Ready(point)) => {
                    if !self.queue.enqueue(point) {
                        return WorkOutcome::Finished;
                    }
                    produced += 1;
                    if produced >= batch_size {
                        return WorkOutcome::Continue;
                    }
                }
                Ok(Advance::Pending) => return WorkOutcome::Idle,
                Ok(Advance::Done) => return WorkOutcome::Finished,
                Err(e) => {
                    error!("{}: {}", self.symbol, e);
                    return WorkOutcome::Finished;
                }
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stream.close();
        self.queue.stop();
        debug!("{}: producer finished", self.symbol);
    }
}

enum Source {
    Synchronous(Box<dyn DataStream>),
    Worker {
        queue: Arc<EnqueueableQueue<DataPoint>>,
        handle: WorkHandle,
    },
}

/// Stops a subscription from another thread
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    queue: Option<Arc<EnqueueableQueue<DataPoint>>>,
    signal: Arc<NewDataSignal>,
}

impl StopHandle {
    /// No element is enqueued after this returns; a blocked consumer wakes up
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(queue) = &self.queue {
            queue.stop();
        }
        self.signal.notify();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Consumer handle for one instrument's transformed data
pub struct Subscription {
    request: SubscriptionRequest,
    offsets: Arc<TimeZoneOffsetProvider>,
    signal: Arc<NewDataSignal>,
    source: Source,
    stopped: Arc<AtomicBool>,
    dequeue_timeout: std::time::Duration,
    finished: bool,
}

impl Subscription {
    fn new(
        request: SubscriptionRequest,
        offsets: Arc<TimeZoneOffsetProvider>,
        signal: Arc<NewDataSignal>,
        source: Source,
        consumer: &ConsumerConfig,
    ) -> Self {
        Self {
            request,
            offsets,
            signal,
            source,
            stopped: Arc::new(AtomicBool::new(false)),
            dequeue_timeout: consumer.dequeue_timeout(),
            finished: false,
        }
    }

    pub fn request(&self) -> &SubscriptionRequest {
        &self.request
    }

    pub fn symbol(&self) -> &str {
        &self.request.symbol
    }

    pub fn offsets(&self) -> &Arc<TimeZoneOffsetProvider> {
        &self.offsets
    }

    /// Exchange-local end of the subscription
    pub fn end_time(&self) -> NaiveDateTime {
        self.offsets.from_utc(self.request.end_utc)
    }

    pub fn is_worker(&self) -> bool {
        matches!(self.source, Source::Worker { .. })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Signal a live source raises after making data available
    pub fn new_data_signal(&self) -> Arc<NewDataSignal> {
        Arc::clone(&self.signal)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopped: Arc::clone(&self.stopped),
            queue: match &self.source {
                Source::Worker { queue, .. } => Some(Arc::clone(queue)),
                Source::Synchronous(_) => None,
            },
            signal: Arc::clone(&self.signal),
        }
    }

    /// Next element without blocking
    ///
    /// `Pending` means a live source has nothing yet; `Done` is final.
    pub fn move_next(&mut self) -> Advance<SubscriptionData> {
        self.step(false)
    }

    /// Next element, waiting for live data; `None` once the subscription has ended
    pub fn next_blocking(&mut self) -> Option<SubscriptionData> {
        loop {
            match self.step(true) {
                Advance::Ready(data) => return Some(data),
                Advance::Pending => continue,
                Advance::Done => return None,
            }
        }
    }

    /// Stop the subscription; the stream is closed and nothing more is produced
    pub fn stop(&mut self) {
        self.stop_handle().stop();
        self.finish();
    }

    fn step(&mut self, wait: bool) -> Advance<SubscriptionData> {
        if self.finished {
            return Advance::Done;
        }
        if self.stopped.load(Ordering::Acquire) {
            self.finish();
            return Advance::Done;
        }

        let next = match &mut self.source {
            Source::Synchronous(stream) => match stream.advance() {
                Ok(Advance::Pending) if wait => {
                    self.signal.wait_timeout(self.dequeue_timeout);
                    Advance::Pending
                }
                Ok(next) => next,
                Err(e) => {
                    error!("{}: {}", self.request.symbol, e);
                    Advance::Done
                }
            },
            Source::Worker { queue, .. } if wait => queue.dequeue_timeout(self.dequeue_timeout),
            Source::Worker { queue, .. } => queue.try_dequeue(),
        };

        match next {
            Advance::Ready(data) => Advance::Ready(self.wrap(data)),
            Advance::Pending => Advance::Pending,
            Advance::Done => {
                self.finish();
                Advance::Done
            }
        }
    }

    fn wrap(&self, data: DataPoint) -> SubscriptionData {
        SubscriptionData {
            emit_time_utc: self.offsets.to_utc(data.end_time),
            data,
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.stopped.store(true, Ordering::Release);
        match &mut self.source {
            Source::Synchronous(stream) => stream.close(),
            Source::Worker { queue, handle } => {
                queue.stop();
                // Let a parked producer observe the stop and release its stream
                handle.wake();
            }
        }
        debug!("{}: subscription finished", self.request.symbol);
    }
}

impl Iterator for Subscription {
    type Item = SubscriptionData;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_blocking()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish();
    }
}
