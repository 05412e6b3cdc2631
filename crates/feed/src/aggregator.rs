//! Tick-to-bar aggregation
//!
//! [`BarAggregator`] folds ticks into a single working bar. The bar is handed to
//! the consumer either when the clock passes its close (live) or when a tick for a
//! later bar displaces it (replay). In live mode an alarm fires at the bar's close
//! so a waiting consumer is woken even if no further ticks arrive.

use chrono::{Duration, NaiveDateTime};
use conduit_clock::{Alarm, TimeZoneOffsetProvider};
use conduit_core::time::round_down;
use conduit_core::{DataPoint, Payload, Quote, Symbol, Timestamp, TradeBar};
use conduit_ports::{Advance, Clock, DataStream, FeedError, FeedResult};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Bar under construction
#[derive(Debug, Clone)]
struct WorkingBar {
    symbol: Symbol,
    time: NaiveDateTime,
    end_time: NaiveDateTime,
    end_utc: Timestamp,
    trade: TradeBar,
    has_trades: bool,
    quote: Option<Quote>,
}

impl WorkingBar {
    fn open(point: &DataPoint, time: NaiveDateTime, end_time: NaiveDateTime, end_utc: Timestamp) -> Self {
        let mut bar = Self {
            symbol: point.symbol.clone(),
            time,
            end_time,
            end_utc,
            trade: TradeBar::seeded(point.value),
            has_trades: false,
            quote: None,
        };
        bar.fold(point);
        bar
    }

    fn fold(&mut self, point: &DataPoint) {
        match &point.payload {
            Payload::Trade(trade) if self.has_trades => self.trade.update(trade),
            Payload::Trade(trade) => {
                self.trade = *trade;
                self.has_trades = true;
            }
            Payload::Quote(quote) => {
                match self.quote.as_mut() {
                    Some(latest) => latest.update(quote),
                    None => {
                        if !self.has_trades {
                            // Seed the price range from the first mid
                            self.trade = TradeBar::seeded(quote.mid().unwrap_or(point.value));
                        }
                        self.quote = Some(*quote);
                    }
                }
            }
            Payload::Auxiliary(_) => {}
        }
    }

    fn into_data_point(self) -> DataPoint {
        match self.quote {
            Some(quote) if !self.has_trades => {
                let value = quote.mid().unwrap_or(self.trade.close);
                DataPoint::new(self.symbol, self.time, self.end_time, value, Payload::Quote(quote))
            }
            _ => DataPoint::new(
                self.symbol,
                self.time,
                self.end_time,
                self.trade.close,
                Payload::Trade(self.trade),
            ),
        }
    }
}

struct AggregatorInner {
    bar_size: Duration,
    offsets: Arc<TimeZoneOffsetProvider>,
    clock: Arc<dyn Clock>,
    working: Mutex<Option<WorkingBar>>,
    finished: AtomicBool,
    alarm: Option<Alarm>,
}

/// Single-slot tick-to-bar aggregator
///
/// Cloning shares the same working bar, so a producer thread can `process` while a
/// consumer thread calls `advance`.
#[derive(Clone)]
pub struct BarAggregator {
    inner: Arc<AggregatorInner>,
}

impl BarAggregator {
    /// Pull-driven aggregator (replay and backtests)
    pub fn new(
        bar_size: Duration,
        offsets: Arc<TimeZoneOffsetProvider>,
        clock: Arc<dyn Clock>,
    ) -> FeedResult<Self> {
        Self::build(bar_size, offsets, clock, None)
    }

    /// Live aggregator that calls `on_bar_close` when the working bar's close time arrives
    pub fn live<F>(
        bar_size: Duration,
        offsets: Arc<TimeZoneOffsetProvider>,
        clock: Arc<dyn Clock>,
        on_bar_close: F,
    ) -> FeedResult<Self>
    where
        F: Fn() + Send + 'static,
    {
        Self::validate(bar_size)?;
        let alarm = Alarm::spawn(format!("bars-{}s", bar_size.num_seconds()), on_bar_close)
            .map_err(|e| FeedError::Spawn(e.to_string()))?;
        Self::build(bar_size, offsets, clock, Some(alarm))
    }

    fn validate(bar_size: Duration) -> FeedResult<()> {
        if bar_size <= Duration::zero() {
            return Err(FeedError::InvalidConfiguration(format!(
                "bar size must be positive, got {}",
                bar_size
            )));
        }
        Ok(())
    }

    fn build(
        bar_size: Duration,
        offsets: Arc<TimeZoneOffsetProvider>,
        clock: Arc<dyn Clock>,
        alarm: Option<Alarm>,
    ) -> FeedResult<Self> {
        Self::validate(bar_size)?;
        Ok(Self {
            inner: Arc::new(AggregatorInner {
                bar_size,
                offsets,
                clock,
                working: Mutex::new(None),
                finished: AtomicBool::new(false),
                alarm,
            }),
        })
    }

    pub fn bar_size(&self) -> Duration {
        self.inner.bar_size
    }

    pub fn is_live(&self) -> bool {
        self.inner.alarm.is_some()
    }

    pub fn has_working_bar(&self) -> bool {
        self.inner.working.lock().is_some()
    }

    /// Fold a tick (or a finer bar) into the working bar
    ///
    /// Returns the previous working bar if `point` belongs to a later bar.
    pub fn process(&self, point: &DataPoint) -> Option<DataPoint> {
        if point.is_auxiliary() {
            return None;
        }
        if self.inner.finished.load(Ordering::Acquire) {
            warn!("{}: tick at {} after aggregator finished; ignored", point.symbol, point.time);
            return None;
        }

        let mut slot = self.inner.working.lock();
        let displaced = if slot.as_ref().is_some_and(|bar| point.time >= bar.end_time) {
            slot.take().map(WorkingBar::into_data_point)
        } else {
            None
        };

        match slot.as_mut() {
            Some(bar) => bar.fold(point),
            None => {
                let time = round_down(point.time, self.inner.bar_size);
                let end_time = time + self.inner.bar_size;
                let end_utc = self.inner.offsets.to_utc(end_time);
                *slot = Some(WorkingBar::open(point, time, end_time, end_utc));
                drop(slot);
                trace!("{}: opened bar {} -> {}", point.symbol, time, end_time);
                self.schedule_close(end_utc);
            }
        }

        displaced
    }

    fn schedule_close(&self, end_utc: Timestamp) {
        if let Some(alarm) = &self.inner.alarm {
            let delay = (end_utc - self.inner.clock.now())
                .to_std()
                .unwrap_or_default();
            alarm.schedule_after(delay);
        }
    }

    /// Hand over the working bar if it has closed
    ///
    /// `Pending` means no bar is ready yet; `Done` is only returned after `finish`
    /// once the last bar has been handed over.
    pub fn advance(&self) -> Advance<DataPoint> {
        let finished = self.inner.finished.load(Ordering::Acquire);
        let mut slot = self.inner.working.lock();
        let closed = match slot.as_ref() {
            Some(bar) => finished || bar.end_utc <= self.inner.clock.now(),
            None if finished => return Advance::Done,
            None => return Advance::Pending,
        };
        match slot.take() {
            Some(bar) if closed => Advance::Ready(bar.into_data_point()),
            working => {
                *slot = working;
                Advance::Pending
            }
        }
    }

    /// Hand over the working bar if it closes at or before `time`
    pub fn release_through(&self, time: NaiveDateTime) -> Option<DataPoint> {
        let mut slot = self.inner.working.lock();
        if slot.as_ref().is_some_and(|bar| bar.end_time <= time) {
            slot.take().map(WorkingBar::into_data_point)
        } else {
            None
        }
    }

    /// The input has ended: the working bar is released on the next `advance`
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::Release);
        if let Some(alarm) = &self.inner.alarm {
            alarm.cancel();
        }
    }

    /// Stop aggregating and drop any pending close notification
    pub fn dispose(&self) {
        self.finish();
        if self.inner.working.lock().take().is_some() {
            debug!("Aggregator disposed with an open bar");
        }
    }
}

/// [`DataStream`] that turns a tick stream into bars
///
/// Auxiliary events pass through, but never ahead of a working bar that closes
/// at or before them.
pub struct AggregatorStream<S> {
    source: S,
    aggregator: BarAggregator,
    held_auxiliary: Option<DataPoint>,
    source_done: bool,
}

impl<S: DataStream> AggregatorStream<S> {
    pub fn new(source: S, aggregator: BarAggregator) -> Self {
        Self {
            source,
            aggregator,
            held_auxiliary: None,
            source_done: false,
        }
    }

    pub fn aggregator(&self) -> &BarAggregator {
        &self.aggregator
    }
}

impl<S: DataStream> DataStream for AggregatorStream<S> {
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>> {
        if let Some(auxiliary) = self.held_auxiliary.take() {
            return Ok(Advance::Ready(auxiliary));
        }

        while !self.source_done {
            // Bars closed by the clock go out ahead of newer ticks
            if let Advance::Ready(bar) = self.aggregator.advance() {
                return Ok(Advance::Ready(bar));
            }

            match self.source.advance()? {
                Advance::Ready(point) if point.is_auxiliary() => {
                    // The working bar is complete once an event at or past its close arrives
                    if let Some(closed) = self.aggregator.release_through(point.end_time) {
                        self.held_auxiliary = Some(point);
                        return Ok(Advance::Ready(closed));
                    }
                    return Ok(Advance::Ready(point));
                }
                Advance::Ready(point) => {
                    if let Some(closed) = self.aggregator.process(&point) {
                        return Ok(Advance::Ready(closed));
                    }
                }
                Advance::Pending => return Ok(Advance::Pending),
                Advance::Done => {
                    self.source_done = true;
                    self.aggregator.finish();
                }
            }
        }
        Ok(self.aggregator.advance())
    }

    fn close(&mut self) {
        self.held_auxiliary = None;
        self.aggregator.dispose();
        self.source.close();
    }
}
