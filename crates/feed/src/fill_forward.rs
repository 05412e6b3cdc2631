//! Fill-forward stage
//!
//! Wraps a bar stream and inserts synthetic bars wherever the source skips an
//! interval during which the exchange was open. A synthetic bar is a clone of the
//! last real bar with its period moved forward, so consumers see a steady cadence
//! at the fill-forward resolution while the market trades.
//!
//! Gaps are measured in UTC so DST transitions never look like missing data, and
//! candidate bar ends are rounded in the data's own time zone.

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use conduit_clock::TimeZoneOffsetProvider;
use conduit_core::time::round_down_in_time_zone;
use conduit_core::{DataPoint, DelistingKind};
use conduit_ports::{
    Advance, DataStream, ExchangeCalendar, FeedError, FeedResult, ResolutionSource,
};
use log::{debug, error, trace};
use std::sync::Arc;

/// Static inputs of a fill-forward stage
#[derive(Clone)]
pub struct FillForwardParams {
    /// Period of one source bar
    pub data_resolution: Duration,
    /// Target cadence; read again at every step
    pub fill_forward_resolution: Arc<dyn ResolutionSource>,
    pub extended_market_hours: bool,
    /// Exchange-local end of the subscription
    pub subscription_end: NaiveDateTime,
    /// Zone the source's bar boundaries are defined in
    pub data_time_zone: Tz,
}

/// Where a fill-forward stage is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillForwardPhase {
    /// Passing source elements through
    Idle,
    /// A synthetic bar was emitted; the held source element is re-evaluated next
    FillingForward,
    /// A delisting was seen; the stream ends once it is reached
    Delisted,
    Terminated,
}

/// Gap-filling [`DataStream`] adapter
pub struct FillForward<S> {
    source: S,
    calendar: Arc<dyn ExchangeCalendar>,
    offsets: Arc<TimeZoneOffsetProvider>,
    params: FillForwardParams,
    exchange_time_zone: Tz,
    previous: Option<DataPoint>,
    pending: Option<DataPoint>,
    delisted_at: Option<NaiveDateTime>,
    source_done: bool,
    terminal_emitted: bool,
    terminated: bool,
}

impl<S: DataStream> FillForward<S> {
    pub fn new(
        source: S,
        calendar: Arc<dyn ExchangeCalendar>,
        offsets: Arc<TimeZoneOffsetProvider>,
        params: FillForwardParams,
    ) -> FeedResult<Self> {
        if params.data_resolution <= Duration::zero() {
            return Err(FeedError::InvalidConfiguration(format!(
                "fill-forward needs a positive data resolution, got {}",
                params.data_resolution
            )));
        }

        let exchange_time_zone = calendar.time_zone();
        Ok(Self {
            source,
            calendar,
            offsets,
            params,
            exchange_time_zone,
            previous: None,
            pending: None,
            delisted_at: None,
            source_done: false,
            terminal_emitted: false,
            terminated: false,
        })
    }

    pub fn phase(&self) -> FillForwardPhase {
        if self.terminated {
            FillForwardPhase::Terminated
        } else if self.delisted_at.is_some() {
            FillForwardPhase::Delisted
        } else if self.pending.is_some() {
            FillForwardPhase::FillingForward
        } else {
            FillForwardPhase::Idle
        }
    }

    /// Last non-auxiliary element handed out, real or synthetic
    pub fn previous(&self) -> Option<&DataPoint> {
        self.previous.as_ref()
    }

    fn terminate(&mut self) -> Advance<DataPoint> {
        if !self.terminated {
            debug!("Fill-forward for {:?} terminated", self.previous.as_ref().map(|p| &p.symbol));
            self.terminated = true;
        }
        Advance::Done
    }

    fn emit(&mut self, point: DataPoint) -> Advance<DataPoint> {
        self.previous = Some(point.clone());
        Advance::Ready(point)
    }

    /// Source is exhausted: top the stream up to the subscription end
    fn end_of_stream(&mut self) -> Advance<DataPoint> {
        if self.delisted_at.is_some() || self.terminal_emitted {
            return self.terminate();
        }
        let end = self.params.subscription_end;
        let Some(previous) = self.previous.clone() else {
            return self.terminate();
        };
        if previous.end_time >= end {
            return self.terminate();
        }

        let resolution = self.params.data_resolution;
        let time = round_down_in_time_zone(
            end,
            resolution,
            self.exchange_time_zone,
            self.params.data_time_zone,
        );
        let Some(end_time) = time.checked_add_signed(resolution) else {
            return self.terminate();
        };
        let end_bar = previous.with_times(time, end_time);

        if let Some(fill) = self.required_fill(&previous, &end_bar) {
            return self.emit(fill);
        }
        if self.calendar.is_open_during_bar(
            end_bar.time,
            end_bar.end_time,
            self.params.extended_market_hours,
        ) {
            self.terminal_emitted = true;
            return self.emit(end_bar);
        }
        self.terminate()
    }

    fn is_open(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.calendar
            .is_open_during_bar(start, end, self.params.extended_market_hours)
    }

    fn next_market_open(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let open = self
            .calendar
            .next_market_open(after, self.params.extended_market_hours);
        (open != NaiveDateTime::MAX).then_some(open)
    }

    /// Candidate end of a synthetic bar anchored at `reference`
    fn potential_bar_end(&self, reference: NaiveDateTime, interval: Duration) -> Option<NaiveDateTime> {
        let end_utc = self.offsets.to_utc(reference).checked_add_signed(interval)?;
        Some(round_down_in_time_zone(
            self.offsets.from_utc(end_utc),
            interval,
            self.exchange_time_zone,
            self.params.data_time_zone,
        ))
    }

    /// Synthetic bar to emit between `previous` and `next`, if the gap needs one
    fn required_fill(&self, previous: &DataPoint, next: &DataPoint) -> Option<DataPoint> {
        let fill_forward = self.params.fill_forward_resolution.current();
        if fill_forward <= Duration::zero() {
            return None;
        }
        let data = self.params.data_resolution;

        let previous_utc = self.offsets.to_utc(previous.time);
        let next_utc = self.offsets.to_utc(next.time);
        let next_end_utc = self.offsets.to_utc(next.end_time);
        if next_end_utc < previous_utc {
            let out_of_order = FeedError::OutOfOrderData {
                symbol: next.symbol.clone(),
                previous_time: previous.time,
                next_end: next.end_time,
            };
            error!("{}", out_of_order);
            return None;
        }
        let delta = next_utc - previous_utc;
        if delta <= fill_forward && delta <= data {
            return None;
        }

        let previous_end = previous.end_time;
        let mut candidates: Vec<(NaiveDateTime, Duration)> = Vec::with_capacity(4);
        if fill_forward == data {
            if let Some(end) = previous_end.checked_add_signed(data) {
                if self.is_open(previous_end, end) {
                    candidates.push((previous_end, data));
                }
            }
            if let Some(open) = self.next_market_open(previous_end) {
                candidates.push((open, data));
            }
        } else {
            let (smaller, larger) = if fill_forward < data {
                (fill_forward, data)
            } else {
                (data, fill_forward)
            };

            if let Some(end) = previous_end.checked_add_signed(smaller) {
                if self.is_open(previous_end, end) {
                    candidates.push((previous_end, smaller));
                }
            }

            let mut later: Vec<(NaiveDateTime, Duration)> = Vec::with_capacity(3);
            let aligned = round_down_in_time_zone(
                previous_end,
                larger,
                self.exchange_time_zone,
                self.params.data_time_zone,
            );
            if let Some(end) = aligned.checked_add_signed(larger) {
                if self.is_open(aligned, end) {
                    later.push((aligned, larger));
                }
            }
            if let Some(open) = self.next_market_open(previous_end) {
                later.push((open, smaller));
                later.push((open, larger));
            }
            later.sort_by_key(|(reference, interval)| {
                reference
                    .checked_add_signed(*interval)
                    .unwrap_or(NaiveDateTime::MAX)
            });
            candidates.extend(later);
        }

        for (reference, interval) in candidates {
            let Some(bar_end) = self.potential_bar_end(reference, interval) else {
                continue;
            };
            if bar_end >= next.end_time {
                break;
            }
            if bar_end <= previous_end {
                continue;
            }
            let (Some(bar_start), Some(fill_time)) = (
                bar_end.checked_sub_signed(interval),
                bar_end.checked_sub_signed(data),
            ) else {
                continue;
            };
            if self.is_open(bar_start, bar_end) {
                trace!("{}: fill-forward {} -> {}", previous.symbol, fill_time, bar_end);
                return Some(previous.with_times(fill_time, bar_end));
            }
        }
        None
    }
}

impl<S: DataStream> DataStream for FillForward<S> {
    fn advance(&mut self) -> FeedResult<Advance<DataPoint>> {
        if self.terminated {
            return Ok(Advance::Done);
        }
        if let Some(delisted_at) = self.delisted_at {
            if self
                .previous
                .as_ref()
                .is_none_or(|previous| previous.end_time >= delisted_at)
            {
                return Ok(self.terminate());
            }
        }

        let next = match self.pending.take() {
            Some(held) => held,
            None if self.source_done => return Ok(self.end_of_stream()),
            None => match self.source.advance()? {
                Advance::Ready(point) => point,
                Advance::Pending => return Ok(Advance::Pending),
                Advance::Done => {
                    self.source_done = true;
                    return Ok(self.end_of_stream());
                }
            },
        };

        if next.is_auxiliary() {
            if next.delisting_kind() == Some(DelistingKind::Delisted) {
                debug!("{} delisted at {}", next.symbol, next.end_time);
                self.delisted_at = Some(next.end_time);
            }
            return Ok(Advance::Ready(next));
        }

        let Some(previous) = self.previous.as_ref() else {
            return Ok(self.emit(next));
        };

        match self.required_fill(previous, &next) {
            Some(fill) => {
                self.pending = Some(next);
                Ok(self.emit(fill))
            }
            None => Ok(self.emit(next)),
        }
    }

    fn close(&mut self) {
        self.pending = None;
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::DynamicResolution;
    use crate::source::IterStream;
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::America::New_York;
    use conduit_calendar::MarketHours;
    use conduit_core::TradeBar;
    use rust_decimal_macros::dec;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn offsets() -> Arc<TimeZoneOffsetProvider> {
        Arc::new(TimeZoneOffsetProvider::new(
            New_York,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn minute_bar(day: u32, h: u32, m: u32, close: rust_decimal::Decimal) -> DataPoint {
        DataPoint::trade_bar(
            "SPY",
            at(day, h, m),
            Duration::minutes(1),
            TradeBar::new(close, close, close, close, dec!(10)),
        )
    }

    fn minute_stage(
        bars: Vec<DataPoint>,
        fill_forward: Arc<dyn ResolutionSource>,
        end: NaiveDateTime,
    ) -> FillForward<IterStream<std::vec::IntoIter<DataPoint>>> {
        FillForward::new(
            IterStream::new(bars),
            Arc::new(MarketHours::us_equity()),
            offsets(),
            FillForwardParams {
                data_resolution: Duration::minutes(1),
                fill_forward_resolution: fill_forward,
                extended_market_hours: false,
                subscription_end: end,
                data_time_zone: New_York,
            },
        )
        .unwrap()
    }

    fn drain<S: DataStream>(stage: &mut S) -> Vec<DataPoint> {
        let mut out = Vec::new();
        while let Advance::Ready(point) = stage.advance().unwrap() {
            out.push(point);
        }
        out
    }

    #[test]
    fn test_minute_gap_filled_within_session() {
        let _ = env_logger::try_init();
        let mut stage = minute_stage(
            vec![minute_bar(4, 10, 0, dec!(1)), minute_bar(4, 10, 3, dec!(2))],
            Arc::new(Duration::minutes(1)),
            at(4, 10, 4),
        );

        let out = drain(&mut stage);
        let times: Vec<NaiveDateTime> = out.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![at(4, 10, 0), at(4, 10, 1), at(4, 10, 2), at(4, 10, 3)]);
        assert_eq!(out[1].value, dec!(1));
        assert_eq!(out[2].payload, out[0].payload);
        assert_eq!(stage.phase(), FillForwardPhase::Terminated);
    }

    #[test]
    fn test_phase_while_filling() {
        let mut stage = minute_stage(
            vec![minute_bar(4, 10, 0, dec!(1)), minute_bar(4, 10, 2, dec!(2))],
            Arc::new(Duration::minutes(1)),
            at(4, 10, 3),
        );
        assert_eq!(stage.phase(), FillForwardPhase::Idle);
        stage.advance().unwrap();
        stage.advance().unwrap();
        assert_eq!(stage.phase(), FillForwardPhase::FillingForward);
        stage.advance().unwrap();
        assert_eq!(stage.phase(), FillForwardPhase::Idle);
    }

    #[test]
    fn test_no_fill_across_the_close() {
        let mut stage = minute_stage(
            vec![minute_bar(4, 15, 58, dec!(1)), minute_bar(5, 9, 30, dec!(2))],
            Arc::new(Duration::minutes(1)),
            at(5, 9, 31),
        );

        let times: Vec<NaiveDateTime> = drain(&mut stage).iter().map(|p| p.time).collect();
        assert_eq!(times, vec![at(4, 15, 58), at(4, 15, 59), at(5, 9, 30)]);
    }

    #[test]
    fn test_end_of_subscription_tops_up() {
        let mut stage = minute_stage(
            vec![minute_bar(4, 10, 0, dec!(1))],
            Arc::new(Duration::minutes(1)),
            at(4, 10, 3),
        );

        let out = drain(&mut stage);
        let times: Vec<NaiveDateTime> = out.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![at(4, 10, 0), at(4, 10, 1), at(4, 10, 2), at(4, 10, 3)]);
        assert!(out.iter().all(|p| p.time <= at(4, 10, 3)));
        assert!(stage.advance().unwrap().is_done());
    }

    #[test]
    fn test_zero_runtime_resolution_disables_fill() {
        let resolution = DynamicResolution::new(Duration::zero());
        let mut stage = minute_stage(
            vec![minute_bar(4, 10, 0, dec!(1)), minute_bar(4, 10, 5, dec!(2))],
            resolution,
            at(4, 10, 5),
        );
        assert_eq!(drain(&mut stage).len(), 2);
    }

    #[test]
    fn test_out_of_order_passes_through() {
        let _ = env_logger::try_init();
        let mut stage = minute_stage(
            vec![minute_bar(4, 10, 5, dec!(1)), minute_bar(4, 10, 0, dec!(2))],
            Arc::new(Duration::minutes(1)),
            at(4, 10, 0),
        );
        let out = drain(&mut stage);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].time, at(4, 10, 0));
    }

    #[test]
    fn test_delisting_stops_stream() {
        let mut stage = minute_stage(
            vec![
                minute_bar(4, 10, 0, dec!(1)),
                DataPoint::delisting("SPY", at(4, 10, 1), DelistingKind::Delisted),
                minute_bar(4, 10, 5, dec!(2)),
            ],
            Arc::new(Duration::minutes(1)),
            at(4, 11, 0),
        );

        let out = drain(&mut stage);
        assert_eq!(out.len(), 2);
        assert!(out[1].is_auxiliary());
        assert_eq!(stage.phase(), FillForwardPhase::Terminated);
    }

    #[test]
    fn test_zero_data_resolution_rejected() {
        let result = FillForward::new(
            IterStream::new(Vec::<DataPoint>::new()),
            Arc::new(MarketHours::us_equity()),
            offsets(),
            FillForwardParams {
                data_resolution: Duration::zero(),
                fill_forward_resolution: Arc::new(Duration::minutes(1)),
                extended_market_hours: false,
                subscription_end: at(4, 16, 0),
                data_time_zone: New_York,
            },
        );
        assert!(matches!(result, Err(FeedError::InvalidConfiguration(_))));
    }
}
