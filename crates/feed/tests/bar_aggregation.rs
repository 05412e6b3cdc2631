//! Integration test: tick-to-bar aggregation properties

use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use conduit_calendar::MarketHours;
use conduit_clock::{ManualClock, TimeZoneOffsetProvider};
use conduit_core::{DataPoint, DelistingKind};
use conduit_feed::{
    Advance, AggregatorStream, BarAggregator, DataStream, FillForward, FillForwardParams,
    IterStream,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::vec::IntoIter;

fn open() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|d| d.and_hms_opt(14, 30, 0))
        .expect("valid time")
}

fn utc_offsets() -> Arc<TimeZoneOffsetProvider> {
    Arc::new(TimeZoneOffsetProvider::new(
        chrono_tz::UTC,
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap(),
    ))
}

fn minute_bars(ticks: Vec<DataPoint>) -> AggregatorStream<IterStream<IntoIter<DataPoint>>> {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap());
    let aggregator = BarAggregator::new(Duration::minutes(1), utc_offsets(), clock)
        .expect("Failed to create aggregator");
    AggregatorStream::new(IterStream::new(ticks), aggregator)
}

fn aggregate(ticks: Vec<DataPoint>) -> Vec<DataPoint> {
    let mut stream = minute_bars(ticks);
    let mut bars = Vec::new();
    loop {
        match stream.advance().expect("replay never faults") {
            Advance::Ready(bar) => bars.push(bar),
            Advance::Pending => panic!("replay stream went pending"),
            Advance::Done => break,
        }
    }
    bars
}

#[test]
fn test_delisting_after_close_keeps_last_bar() {
    let _ = env_logger::try_init();
    let ticks = vec![
        DataPoint::trade_tick("ETH", open() + Duration::seconds(5), dec!(3000), dec!(2)),
        DataPoint::delisting("ETH", open() + Duration::seconds(100), DelistingKind::Delisted),
    ];
    let mut stage = FillForward::new(
        minute_bars(ticks),
        Arc::new(MarketHours::always_open(chrono_tz::UTC)),
        utc_offsets(),
        FillForwardParams {
            data_resolution: Duration::minutes(1),
            fill_forward_resolution: Arc::new(Duration::minutes(1)),
            extended_market_hours: false,
            subscription_end: open() + Duration::minutes(30),
            data_time_zone: chrono_tz::UTC,
        },
    )
    .expect("Failed to create fill-forward stage");

    let mut out = Vec::new();
    while let Advance::Ready(point) = stage.advance().expect("replay never faults") {
        out.push(point);
    }

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].time, open());
    assert_eq!(out[0].end_time, open() + Duration::minutes(1));
    assert_eq!(out[0].trade_bar_payload().map(|bar| bar.volume), Some(dec!(2)));
    assert_eq!(out[1].delisting_kind(), Some(DelistingKind::Delisted));
}

fn tick_strategy() -> impl Strategy<Value = Vec<(i64, i64, i64)>> {
    // (second offset, price in cents, quantity)
    prop::collection::vec((0i64..600, 1i64..100_000, 1i64..500), 1..200).prop_map(|mut ticks| {
        ticks.sort_by_key(|(second, _, _)| *second);
        ticks
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_volume_conserved_and_range_bounds_prices(ticks in tick_strategy()) {
        let points: Vec<DataPoint> = ticks
            .iter()
            .map(|(second, cents, quantity)| {
                DataPoint::trade_tick(
                    "ETH",
                    open() + Duration::seconds(*second),
                    Decimal::new(*cents, 2),
                    Decimal::from(*quantity),
                )
            })
            .collect();

        let bars = aggregate(points.clone());

        // One bar per distinct minute, in order
        let minutes: BTreeSet<i64> = ticks.iter().map(|(second, _, _)| second / 60).collect();
        prop_assert_eq!(bars.len(), minutes.len());
        for (bar, minute) in bars.iter().zip(&minutes) {
            prop_assert_eq!(bar.time, open() + Duration::minutes(*minute));
            prop_assert_eq!(bar.period(), Duration::minutes(1));
        }

        let volume: Decimal = bars
            .iter()
            .filter_map(|bar| bar.trade_bar_payload())
            .map(|ohlcv| ohlcv.volume)
            .sum();
        let quantity: Decimal = ticks.iter().map(|(_, _, q)| Decimal::from(*q)).sum();
        prop_assert_eq!(volume, quantity);

        for tick in &points {
            let bar = bars
                .iter()
                .find(|bar| bar.time <= tick.time && tick.time < bar.end_time)
                .expect("every tick lands in a bar");
            let ohlcv = bar.trade_bar_payload().expect("trade bar");
            prop_assert!(ohlcv.low <= tick.value && tick.value <= ohlcv.high);
        }
    }
}
