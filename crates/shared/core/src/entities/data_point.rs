use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Auxiliary, DelistingKind, Quote, TradeBar};
use crate::values::{Price, Quantity, Symbol};

/// Coarse category of a stream element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Trade,
    Quote,
    Auxiliary,
}

/// Payload carried by a [`DataPoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Trade(TradeBar),
    Quote(Quote),
    Auxiliary(Auxiliary),
}

/// One element of a market-data stream for a single instrument
///
/// `time` and `end_time` are exchange-local wall-clock times (no offset attached);
/// conversion to UTC goes through the subscription's offset provider.
/// Constructors guarantee `end_time >= time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub symbol: Symbol,
    /// Start of the period this element covers
    pub time: NaiveDateTime,
    /// End of the period (equal to `time` for ticks and events)
    pub end_time: NaiveDateTime,
    /// Representative price (close for bars, mid for quotes)
    pub value: Price,
    pub payload: Payload,
}

impl DataPoint {
    /// Create a data point; an `end_time` before `time` is clamped to `time`
    pub fn new(
        symbol: impl Into<Symbol>,
        time: NaiveDateTime,
        end_time: NaiveDateTime,
        value: Price,
        payload: Payload,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            time,
            end_time: end_time.max(time),
            value,
            payload,
        }
    }

    /// A bar covering `[time, time + period)`
    pub fn trade_bar(
        symbol: impl Into<Symbol>,
        time: NaiveDateTime,
        period: Duration,
        bar: TradeBar,
    ) -> Self {
        Self::new(symbol, time, time + period, bar.close, Payload::Trade(bar))
    }

    /// A single trade print
    pub fn trade_tick(
        symbol: impl Into<Symbol>,
        time: NaiveDateTime,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self::trade_bar(
            symbol,
            time,
            Duration::zero(),
            TradeBar::from_trade(price, quantity),
        )
    }

    /// A quote tick; value is the mid (zero if neither side is quoted)
    pub fn quote_tick(symbol: impl Into<Symbol>, time: NaiveDateTime, quote: Quote) -> Self {
        let value = quote.mid().unwrap_or(Decimal::ZERO);
        Self::new(symbol, time, time, value, Payload::Quote(quote))
    }

    /// A corporate-action event
    pub fn auxiliary(symbol: impl Into<Symbol>, time: NaiveDateTime, event: Auxiliary) -> Self {
        Self::new(symbol, time, time, Decimal::ZERO, Payload::Auxiliary(event))
    }

    /// A delisting notice
    pub fn delisting(symbol: impl Into<Symbol>, time: NaiveDateTime, kind: DelistingKind) -> Self {
        Self::auxiliary(symbol, time, Auxiliary::Delisting(kind))
    }

    pub fn kind(&self) -> DataKind {
        match self.payload {
            Payload::Trade(_) => DataKind::Trade,
            Payload::Quote(_) => DataKind::Quote,
            Payload::Auxiliary(_) => DataKind::Auxiliary,
        }
    }

    pub fn is_auxiliary(&self) -> bool {
        self.kind() == DataKind::Auxiliary
    }

    /// Delisting stage if this element is a delisting notice
    pub fn delisting_kind(&self) -> Option<DelistingKind> {
        match &self.payload {
            Payload::Auxiliary(event) => event.delisting_kind(),
            _ => None,
        }
    }

    pub fn trade_bar_payload(&self) -> Option<&TradeBar> {
        match &self.payload {
            Payload::Trade(bar) => Some(bar),
            _ => None,
        }
    }

    pub fn quote_payload(&self) -> Option<&Quote> {
        match &self.payload {
            Payload::Quote(quote) => Some(quote),
            _ => None,
        }
    }

    /// Length of the covered period
    pub fn period(&self) -> Duration {
        self.end_time - self.time
    }

    /// Copy of this element re-stamped to a new period; every other field is preserved
    pub fn with_times(&self, time: NaiveDateTime, end_time: NaiveDateTime) -> Self {
        Self {
            symbol: self.symbol.clone(),
            time,
            end_time: end_time.max(time),
            value: self.value,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    #[test]
    fn test_end_time_never_precedes_time() {
        let point = DataPoint::new(
            "SPY",
            at(10, 0),
            at(9, 0),
            dec!(1),
            Payload::Trade(TradeBar::seeded(dec!(1))),
        );
        assert_eq!(point.end_time, point.time);
    }

    #[test]
    fn test_trade_tick_is_zero_length_bar() {
        let tick = DataPoint::trade_tick("SPY", at(10, 0), dec!(500.25), dec!(7));
        assert_eq!(tick.kind(), DataKind::Trade);
        assert_eq!(tick.period(), Duration::zero());
        assert_eq!(tick.value, dec!(500.25));
        assert_eq!(tick.trade_bar_payload().map(|b| b.volume), Some(dec!(7)));
    }

    #[test]
    fn test_quote_value_is_mid() {
        let quote = DataPoint::quote_tick(
            "SPY",
            at(10, 0),
            Quote::new(dec!(10), dec!(1), dec!(12), dec!(1)),
        );
        assert_eq!(quote.kind(), DataKind::Quote);
        assert_eq!(quote.value, dec!(11));
    }

    #[test]
    fn test_delisting_is_auxiliary() {
        let event = DataPoint::delisting("XYZ", at(16, 0), DelistingKind::Delisted);
        assert!(event.is_auxiliary());
        assert_eq!(event.delisting_kind(), Some(DelistingKind::Delisted));

        let split = DataPoint::auxiliary("XYZ", at(9, 0), Auxiliary::Split { factor: dec!(2) });
        assert!(split.is_auxiliary());
        assert_eq!(split.delisting_kind(), None);
    }

    #[test]
    fn test_with_times_preserves_everything_else() {
        let bar = DataPoint::trade_bar(
            "SPY",
            at(9, 30),
            Duration::minutes(1),
            TradeBar::new(dec!(1), dec!(3), dec!(0.5), dec!(2), dec!(100)),
        );
        let moved = bar.with_times(at(9, 31), at(9, 32));

        assert_eq!(moved.symbol, bar.symbol);
        assert_eq!(moved.value, bar.value);
        assert_eq!(moved.payload, bar.payload);
        assert_eq!(moved.time, at(9, 31));
        assert_eq!(moved.end_time, at(9, 32));
    }
}
