use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity};

/// OHLCV summary of trading activity over one interval
///
/// A single trade tick is represented as a zero-length bar where
/// `open == high == low == close` and `volume` is the traded quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeBar {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
}

impl TradeBar {
    /// Create a bar from explicit OHLCV values
    pub fn new(open: Price, high: Price, low: Price, close: Price, volume: Quantity) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Create a bar seeded from a single trade
    pub fn from_trade(price: Price, quantity: Quantity) -> Self {
        Self::new(price, price, price, price, quantity)
    }

    /// Create an empty bar seeded at a reference price (no volume)
    pub fn seeded(price: Price) -> Self {
        Self::from_trade(price, Decimal::ZERO)
    }

    /// Fold another bar (or trade) into this one
    ///
    /// Open is kept, high/low widen, close takes the latest value and volume accumulates.
    pub fn update(&mut self, other: &TradeBar) {
        self.high = self.high.max(other.high);
        self.low = self.low.min(other.low);
        self.close = other.close;
        self.volume += other.volume;
    }
}
