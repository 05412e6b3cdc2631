use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity};

/// Top-of-book quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: Price,
    pub bid_size: Quantity,
    pub ask_price: Price,
    pub ask_size: Quantity,
}

impl Quote {
    pub fn new(bid_price: Price, bid_size: Quantity, ask_price: Price, ask_size: Quantity) -> Self {
        Self {
            bid_price,
            bid_size,
            ask_price,
            ask_size,
        }
    }

    /// Mid price when both sides are quoted, otherwise whichever side is present
    pub fn mid(&self) -> Option<Price> {
        match (self.bid_price.is_zero(), self.ask_price.is_zero()) {
            (false, false) => Some((self.bid_price + self.ask_price) / Decimal::TWO),
            (false, true) => Some(self.bid_price),
            (true, false) => Some(self.ask_price),
            (true, true) => None,
        }
    }

    /// Replace the quoted levels with the latest update
    pub fn update(&mut self, latest: &Quote) {
        *self = *latest;
    }
}
