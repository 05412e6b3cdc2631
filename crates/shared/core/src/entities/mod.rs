mod auxiliary;
mod data_point;
mod quote;
mod trade_bar;

pub use auxiliary::{Auxiliary, DelistingKind};
pub use data_point::{DataKind, DataPoint, Payload};
pub use quote::Quote;
pub use trade_bar::TradeBar;
