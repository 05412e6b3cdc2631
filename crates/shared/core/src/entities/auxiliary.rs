use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Delisting notice stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelistingKind {
    /// Announced ahead of the delisting date
    Warning,
    /// The instrument no longer trades
    Delisted,
}

/// Corporate-action payloads carried alongside market data
///
/// These never take part in fill-forward; they are passed through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Auxiliary {
    Delisting(DelistingKind),
    /// Share split, `factor` new shares per old share
    Split { factor: Decimal },
    /// Cash distribution per share
    Dividend { distribution: Decimal },
}

impl Auxiliary {
    pub fn delisting_kind(&self) -> Option<DelistingKind> {
        match self {
            Auxiliary::Delisting(kind) => Some(*kind),
            _ => None,
        }
    }
}
