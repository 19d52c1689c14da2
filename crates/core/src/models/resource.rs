use serde::{Deserialize, Serialize};

use super::index::MarketIndex;
use super::metal::Metal;

/// Identifies what a single fetch request is for.
///
/// Every request in a batch carries one of these, and every error published
/// to the observer names the resource it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceId {
    /// Latest quote for a held equity (uppercased symbol).
    Equity(String),
    /// Spot price window for one bullion metal.
    Metal(Metal),
    /// Latest value of a market index.
    Index(MarketIndex),
    /// Daily history (with RSI) for an arbitrary symbol.
    History(String),
    /// One of the exchange symbol-directory feeds.
    Directory(usize),
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceId::Equity(symbol) => write!(f, "equity {symbol}"),
            ResourceId::Metal(metal) => write!(f, "metal {metal}"),
            ResourceId::Index(index) => write!(f, "index {index}"),
            ResourceId::History(symbol) => write!(f, "history {symbol}"),
            ResourceId::Directory(feed) => write!(f, "symbol directory #{feed}"),
        }
    }
}
