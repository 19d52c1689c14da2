use serde::{Deserialize, Serialize};

/// Market references shown next to the portfolio. Read-only; nothing here
/// is owned by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketIndex {
    Dow,
    Nasdaq,
    SP500,
    Bitcoin,
}

impl MarketIndex {
    pub const ALL: [MarketIndex; 4] = [
        MarketIndex::Dow,
        MarketIndex::Nasdaq,
        MarketIndex::SP500,
        MarketIndex::Bitcoin,
    ];

    /// Position in fixed-size per-index arrays.
    pub fn index(self) -> usize {
        match self {
            MarketIndex::Dow => 0,
            MarketIndex::Nasdaq => 1,
            MarketIndex::SP500 => 2,
            MarketIndex::Bitcoin => 3,
        }
    }

    /// Ticker used by the CSV history source.
    pub fn ticker(self) -> &'static str {
        match self {
            MarketIndex::Dow => "^DJI",
            MarketIndex::Nasdaq => "^IXIC",
            MarketIndex::SP500 => "^GSPC",
            MarketIndex::Bitcoin => "BTC-USD",
        }
    }
}

impl std::fmt::Display for MarketIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketIndex::Dow => write!(f, "Dow"),
            MarketIndex::Nasdaq => write!(f, "Nasdaq"),
            MarketIndex::SP500 => write!(f, "S&P 500"),
            MarketIndex::Bitcoin => write!(f, "Bitcoin"),
        }
    }
}

/// Latest value of a market index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub value: f64,
    pub prev_close: f64,
    pub change: f64,
    pub change_percent: f64,
}
