use serde::{Deserialize, Serialize};

/// Latest quote for one equity, as delivered by the quote source.
///
/// `Default` is the zero state a failed fetch or parse resets to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityQuote {
    pub current: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub prev_close: f64,
    /// Change per share since the previous close.
    pub change: f64,
    pub change_percent: f64,
}

/// A held equity position.
///
/// Symbols are stored uppercased; lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equity {
    pub symbol: String,
    pub shares: u64,
    /// Cost basis per share (0 when unknown).
    pub cost_basis: f64,
    pub quote: EquityQuote,

    // Derived by `calculate`
    /// change × shares
    pub change_value: f64,
    /// current price × shares
    pub value: f64,
    /// cost basis × shares
    pub cost: f64,
}

impl Equity {
    pub fn new(symbol: impl Into<String>, shares: u64) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            shares,
            cost_basis: 0.0,
            quote: EquityQuote::default(),
            change_value: 0.0,
            value: 0.0,
            cost: 0.0,
        }
    }

    pub fn with_cost_basis(mut self, cost_basis: f64) -> Self {
        self.cost_basis = cost_basis;
        self
    }

    /// Case-insensitive symbol comparison.
    pub fn matches(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol.trim())
    }
}
