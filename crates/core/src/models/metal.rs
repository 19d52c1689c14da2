use serde::{Deserialize, Serialize};

/// The four tracked bullion metals. Fixed set, not user-extensible:
/// calculations always visit all four so a removed position zeroes out
/// instead of leaving a stale total behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metal {
    Gold,
    Silver,
    Platinum,
    Palladium,
}

impl Metal {
    pub const ALL: [Metal; 4] = [Metal::Gold, Metal::Silver, Metal::Platinum, Metal::Palladium];

    /// Position in fixed-size per-metal arrays.
    pub fn index(self) -> usize {
        match self {
            Metal::Gold => 0,
            Metal::Silver => 1,
            Metal::Platinum => 2,
            Metal::Palladium => 3,
        }
    }

    /// Futures ticker used by the CSV history source.
    pub fn ticker(self) -> &'static str {
        match self {
            Metal::Gold => "GC=F",
            Metal::Silver => "SI=F",
            Metal::Platinum => "PL=F",
            Metal::Palladium => "PA=F",
        }
    }

    /// ISO 4217 style code (XAU, XAG, XPT, XPD).
    pub fn code(self) -> &'static str {
        match self {
            Metal::Gold => "XAU",
            Metal::Silver => "XAG",
            Metal::Platinum => "XPT",
            Metal::Palladium => "XPD",
        }
    }
}

impl std::fmt::Display for Metal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metal::Gold => write!(f, "Gold"),
            Metal::Silver => write!(f, "Silver"),
            Metal::Platinum => write!(f, "Platinum"),
            Metal::Palladium => write!(f, "Palladium"),
        }
    }
}

/// Latest spot window for a metal or index, reduced from a short CSV history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotQuote {
    pub price: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
}

/// Ounces held and dealer premium for one metal, as loaded from the
/// persistence layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BullionHolding {
    pub ounces: f64,
    pub premium: f64,
}

/// A bullion position with its latest quote and derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BullionPosition {
    pub metal: Metal,
    pub ounces: f64,
    /// Dealer markup per ounce.
    pub premium: f64,
    pub quote: SpotQuote,

    // Derived by `calculate`
    /// spot - previous close
    pub change_ounce: f64,
    /// ounces × change_ounce
    pub change_value: f64,
    /// ounces × (spot + premium)
    pub value: f64,
    pub change_percent: f64,
}

impl BullionPosition {
    pub fn new(metal: Metal) -> Self {
        Self {
            metal,
            ounces: 0.0,
            premium: 0.0,
            quote: SpotQuote::default(),
            change_ounce: 0.0,
            change_value: 0.0,
            value: 0.0,
            change_percent: 0.0,
        }
    }

    /// One empty position per metal, in `Metal::ALL` order.
    pub fn all_empty() -> [BullionPosition; 4] {
        Metal::ALL.map(BullionPosition::new)
    }
}
