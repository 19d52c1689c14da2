use serde::{Deserialize, Serialize};

use super::equity::Equity;
use super::index::{IndexQuote, MarketIndex};
use super::metal::{BullionPosition, Metal};

/// Value / day change / percent change for one group of holdings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTotals {
    pub value: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Every derived aggregate recomputed by `calculate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub bullion: GroupTotals,
    pub equity: GroupTotals,

    /// bullion + equity + cash
    pub value: f64,
    /// bullion day change + equity day change
    pub change: f64,
    pub change_percent: f64,
    /// Σ shares × cost basis
    pub cost: f64,
    /// equity value - cost
    pub gain: f64,
    /// gold spot / silver spot; only refreshed while silver spot > 0.
    pub gold_silver_ratio: f64,
}

/// The mutable state owned by the portfolio service.
///
/// Equities keep insertion order (or the order left by `sort`); bullion and
/// index quotes are fixed arrays indexed by `Metal::index` / `MarketIndex::index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub equities: Vec<Equity>,
    pub bullion: [BullionPosition; 4],
    pub indices: [IndexQuote; 4],
    pub cash: f64,
    pub totals: PortfolioTotals,
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self {
            equities: Vec::new(),
            bullion: BullionPosition::all_empty(),
            indices: [IndexQuote::default(); 4],
            cash: 0.0,
            totals: PortfolioTotals::default(),
        }
    }
}

impl PortfolioState {
    pub fn equity(&self, symbol: &str) -> Option<&Equity> {
        self.equities.iter().find(|e| e.matches(symbol))
    }

    pub fn equity_mut(&mut self, symbol: &str) -> Option<&mut Equity> {
        self.equities.iter_mut().find(|e| e.matches(symbol))
    }

    pub fn bullion(&self, metal: Metal) -> &BullionPosition {
        &self.bullion[metal.index()]
    }

    pub fn bullion_mut(&mut self, metal: Metal) -> &mut BullionPosition {
        &mut self.bullion[metal.index()]
    }

    pub fn index_quote(&self, index: MarketIndex) -> &IndexQuote {
        &self.indices[index.index()]
    }
}

/// An immutable, fully recomputed view of the portfolio handed to the
/// presentation layer. Only ever produced right after `calculate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub equities: Vec<Equity>,
    pub bullion: [BullionPosition; 4],
    pub indices: [IndexQuote; 4],
    pub cash: f64,
    pub totals: PortfolioTotals,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

impl PortfolioSnapshot {
    pub(crate) fn of(state: &PortfolioState) -> Self {
        Self {
            equities: state.equities.clone(),
            bullion: state.bullion.clone(),
            indices: state.indices,
            cash: state.cash,
            totals: state.totals,
            taken_at: chrono::Utc::now(),
        }
    }

    pub fn equity(&self, symbol: &str) -> Option<&Equity> {
        self.equities.iter().find(|e| e.matches(symbol))
    }

    pub fn bullion(&self, metal: Metal) -> &BullionPosition {
        &self.bullion[metal.index()]
    }

    pub fn index_quote(&self, index: MarketIndex) -> &IndexQuote {
        &self.indices[index.index()]
    }
}
