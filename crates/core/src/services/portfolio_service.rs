use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::errors::CoreError;
use crate::models::equity::{Equity, EquityQuote};
use crate::models::index::{IndexQuote, MarketIndex};
use crate::models::metal::{BullionHolding, Metal, SpotQuote};
use crate::models::portfolio::{PortfolioSnapshot, PortfolioState, PortfolioTotals};
use crate::services::calculation;

/// Maximum number of equity holdings. Adds beyond this are refused.
pub const MAX_EQUITIES: usize = 255;

/// Result of [`PortfolioService::add_or_replace_equity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquityUpsert {
    Added,
    /// The symbol was already held; its share count was replaced.
    Replaced,
    /// The holding cap was reached; nothing changed.
    Refused,
}

/// What one update cycle needs to fetch, taken under the lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    pub symbols: Vec<String>,
}

/// Parsed results of one fetch cycle, ready to be applied in one go.
/// Failed resources carry zeroed quotes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketUpdate {
    pub equities: Vec<(String, EquityQuote)>,
    pub metals: Vec<(Metal, SpotQuote)>,
    pub indices: Vec<(MarketIndex, IndexQuote)>,
}

/// Owns every holding and position and recomputes derived values.
///
/// One coarse lock covers each whole operation, so UI-triggered edits and
/// the background recalculation never interleave. The lock is not
/// re-entrant: nothing in here calls back into `self` while holding it.
#[derive(Debug, Default)]
pub struct PortfolioService {
    state: Mutex<PortfolioState>,
}

impl PortfolioService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PortfolioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace everything with freshly loaded holdings and recalculate.
    /// Holdings past the cap are dropped; duplicates collapse onto one entry.
    pub fn load(&self, holdings: &[(String, u64)], bullion: &[BullionHolding; 4], cash: f64) -> PortfolioSnapshot {
        let mut state = self.lock();
        *state = PortfolioState::default();
        for (symbol, shares) in holdings {
            if symbol.trim().is_empty() {
                continue;
            }
            Self::upsert(&mut state, Equity::new(symbol.as_str(), *shares), false);
        }
        for metal in Metal::ALL {
            let holding = bullion[metal.index()];
            let position = state.bullion_mut(metal);
            position.ounces = holding.ounces;
            position.premium = holding.premium;
        }
        state.cash = cash;
        calculation::calculate(&mut state);
        PortfolioSnapshot::of(&state)
    }

    // ── Equities ────────────────────────────────────────────────────

    /// Add a holding, or replace the share count of an existing one
    /// (case-insensitive match; full replace, not merge).
    pub fn add_or_replace_equity(&self, symbol: &str, shares: u64) -> Result<EquityUpsert, CoreError> {
        let equity = Self::validated(symbol, shares)?;
        Ok(Self::upsert(&mut self.lock(), equity, false))
    }

    /// Like [`Self::add_or_replace_equity`], also setting the per-share cost basis.
    pub fn add_or_replace_equity_with_cost(
        &self,
        symbol: &str,
        shares: u64,
        cost_basis: f64,
    ) -> Result<EquityUpsert, CoreError> {
        if !cost_basis.is_finite() || cost_basis < 0.0 {
            return Err(CoreError::Validation(format!(
                "cost basis for {symbol} must be finite and non-negative, got {cost_basis}"
            )));
        }
        let equity = Self::validated(symbol, shares)?.with_cost_basis(cost_basis);
        Ok(Self::upsert(&mut self.lock(), equity, true))
    }

    fn validated(symbol: &str, shares: u64) -> Result<Equity, CoreError> {
        if symbol.trim().is_empty() {
            return Err(CoreError::Validation("symbol must not be empty".into()));
        }
        Ok(Equity::new(symbol, shares))
    }

    fn upsert(state: &mut PortfolioState, equity: Equity, set_cost: bool) -> EquityUpsert {
        if let Some(existing) = state.equity_mut(&equity.symbol) {
            existing.shares = equity.shares;
            if set_cost {
                existing.cost_basis = equity.cost_basis;
            }
            return EquityUpsert::Replaced;
        }
        if state.equities.len() >= MAX_EQUITIES {
            debug!("Refusing {}: holding cap of {MAX_EQUITIES} reached", equity.symbol);
            return EquityUpsert::Refused;
        }
        state.equities.push(equity);
        EquityUpsert::Added
    }

    /// Remove a holding. Returns `false` (and changes nothing) if not held.
    /// Remaining holdings keep their relative order.
    pub fn remove_equity(&self, symbol: &str) -> bool {
        let mut state = self.lock();
        match state.equities.iter().position(|e| e.matches(symbol)) {
            Some(idx) => {
                state.equities.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Order holdings by symbol, case-insensitively; ties keep their order.
    pub fn sort(&self) {
        self.lock()
            .equities
            .sort_by_cached_key(|e| e.symbol.to_ascii_lowercase());
    }

    pub fn equity_count(&self) -> usize {
        self.lock().equities.len()
    }

    pub fn equity(&self, symbol: &str) -> Option<Equity> {
        self.lock().equity(symbol).cloned()
    }

    /// Symbols in current order.
    pub fn symbols(&self) -> Vec<String> {
        self.lock().equities.iter().map(|e| e.symbol.clone()).collect()
    }

    // ── Bullion & Cash ──────────────────────────────────────────────

    pub fn set_bullion(&self, metal: Metal, ounces: f64, premium: f64) -> Result<(), CoreError> {
        if !ounces.is_finite() || ounces < 0.0 {
            return Err(CoreError::Validation(format!(
                "{metal} ounces must be finite and non-negative, got {ounces}"
            )));
        }
        if !premium.is_finite() {
            return Err(CoreError::Validation(format!("{metal} premium must be finite")));
        }
        let mut state = self.lock();
        let position = state.bullion_mut(metal);
        position.ounces = ounces;
        position.premium = premium;
        debug!("{} holding set to {ounces} oz, premium {premium}", metal.code());
        Ok(())
    }

    pub fn set_cash(&self, cash: f64) -> Result<(), CoreError> {
        if !cash.is_finite() {
            return Err(CoreError::Validation("cash must be finite".into()));
        }
        self.lock().cash = cash;
        Ok(())
    }

    // ── Calculation ─────────────────────────────────────────────────

    /// Recompute all derived values and return the new totals.
    pub fn calculate(&self) -> PortfolioTotals {
        let mut state = self.lock();
        calculation::calculate(&mut state);
        state.totals
    }

    /// Recalculate and return a consistent snapshot.
    pub fn snapshot(&self) -> PortfolioSnapshot {
        let mut state = self.lock();
        calculation::calculate(&mut state);
        PortfolioSnapshot::of(&state)
    }

    /// What the next update cycle should fetch.
    pub fn fetch_plan(&self) -> FetchPlan {
        FetchPlan {
            symbols: self.symbols(),
        }
    }

    /// Apply one cycle's parsed quotes, recalculate, and snapshot, all under
    /// a single acquisition of the lock. Quotes for symbols removed while
    /// the fetch was in flight are ignored.
    pub fn apply_updates(&self, update: MarketUpdate) -> PortfolioSnapshot {
        let mut state = self.lock();
        for (symbol, quote) in update.equities {
            if let Some(equity) = state.equity_mut(&symbol) {
                equity.quote = quote;
            }
        }
        for (metal, quote) in update.metals {
            state.bullion_mut(metal).quote = quote;
        }
        for (index, quote) in update.indices {
            state.indices[index.index()] = quote;
        }
        calculation::calculate(&mut state);
        PortfolioSnapshot::of(&state)
    }
}
