//! Pure portfolio arithmetic. No locking here; callers hold the portfolio
//! lock around [`calculate`].

use crate::models::index::IndexQuote;
use crate::models::metal::{BullionPosition, Metal, SpotQuote};
use crate::models::portfolio::{GroupTotals, PortfolioState, PortfolioTotals};

/// Percent change from `previous` to `current`.
///
/// Unguarded: `previous == 0` yields `inf`/`NaN`. Every caller in this crate
/// goes through [`gain_or_zero`].
pub fn gain(current: f64, previous: f64) -> f64 {
    100.0 * (current - previous) / previous
}

/// [`gain`] with the zero-denominator case mapped to 0%.
pub fn gain_or_zero(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        gain(current, previous)
    }
}

/// Recompute every derived field, in order: equities, bullion, gold/silver
/// ratio, portfolio totals. Deterministic: calling it twice without changing
/// inputs yields identical results.
pub fn calculate(state: &mut PortfolioState) {
    calculate_equities(state);
    calculate_bullion(state);
    update_gold_silver_ratio(&mut state.totals, &state.bullion);
    calculate_portfolio(state);
}

fn calculate_equities(state: &mut PortfolioState) {
    let mut totals = GroupTotals::default();
    let mut cost = 0.0;

    for equity in &mut state.equities {
        let shares = equity.shares as f64;
        equity.change_value = if equity.shares == 0 {
            0.0
        } else {
            equity.quote.change * shares
        };
        equity.value = equity.quote.current * shares;
        equity.cost = equity.cost_basis * shares;

        totals.value += equity.value;
        totals.change += equity.change_value;
        cost += equity.cost;
    }

    totals.change_percent = gain_or_zero(totals.value, totals.value - totals.change);
    state.totals.equity = totals;
    state.totals.cost = cost;
}

/// Visits all four metals regardless of holdings, so a metal whose ounces
/// dropped to zero contributes zero instead of a stale value.
fn calculate_bullion(state: &mut PortfolioState) {
    let mut totals = GroupTotals::default();

    for position in &mut state.bullion {
        calculate_position(position);
        totals.value += position.value;
        totals.change += position.change_value;
    }

    totals.change_percent = gain_or_zero(totals.value, totals.value - totals.change);
    state.totals.bullion = totals;
}

fn calculate_position(position: &mut BullionPosition) {
    let spot = position.quote.price;
    position.change_ounce = spot - position.quote.prev_close;
    position.value = position.ounces * (spot + position.premium);
    position.change_value = position.ounces * position.change_ounce;

    // Without holdings the spot move is the only meaningful percentage.
    position.change_percent = if position.ounces == 0.0 {
        gain_or_zero(spot, position.quote.prev_close)
    } else {
        gain_or_zero(position.value, position.value - position.change_value)
    };
}

/// Left unchanged while silver has no spot price.
fn update_gold_silver_ratio(totals: &mut PortfolioTotals, bullion: &[BullionPosition; 4]) {
    let gold = bullion[Metal::Gold.index()].quote.price;
    let silver = bullion[Metal::Silver.index()].quote.price;
    if silver > 0.0 {
        totals.gold_silver_ratio = gold / silver;
    }
}

fn calculate_portfolio(state: &mut PortfolioState) {
    let totals = &mut state.totals;
    totals.value = totals.bullion.value + totals.equity.value + state.cash;
    totals.change = totals.bullion.change + totals.equity.change;
    totals.change_percent = gain_or_zero(totals.value, totals.value - totals.change);
    totals.gain = totals.equity.value - totals.cost;
}

/// Derive an index quote from its latest spot window.
pub fn index_quote(spot: &SpotQuote) -> IndexQuote {
    let change = spot.price - spot.prev_close;
    IndexQuote {
        value: spot.price,
        prev_close: spot.prev_close,
        change,
        change_percent: gain_or_zero(spot.price, spot.prev_close),
    }
}
