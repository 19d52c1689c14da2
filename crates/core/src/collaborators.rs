//! Narrow interfaces between the engine and the presentation/persistence
//! layer, which lives outside this crate.

use crate::models::metal::BullionHolding;
use crate::models::portfolio::PortfolioSnapshot;
use crate::models::resource::ResourceId;
use crate::models::settings::Preferences;

/// Category of a problem reported through [`EngineObserver::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// One request failed (connect, timeout, HTTP status, body).
    Transport,
    /// A response arrived but could not be parsed; the resource was zeroed.
    Parse,
    /// The whole batch was abandoned.
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Outbound notifications. Called from worker threads, never from the
/// caller's event loop, so implementations must be thread-safe and should
/// hand work off rather than block.
pub trait EngineObserver: Send + Sync {
    /// Fraction of the current batch that has finished, in `0.0..=1.0`.
    fn on_progress(&self, _fraction: f64) {}

    /// A fully recalculated snapshot is ready.
    fn on_snapshot_ready(&self, _snapshot: &PortfolioSnapshot) {}

    /// The periodic update loop started (`true`) or stopped (`false`).
    fn on_fetch_state_changed(&self, _fetching: bool) {}

    /// Something went wrong with `resource` (`None` for batch-level failures).
    fn on_error(&self, _kind: ErrorKind, _resource: Option<&ResourceId>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// Inbound data supplied by the persistence layer at start-up.
pub trait PortfolioLoader {
    /// `(symbol, shares)` pairs.
    fn load_holdings(&self) -> Vec<(String, u64)>;

    /// Ounces and premium per metal, in `Metal::ALL` order.
    fn load_bullion(&self) -> [BullionHolding; 4];

    fn load_cash(&self) -> f64;

    fn load_preferences(&self) -> Preferences;
}
