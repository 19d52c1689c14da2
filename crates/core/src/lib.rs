pub mod collaborators;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{info, warn};

use collaborators::{EngineObserver, ErrorKind, PortfolioLoader};
use errors::CoreError;
use models::{
    bar::HistoricalBar,
    equity::Equity,
    metal::Metal,
    portfolio::{PortfolioSnapshot, PortfolioTotals},
    resource::ResourceId,
    settings::{EngineConfig, Preferences},
    symbol::SymbolListing,
};
use providers::{
    http::HttpTransport,
    registry::EndpointRegistry,
    symbol_directory::{merge_directories, DirectoryParser},
    traits::{ResponseParser, Transport},
    yahoo_csv::HistoryParser,
};
use services::{
    fetch_coordinator::{FetchCoordinator, FetchRequest, RequestState},
    market_hours::{AlwaysOpen, MarketClock, NyseHours},
    orchestrator::{CycleOutcome, LoopExit, Orchestrator, UpdaterHandle},
    portfolio_service::{EquityUpsert, PortfolioService},
};

/// Main entry point for the market tracker core library.
///
/// Owns the portfolio, the fetch coordinator and (while running) the
/// background update loop. The presentation layer calls into this and
/// receives results through its [`EngineObserver`].
///
/// Dropping the tracker cancels the update loop, joins its thread and only
/// then releases the shared transport.
#[must_use]
pub struct MarketTracker {
    config: EngineConfig,
    portfolio: Arc<PortfolioService>,
    coordinator: Arc<FetchCoordinator>,
    registry: EndpointRegistry,
    observer: Arc<dyn EngineObserver>,
    clock: Arc<dyn MarketClock>,
    updater: Mutex<Option<UpdaterHandle>>,
}

impl std::fmt::Debug for MarketTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketTracker")
            .field("equities", &self.portfolio.equity_count())
            .field("preferences", &self.config.preferences)
            .field("coordinator", &self.coordinator)
            .field("updating", &self.is_updating())
            .finish()
    }
}

impl MarketTracker {
    /// Create a tracker that talks HTTP.
    pub fn new(config: EngineConfig, observer: Arc<dyn EngineObserver>) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(&config.timeouts)?;
        Self::with_transport(config, Arc::new(transport), observer)
    }

    /// Create a tracker over any [`Transport`] (tests use in-process mocks).
    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn EngineObserver>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let clock: Arc<dyn MarketClock> = if config.respect_market_hours {
            Arc::new(NyseHours)
        } else {
            Arc::new(AlwaysOpen)
        };
        Ok(Self {
            coordinator: Arc::new(FetchCoordinator::new(transport, config.timeouts.clone())),
            registry: EndpointRegistry::new(config.endpoints.clone()),
            portfolio: Arc::new(PortfolioService::new()),
            observer,
            clock,
            config,
            updater: Mutex::new(None),
        })
    }

    /// Replace the market-hours check.
    pub fn with_clock(mut self, clock: Arc<dyn MarketClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load holdings, bullion, cash and preferences from the persistence
    /// layer and return the recalculated snapshot.
    pub fn load_from(&mut self, loader: &dyn PortfolioLoader) -> PortfolioSnapshot {
        self.config.preferences = loader.load_preferences();
        let snapshot = self.portfolio.load(
            &loader.load_holdings(),
            &loader.load_bullion(),
            loader.load_cash(),
        );
        info!("Loaded {} equities", snapshot.equities.len());
        snapshot
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.config.preferences
    }

    /// New preferences take effect the next time updates are started.
    pub fn set_preferences(&mut self, preferences: Preferences) {
        self.config.preferences = preferences;
    }

    #[must_use]
    pub fn portfolio(&self) -> &Arc<PortfolioService> {
        &self.portfolio
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    // ── Holdings ────────────────────────────────────────────────────

    pub fn add_equity(&self, symbol: &str, shares: u64) -> Result<EquityUpsert, CoreError> {
        self.portfolio.add_or_replace_equity(symbol, shares)
    }

    pub fn add_equity_with_cost(&self, symbol: &str, shares: u64, cost_basis: f64) -> Result<EquityUpsert, CoreError> {
        self.portfolio
            .add_or_replace_equity_with_cost(symbol, shares, cost_basis)
    }

    pub fn remove_equity(&self, symbol: &str) -> bool {
        self.portfolio.remove_equity(symbol)
    }

    pub fn sort_equities(&self) {
        self.portfolio.sort();
    }

    #[must_use]
    pub fn equity(&self, symbol: &str) -> Option<Equity> {
        self.portfolio.equity(symbol)
    }

    pub fn set_bullion(&self, metal: Metal, ounces: f64, premium: f64) -> Result<(), CoreError> {
        self.portfolio.set_bullion(metal, ounces, premium)
    }

    pub fn set_cash(&self, cash: f64) -> Result<(), CoreError> {
        self.portfolio.set_cash(cash)
    }

    pub fn calculate(&self) -> PortfolioTotals {
        self.portfolio.calculate()
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.portfolio.snapshot()
    }

    // ── Updates ─────────────────────────────────────────────────────

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.portfolio),
            Arc::clone(&self.coordinator),
            self.registry.clone(),
            self.config.preferences.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.observer),
        )
    }

    fn updater(&self) -> MutexGuard<'_, Option<UpdaterHandle>> {
        self.updater.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch everything once on the caller's runtime and publish a snapshot.
    pub async fn refresh_once(&self) -> Result<CycleOutcome, CoreError> {
        self.orchestrator().run_cycle().await
    }

    /// Start the periodic update loop on its own thread. No-op while a loop
    /// is already running.
    pub fn start_updates(&self) -> Result<(), CoreError> {
        let mut updater = self.updater();
        if updater.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        if let Some(finished) = updater.take() {
            finished.join()?;
        }
        *updater = Some(self.orchestrator().spawn()?);
        Ok(())
    }

    /// Cancel the update loop and wait for its thread. Blocks the caller
    /// until the in-flight batch has been detached. Returns `None` when no
    /// loop was running.
    pub fn stop_updates(&self) -> Option<LoopExit> {
        let handle = self.updater().take()?;
        match handle.shutdown() {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Cut the update loop's current sleep short.
    pub fn wake_updates(&self) {
        if let Some(handle) = self.updater().as_ref() {
            handle.wake();
        }
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.updater()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // ── One-off fetches ─────────────────────────────────────────────

    /// Daily bars with RSI for `symbol`, oldest first, covering roughly the
    /// last year. Malformed responses yield an empty list.
    pub async fn fetch_history(&self, symbol: &str) -> Result<Vec<HistoricalBar>, CoreError> {
        let resource = ResourceId::History(symbol.trim().to_uppercase());
        let request = self
            .registry
            .request_for(resource.clone(), Utc::now())
            .ok_or_else(|| CoreError::NotFound(resource.to_string()))?;
        let buffer = request.buffer.clone();

        let session = self.coordinator.begin_batch(vec![request]);
        self.coordinator
            .run_to_completion(&session, 1, self.observer.as_ref())
            .await?;

        match session.state_of(0) {
            Some(RequestState::Completed) => {}
            Some(RequestState::Failed(source)) => {
                self.observer.on_error(ErrorKind::Transport, Some(&resource));
                return Err(CoreError::Transport { resource, source });
            }
            _ => return Err(CoreError::FetchAborted(format!("{resource} was cancelled"))),
        }

        let body = buffer.take();
        Ok(HistoryParser.parse(&body).unwrap_or_default())
    }

    /// Merged listing of both exchange directories. Succeeds as long as at
    /// least one feed could be fetched and parsed.
    pub async fn fetch_symbol_directory(&self) -> Result<Vec<SymbolListing>, CoreError> {
        let requests: Vec<FetchRequest> = self.registry.directory_requests(Utc::now());
        let expected = requests.len();
        let session = self.coordinator.begin_batch(requests.clone());
        self.coordinator
            .run_to_completion(&session, expected, self.observer.as_ref())
            .await?;

        let mut feeds = Vec::new();
        let mut first_failure = None;
        for (request, (resource, state)) in requests.iter().zip(session.states()) {
            match state {
                RequestState::Completed => match DirectoryParser.parse(&request.buffer.take()) {
                    Ok(listings) => feeds.push(listings),
                    Err(e) => {
                        warn!("Could not parse {resource}: {e}");
                        self.observer.on_error(ErrorKind::Parse, Some(&resource));
                    }
                },
                RequestState::Failed(source) => {
                    self.observer.on_error(ErrorKind::Transport, Some(&resource));
                    if first_failure.is_none() {
                        first_failure = Some(CoreError::Transport { resource, source });
                    }
                }
                _ => {}
            }
        }

        if feeds.is_empty() {
            return Err(first_failure.unwrap_or_else(|| CoreError::NotFound("symbol directory".into())));
        }
        Ok(merge_directories(feeds))
    }

    /// Stop updates, cancel anything still in flight, and drop the tracker.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for MarketTracker {
    fn drop(&mut self) {
        self.stop_updates();
        self.coordinator.cancel_all();
    }
}
