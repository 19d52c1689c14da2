//! The periodic fetch → extract → calculate → publish loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::Notify;

use crate::collaborators::{EngineObserver, ErrorKind};
use crate::errors::{CoreError, ParseError};
use crate::models::equity::EquityQuote;
use crate::models::metal::SpotQuote;
use crate::models::resource::ResourceId;
use crate::models::settings::Preferences;
use crate::providers::finnhub::QuoteParser;
use crate::providers::registry::EndpointRegistry;
use crate::providers::traits::ResponseParser;
use crate::providers::yahoo_csv::SpotParser;
use crate::services::calculation::index_quote;
use crate::services::fetch_coordinator::{FetchCoordinator, FetchRequest, RequestState, SessionHandle};
use crate::services::format::format_amount;
use crate::services::market_hours::MarketClock;
use crate::services::portfolio_service::{MarketUpdate, PortfolioService};

const UPDATER_THREAD_NAME: &str = "market-updater";

/// What happened to one fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Quotes were applied and a snapshot published; `failures` requests
    /// contributed zeroed values.
    Published { failures: usize },
    /// Every request failed; nothing was applied.
    Discarded,
    /// The batch was cancelled; nothing was applied.
    Cancelled,
}

/// Why the update loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// The fetch-enable flag was cleared.
    Disabled,
    /// The configured hours of updates elapsed.
    DurationElapsed,
    MarketClosed,
}

/// Flags and wake-up signal shared between the update loop and whoever
/// controls it.
#[derive(Debug)]
pub struct LoopControl {
    cancelled: AtomicBool,
    enabled: AtomicBool,
    fetching: AtomicBool,
    wake: Notify,
    session: Mutex<Option<SessionHandle>>,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            fetching: AtomicBool::new(false),
            wake: Notify::new(),
            session: Mutex::new(None),
        }
    }
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop the loop at the next check and cut the current sleep short.
    /// The in-flight batch is cancelled separately via
    /// [`UpdaterHandle::cancel`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// End the current inter-cycle sleep early.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Clear the fetch-enable flag; the loop exits after the current cycle.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::SeqCst)
    }

    /// The batch currently in flight, if any.
    pub fn current_session(&self) -> Option<SessionHandle> {
        self.session().clone()
    }

    fn set_session(&self, session: Option<SessionHandle>) {
        *self.session() = session;
    }

    async fn sleep(&self, pause: Duration) {
        if pause.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = self.wake.notified() => {}
        }
    }
}

/// Ties the fetch coordinator and the portfolio together.
///
/// Holds explicit references to everything it touches; there is no global
/// state. One instance drives one update loop.
pub struct Orchestrator {
    portfolio: Arc<PortfolioService>,
    coordinator: Arc<FetchCoordinator>,
    registry: EndpointRegistry,
    preferences: Preferences,
    clock: Arc<dyn MarketClock>,
    observer: Arc<dyn EngineObserver>,
    control: Arc<LoopControl>,
}

impl Orchestrator {
    pub fn new(
        portfolio: Arc<PortfolioService>,
        coordinator: Arc<FetchCoordinator>,
        registry: EndpointRegistry,
        preferences: Preferences,
        clock: Arc<dyn MarketClock>,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        Self {
            portfolio,
            coordinator,
            registry,
            preferences,
            clock,
            observer,
            control: Arc::new(LoopControl::new()),
        }
    }

    pub fn control(&self) -> Arc<LoopControl> {
        Arc::clone(&self.control)
    }

    /// Run one fetch → extract → calculate → publish cycle.
    ///
    /// Partial failures still publish (failed resources are zeroed); only a
    /// batch where every request failed is discarded. A fatal transport
    /// error abandons the cycle and is returned.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CoreError> {
        let plan = self.portfolio.fetch_plan();
        let requests = self.registry.cycle_requests(&plan.symbols, Utc::now());
        let expected = requests.len();

        let session = self.coordinator.begin_batch(requests.clone());
        self.control.set_session(Some(session.clone()));
        if self.control.is_cancelled() {
            self.coordinator.cancel_session(&session);
        }

        let result = self
            .coordinator
            .run_to_completion(&session, expected, self.observer.as_ref())
            .await;
        self.control.set_session(None);

        let failures = match result {
            Ok(failures) => failures,
            Err(e) => {
                clear_buffers(&requests);
                self.observer.on_error(ErrorKind::Fatal, None);
                return Err(e);
            }
        };

        if session.was_cancelled() || self.control.is_cancelled() {
            clear_buffers(&requests);
            return Ok(CycleOutcome::Cancelled);
        }

        for (resource, error) in session.failures() {
            debug!("{resource} failed this cycle: {error}");
            self.observer.on_error(ErrorKind::Transport, Some(&resource));
        }

        if expected > 0 && failures == expected {
            warn!("All {expected} requests failed; discarding cycle");
            clear_buffers(&requests);
            return Ok(CycleOutcome::Discarded);
        }

        let update = self.extract(&requests, &session.states());
        clear_buffers(&requests);

        let snapshot = self.portfolio.apply_updates(update);
        info!(
            "Portfolio value {} ({} failed request(s))",
            format_amount(snapshot.totals.value, self.preferences.decimal_places),
            failures
        );
        self.observer.on_snapshot_ready(&snapshot);
        Ok(CycleOutcome::Published { failures })
    }

    /// Parse every buffer of a finished batch. Failed requests have empty
    /// buffers and parse to zeroed quotes; only parse failures of completed
    /// transfers are reported as parse errors.
    fn extract(&self, requests: &[FetchRequest], states: &[(ResourceId, RequestState)]) -> MarketUpdate {
        let mut update = MarketUpdate::default();

        for (request, (_, state)) in requests.iter().zip(states) {
            let body = request.buffer.contents();
            let completed = *state == RequestState::Completed;
            let report = |e: &ParseError| {
                if completed {
                    warn!("Could not parse {}: {e}", request.resource);
                    self.observer.on_error(ErrorKind::Parse, Some(&request.resource));
                }
            };

            match &request.resource {
                ResourceId::Equity(symbol) => {
                    let mut quote = EquityQuote::default();
                    if let Err(e) = QuoteParser.parse_into(&body, &mut quote) {
                        report(&e);
                    }
                    update.equities.push((symbol.clone(), quote));
                }
                ResourceId::Metal(metal) => {
                    let mut spot = SpotQuote::default();
                    if let Err(e) = SpotParser.parse_into(&body, &mut spot) {
                        report(&e);
                    }
                    update.metals.push((*metal, spot));
                }
                ResourceId::Index(index) => {
                    let mut spot = SpotQuote::default();
                    if let Err(e) = SpotParser.parse_into(&body, &mut spot) {
                        report(&e);
                    }
                    update.indices.push((*index, index_quote(&spot)));
                }
                ResourceId::History(_) | ResourceId::Directory(_) => {}
            }
        }
        update
    }

    /// Run cycles until cancelled, disabled, out of time, or the market
    /// closes. At least one cycle always runs unless cancelled first.
    pub async fn run(&self) -> LoopExit {
        self.control.fetching.store(true, Ordering::SeqCst);
        self.observer.on_fetch_state_changed(true);

        let started = Instant::now();
        let interval = self.preferences.cycle_interval();
        let total = self.preferences.total_duration();
        info!("Update loop started (interval {interval:?}, duration {total:?})");

        let exit = loop {
            if self.control.is_cancelled() {
                break LoopExit::Cancelled;
            }
            if !self.control.is_enabled() {
                break LoopExit::Disabled;
            }

            let cycle_started = Instant::now();
            match self.run_cycle().await {
                Ok(outcome) => debug!("Cycle finished: {outcome:?}"),
                Err(e) => warn!("Cycle aborted: {e}"),
            }

            if self.control.is_cancelled() {
                break LoopExit::Cancelled;
            }
            if !self.control.is_enabled() {
                break LoopExit::Disabled;
            }
            if total.is_some_and(|total| started.elapsed() >= total) {
                break LoopExit::DurationElapsed;
            }
            if !self.clock.is_open(Utc::now()) {
                break LoopExit::MarketClosed;
            }

            let pause = interval.saturating_sub(cycle_started.elapsed());
            self.control.sleep(pause).await;
        };

        self.control.set_session(None);
        self.control.fetching.store(false, Ordering::SeqCst);
        self.observer.on_progress(0.0);
        self.observer.on_fetch_state_changed(false);
        info!("Update loop stopped: {exit:?}");
        exit
    }

    /// Run the loop on a dedicated OS thread with its own single-threaded
    /// runtime, which also serves as the multiplexer for every transfer the
    /// loop starts.
    pub fn spawn(self) -> Result<UpdaterHandle, CoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CoreError::Runtime(e.to_string()))?;

        let control = Arc::clone(&self.control);
        let coordinator = Arc::clone(&self.coordinator);
        let thread = std::thread::Builder::new()
            .name(UPDATER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(self.run()))?;

        Ok(UpdaterHandle {
            control,
            coordinator,
            thread: Some(thread),
        })
    }
}

fn clear_buffers(requests: &[FetchRequest]) {
    for request in requests {
        request.buffer.clear();
    }
}

/// Owner's handle to a running update loop. Dropping it cancels the loop
/// and joins the thread.
pub struct UpdaterHandle {
    control: Arc<LoopControl>,
    coordinator: Arc<FetchCoordinator>,
    thread: Option<JoinHandle<LoopExit>>,
}

impl std::fmt::Debug for UpdaterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdaterHandle")
            .field("fetching", &self.control.is_fetching())
            .field("cancelled", &self.control.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl UpdaterHandle {
    /// Stop the loop: set the flag, cancel the batch in flight, and wake
    /// the sleep. Safe to call repeatedly and from any thread.
    pub fn cancel(&self) {
        self.control.cancel();
        if let Some(session) = self.control.current_session() {
            self.coordinator.cancel_session(&session);
        }
    }

    pub fn wake(&self) {
        self.control.wake();
    }

    pub fn control(&self) -> &Arc<LoopControl> {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the loop to end on its own (duration, market close,
    /// disable, or an earlier `cancel`).
    pub fn join(mut self) -> Result<LoopExit, CoreError> {
        self.join_thread()
    }

    /// Cancel and wait for the thread to exit.
    pub fn shutdown(mut self) -> Result<LoopExit, CoreError> {
        self.cancel();
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<LoopExit, CoreError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| CoreError::Thread(format!("{UPDATER_THREAD_NAME} panicked"))),
            None => Ok(LoopExit::Cancelled),
        }
    }
}

impl Drop for UpdaterHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            if let Err(e) = self.join_thread() {
                warn!("{e}");
            }
        }
    }
}
