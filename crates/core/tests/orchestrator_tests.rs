// ═══════════════════════════════════════════════════════════════════
// Orchestrator Tests — update cycles, loop control, MarketTracker facade
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use market_tracker_core::collaborators::{EngineObserver, ErrorKind, PortfolioLoader};
use market_tracker_core::errors::{CoreError, TransportError};
use market_tracker_core::models::index::MarketIndex;
use market_tracker_core::models::metal::{BullionHolding, Metal};
use market_tracker_core::models::portfolio::PortfolioSnapshot;
use market_tracker_core::models::resource::ResourceId;
use market_tracker_core::models::settings::{EngineConfig, Endpoints, FetchTimeouts, Preferences};
use market_tracker_core::providers::registry::EndpointRegistry;
use market_tracker_core::providers::traits::{BodySink, Transport};
use market_tracker_core::services::fetch_coordinator::FetchCoordinator;
use market_tracker_core::services::market_hours::{AlwaysOpen, MarketClock};
use market_tracker_core::services::orchestrator::{CycleOutcome, LoopControl, LoopExit, Orchestrator};
use market_tracker_core::services::portfolio_service::PortfolioService;
use market_tracker_core::MarketTracker;

// ═══════════════════════════════════════════════════════════════════
// Test Helpers — Mock Market, Observer, Clock, Loader
// ═══════════════════════════════════════════════════════════════════

const SPOT_CSV: &str = "Date,Open,High,Low,Close,Adj Close,Volume\n\
                        2026-10-15,1990,2005,1985,2000,2000,1000\n\
                        2026-10-16,2000,2015,1995,2010,2010,1200\n";

/// Serves quotes for `mock://quote/{SYMBOL}`, the same spot CSV for every
/// `mock://csv/` URL, and directory feeds for `mock://dir/{n}`.
#[derive(Default)]
struct MockMarket {
    quotes: Vec<(String, String)>,
    csv: Option<String>,
    directories: Vec<(String, String)>,
    fail_all: AtomicBool,
    calls: AtomicUsize,
}

impl MockMarket {
    fn new() -> Self {
        Self {
            quotes: vec![
                ("AAPL".into(), quote_json(150.0, 2.0)),
                ("MSFT".into(), quote_json(400.0, -4.0)),
            ],
            csv: Some(SPOT_CSV.into()),
            ..Default::default()
        }
    }

    fn failing() -> Self {
        let market = Self::new();
        market.fail_all.store(true, Ordering::SeqCst);
        market
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn route(&self, url: &str) -> Option<String> {
        if let Some(symbol) = url.strip_prefix("mock://quote/") {
            return self
                .quotes
                .iter()
                .find(|(s, _)| s == symbol)
                .map(|(_, body)| body.clone());
        }
        if url.starts_with("mock://csv/") {
            return self.csv.clone();
        }
        self.directories
            .iter()
            .find(|(route, _)| route == url)
            .map(|(_, body)| body.clone())
    }
}

#[async_trait]
impl Transport for MockMarket {
    fn name(&self) -> &str {
        "mock-market"
    }

    async fn fetch(&self, url: &str, sink: &dyn BodySink) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let body = self.route(url).ok_or(TransportError::Status(404))?;
        sink.write(body.as_bytes());
        Ok(())
    }
}

fn quote_json(current: f64, change: f64) -> String {
    format!(
        r#"{{"c":{current},"h":{current},"l":{current},"o":{current},"pc":{},"d":{change},"dp":0.5}}"#,
        current - change
    )
}

#[derive(Default)]
struct Recorder {
    snapshots: Mutex<Vec<PortfolioSnapshot>>,
    errors: Mutex<Vec<(ErrorKind, Option<ResourceId>)>>,
    fetch_states: Mutex<Vec<bool>>,
    progress: Mutex<Vec<f64>>,
}

impl Recorder {
    fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    fn last_snapshot(&self) -> PortfolioSnapshot {
        self.snapshots.lock().unwrap().last().cloned().expect("no snapshot published")
    }

    fn errors_of(&self, kind: ErrorKind) -> usize {
        self.errors.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    fn wait_for_snapshots(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.snapshot_count() < count {
            assert!(Instant::now() < deadline, "timed out waiting for snapshot #{count}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl EngineObserver for Recorder {
    fn on_progress(&self, fraction: f64) {
        self.progress.lock().unwrap().push(fraction);
    }

    fn on_snapshot_ready(&self, snapshot: &PortfolioSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn on_fetch_state_changed(&self, fetching: bool) {
        self.fetch_states.lock().unwrap().push(fetching);
    }

    fn on_error(&self, kind: ErrorKind, resource: Option<&ResourceId>) {
        self.errors.lock().unwrap().push((kind, resource.cloned()));
    }
}

struct ClosedMarket;

impl MarketClock for ClosedMarket {
    fn is_open(&self, _now: DateTime<Utc>) -> bool {
        false
    }
}

fn endpoints() -> Endpoints {
    Endpoints {
        quote_url: "mock://quote/".into(),
        api_key_suffix: String::new(),
        history_url: "mock://csv/".into(),
        directory_urls: ["mock://dir/0".into(), "mock://dir/1".into()],
    }
}

fn timeouts() -> FetchTimeouts {
    FetchTimeouts {
        connect_ms: 100,
        total_ms: 2_000,
        poll_quantum_ms: 5,
    }
}

fn portfolio() -> Arc<PortfolioService> {
    let portfolio = PortfolioService::new();
    let mut bullion = [BullionHolding::default(); 4];
    bullion[Metal::Gold.index()] = BullionHolding {
        ounces: 2.0,
        premium: 10.0,
    };
    portfolio.load(&[("AAPL".into(), 10)], &bullion, 100.0);
    Arc::new(portfolio)
}

fn orchestrator(
    market: MockMarket,
    preferences: Preferences,
    clock: Arc<dyn MarketClock>,
    observer: Arc<Recorder>,
) -> Orchestrator {
    Orchestrator::new(
        portfolio(),
        Arc::new(FetchCoordinator::new(Arc::new(market), timeouts())),
        EndpointRegistry::new(endpoints()),
        preferences,
        clock,
        observer,
    )
}

// ═══════════════════════════════════════════════════════════════════
// Update Cycle
// ═══════════════════════════════════════════════════════════════════

mod update_cycle {
    use super::*;

    #[tokio::test]
    async fn test_cycle_publishes_recalculated_snapshot() {
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(MockMarket::new(), Preferences::default(), Arc::new(AlwaysOpen), observer.clone());

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Published { failures: 0 });

        let snapshot = observer.last_snapshot();
        assert_eq!(snapshot.equity("AAPL").unwrap().value, 1_500.0);
        assert_eq!(snapshot.equity("AAPL").unwrap().change_value, 20.0);
        assert_eq!(snapshot.bullion(Metal::Gold).value, 2.0 * (2010.0 + 10.0));
        assert_eq!(snapshot.bullion(Metal::Palladium).quote.price, 2010.0);
        assert_eq!(snapshot.index_quote(MarketIndex::Bitcoin).value, 2010.0);
        assert_eq!(snapshot.index_quote(MarketIndex::Bitcoin).change, 10.0);
        assert_eq!(snapshot.totals.gold_silver_ratio, 1.0);
        assert_eq!(snapshot.totals.value, 1_500.0 + 4_040.0 + 100.0);
        assert!(observer.errors.lock().unwrap().is_empty());
        assert_eq!(observer.progress.lock().unwrap().last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn test_partial_failure_still_publishes() {
        let market = MockMarket {
            quotes: vec![],
            csv: Some(SPOT_CSV.into()),
            ..Default::default()
        };
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(market, Preferences::default(), Arc::new(AlwaysOpen), observer.clone());

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Published { failures: 1 });

        let snapshot = observer.last_snapshot();
        assert_eq!(snapshot.equity("AAPL").unwrap().value, 0.0);
        assert!(snapshot.totals.value.is_finite());
        assert_eq!(
            observer.errors.lock().unwrap().clone(),
            vec![(ErrorKind::Transport, Some(ResourceId::Equity("AAPL".into())))]
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_zeroed_and_reported() {
        let market = MockMarket {
            quotes: vec![("AAPL".into(), "<html>rate limited</html>".into())],
            csv: Some(SPOT_CSV.into()),
            ..Default::default()
        };
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(market, Preferences::default(), Arc::new(AlwaysOpen), observer.clone());

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Published { failures: 0 });
        assert_eq!(observer.last_snapshot().equity("AAPL").unwrap().quote.current, 0.0);
        assert_eq!(observer.errors_of(ErrorKind::Parse), 1);
    }

    #[tokio::test]
    async fn test_total_failure_is_discarded() {
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(MockMarket::failing(), Preferences::default(), Arc::new(AlwaysOpen), observer.clone());

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Discarded);
        assert_eq!(observer.snapshot_count(), 0);
        // 1 equity + 4 metals + 4 indices
        assert_eq!(observer.errors_of(ErrorKind::Transport), 9);
        assert_eq!(observer.errors_of(ErrorKind::Parse), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_cycle_applies_nothing() {
        let market = MockMarket::new();
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(market, Preferences::default(), Arc::new(AlwaysOpen), observer.clone());

        orchestrator.control().cancel();
        let outcome = orchestrator.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(observer.snapshot_count(), 0);
        assert!(orchestrator.control().current_session().is_none());
    }
    /// Stops updates from its progress handler once the batch reports
    /// completion, the way a UI stop button wired to progress would.
    #[derive(Default)]
    struct StopOnFinish {
        recorder: Recorder,
        armed: AtomicBool,
        target: OnceLock<(Arc<LoopControl>, Arc<FetchCoordinator>)>,
    }

    impl EngineObserver for StopOnFinish {
        fn on_progress(&self, fraction: f64) {
            self.recorder.on_progress(fraction);
            if fraction < 1.0 || !self.armed.load(Ordering::SeqCst) {
                return;
            }
            if let Some((control, coordinator)) = self.target.get() {
                control.cancel();
                if let Some(session) = control.current_session() {
                    coordinator.cancel_session(&session);
                }
            }
        }

        fn on_snapshot_ready(&self, snapshot: &PortfolioSnapshot) {
            self.recorder.on_snapshot_ready(snapshot);
        }

        fn on_error(&self, kind: ErrorKind, resource: Option<&ResourceId>) {
            self.recorder.on_error(kind, resource);
        }
    }

    #[tokio::test]
    async fn test_stop_after_final_progress_keeps_last_quotes() {
        let observer = Arc::new(StopOnFinish::default());
        let portfolio = portfolio();
        let coordinator = Arc::new(FetchCoordinator::new(Arc::new(MockMarket::new()), timeouts()));
        let orchestrator = Orchestrator::new(
            Arc::clone(&portfolio),
            Arc::clone(&coordinator),
            EndpointRegistry::new(endpoints()),
            Preferences::default(),
            Arc::new(AlwaysOpen),
            observer.clone(),
        );
        assert!(observer.target.set((orchestrator.control(), Arc::clone(&coordinator))).is_ok());

        assert_eq!(orchestrator.run_cycle().await.unwrap(), CycleOutcome::Published { failures: 0 });
        let published = observer.recorder.last_snapshot();
        assert_eq!(portfolio.equity("AAPL").unwrap().quote.current, 150.0);

        observer.armed.store(true, Ordering::SeqCst);
        let outcome = orchestrator.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(observer.recorder.snapshot_count(), 1);
        assert_eq!(portfolio.equity("AAPL").unwrap().quote.current, 150.0);
        let current = portfolio.snapshot();
        assert_eq!(current.bullion(Metal::Gold).quote.price, 2010.0);
        assert_eq!(current.totals.value, published.totals.value);
        assert_eq!(coordinator.registered_handles(), 0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Update Loop
// ═══════════════════════════════════════════════════════════════════

mod update_loop {
    use super::*;

    #[test]
    fn test_cycle_interval() {
        let prefs = |updates_per_minute| Preferences {
            updates_per_minute,
            ..Default::default()
        };
        assert_eq!(prefs(0).cycle_interval(), Duration::from_secs(1));
        assert_eq!(prefs(60).cycle_interval(), Duration::from_secs(1));
        assert_eq!(prefs(4).cycle_interval(), Duration::from_secs(15));
        assert_eq!(prefs(7).cycle_interval(), Duration::from_micros(8_571_428));
    }

    #[test]
    fn test_total_duration() {
        let prefs = |hours_of_updates| Preferences {
            hours_of_updates,
            ..Default::default()
        };
        assert_eq!(prefs(0.0).total_duration(), None);
        assert_eq!(prefs(-1.0).total_duration(), None);
        assert_eq!(prefs(1.5).total_duration(), Some(Duration::from_secs(5_400)));
    }

    #[tokio::test]
    async fn test_market_close_stops_after_one_cycle() {
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(MockMarket::new(), Preferences::default(), Arc::new(ClosedMarket), observer.clone());

        assert_eq!(orchestrator.run().await, LoopExit::MarketClosed);
        assert_eq!(observer.snapshot_count(), 1);
        assert_eq!(*observer.fetch_states.lock().unwrap(), vec![true, false]);
        assert_eq!(observer.progress.lock().unwrap().last().copied(), Some(0.0));
        assert!(!orchestrator.control().is_fetching());
    }

    #[tokio::test]
    async fn test_duration_elapses() {
        let observer = Arc::new(Recorder::default());
        let preferences = Preferences {
            updates_per_minute: 6_000,
            hours_of_updates: 0.05 / 3600.0,
            ..Default::default()
        };
        let orchestrator = orchestrator(MockMarket::new(), preferences, Arc::new(AlwaysOpen), observer.clone());

        assert_eq!(orchestrator.run().await, LoopExit::DurationElapsed);
        assert!(observer.snapshot_count() >= 1);
    }

    #[tokio::test]
    async fn test_disabled_loop_runs_no_cycle() {
        let market = MockMarket::new();
        let observer = Arc::new(Recorder::default());
        let orchestrator = orchestrator(market, Preferences::default(), Arc::new(AlwaysOpen), observer.clone());

        orchestrator.control().disable();
        assert!(!orchestrator.control().is_enabled());
        assert_eq!(orchestrator.run().await, LoopExit::Disabled);
        assert_eq!(observer.snapshot_count(), 0);
        assert_eq!(*observer.fetch_states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_spawned_loop_cancels_during_sleep() {
        let observer = Arc::new(Recorder::default());
        let preferences = Preferences {
            updates_per_minute: 1,
            ..Default::default()
        };
        let handle = orchestrator(MockMarket::new(), preferences, Arc::new(AlwaysOpen), observer.clone())
            .spawn()
            .unwrap();

        observer.wait_for_snapshots(1);
        assert!(handle.control().is_fetching());

        let started = Instant::now();
        assert_eq!(handle.shutdown().unwrap(), LoopExit::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(*observer.fetch_states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_wake_cuts_sleep_short() {
        let observer = Arc::new(Recorder::default());
        let preferences = Preferences {
            updates_per_minute: 1,
            ..Default::default()
        };
        let handle = orchestrator(MockMarket::new(), preferences, Arc::new(AlwaysOpen), observer.clone())
            .spawn()
            .unwrap();

        observer.wait_for_snapshots(1);
        handle.wake();
        observer.wait_for_snapshots(2);

        handle.cancel();
        handle.cancel();
        assert_eq!(handle.join().unwrap(), LoopExit::Cancelled);
    }

    #[test]
    fn test_dropping_handle_stops_loop() {
        let observer = Arc::new(Recorder::default());
        let handle = orchestrator(MockMarket::new(), Preferences::default(), Arc::new(AlwaysOpen), observer.clone())
            .spawn()
            .unwrap();
        observer.wait_for_snapshots(1);

        drop(handle);
        assert_eq!(observer.fetch_states.lock().unwrap().last().copied(), Some(false));
    }
}

// ═══════════════════════════════════════════════════════════════════
// MarketTracker Facade
// ═══════════════════════════════════════════════════════════════════

mod market_tracker {
    use super::*;

    struct FixedLoader;

    impl PortfolioLoader for FixedLoader {
        fn load_holdings(&self) -> Vec<(String, u64)> {
            vec![("msft".into(), 5), ("aapl".into(), 10)]
        }

        fn load_bullion(&self) -> [BullionHolding; 4] {
            let mut bullion = [BullionHolding::default(); 4];
            bullion[Metal::Silver.index()] = BullionHolding {
                ounces: 100.0,
                premium: 2.0,
            };
            bullion
        }

        fn load_cash(&self) -> f64 {
            250.0
        }

        fn load_preferences(&self) -> Preferences {
            Preferences {
                updates_per_minute: 12,
                hours_of_updates: 0.0,
                decimal_places: 3,
            }
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            endpoints: endpoints(),
            timeouts: timeouts(),
            preferences: Preferences::default(),
            respect_market_hours: false,
        }
    }

    fn tracker(market: MockMarket, observer: Arc<Recorder>) -> MarketTracker {
        MarketTracker::with_transport(config(), Arc::new(market), observer).unwrap()
    }

    fn history_csv(closes: &[f64]) -> String {
        let mut csv = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
        let mut open = 100.0;
        for (i, close) in closes.iter().enumerate() {
            csv.push_str(&format!("2025-02-{:02},{open},{close},{open},{close},{close},10\n", i + 1));
            open = *close;
        }
        csv
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut bad = config();
        bad.timeouts.poll_quantum_ms = 0;
        let result = MarketTracker::with_transport(bad, Arc::new(MockMarket::new()), Arc::new(Recorder::default()));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_edit_and_refresh() {
        let observer = Arc::new(Recorder::default());
        let mut tracker = tracker(MockMarket::new(), observer.clone());

        let loaded = tracker.load_from(&FixedLoader);
        assert_eq!(loaded.equities.len(), 2);
        assert_eq!(loaded.cash, 250.0);
        assert_eq!(tracker.preferences().decimal_places, 3);

        tracker.sort_equities();
        assert_eq!(tracker.portfolio().symbols(), vec!["AAPL", "MSFT"]);

        let outcome = tracker.refresh_once().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Published { failures: 0 });

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.totals.equity.value, 1_500.0 + 2_000.0);
        assert_eq!(snapshot.bullion(Metal::Silver).value, 100.0 * (2010.0 + 2.0));
        assert_eq!(snapshot, {
            let mut published = observer.last_snapshot();
            published.taken_at = snapshot.taken_at;
            published
        });

        assert!(tracker.remove_equity("msft"));
        assert_eq!(tracker.calculate().equity.value, 1_500.0);
    }

    #[tokio::test]
    async fn test_fetch_history_returns_rsi_bars() {
        let closes = [
            101.0, 102.0, 101.0, 103.0, 102.0, 104.0, 103.0, 105.0, 104.0, 106.0, 105.0, 107.0, 106.0, 108.0,
        ];
        let market = MockMarket {
            csv: Some(history_csv(&closes)),
            ..Default::default()
        };
        let tracker = tracker(market, Arc::new(Recorder::default()));

        let bars = tracker.fetch_history("spy").await.unwrap();
        assert_eq!(bars.len(), 1);
        assert!((bars[0].rsi.unwrap() - 70.0).abs() < 1e-4);
        assert_eq!(tracker.coordinator().registered_handles(), 0);
    }

    #[tokio::test]
    async fn test_fetch_history_transport_error() {
        let observer = Arc::new(Recorder::default());
        let tracker = tracker(MockMarket::failing(), observer.clone());

        match tracker.fetch_history("SPY").await {
            Err(CoreError::Transport { resource, source }) => {
                assert_eq!(resource, ResourceId::History("SPY".into()));
                assert!(matches!(source, TransportError::Connect(_)));
            }
            other => panic!("Expected Transport error, got: {other:?}"),
        }
        assert_eq!(observer.errors_of(ErrorKind::Transport), 1);
    }

    #[tokio::test]
    async fn test_fetch_symbol_directory_merges_feeds() {
        let market = MockMarket {
            directories: vec![
                (
                    "mock://dir/0".into(),
                    "Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares\n\
                     MSFT|Microsoft Corporation|Q|N|N|100|N|N\n"
                        .into(),
                ),
                (
                    "mock://dir/1".into(),
                    "ACT Symbol|Security Name|Exchange|CQS Symbol|ETF|Round Lot Size|Test Issue|NASDAQ Symbol\n\
                     BRK.B|Berkshire Hathaway Inc.|N|BRK.B|N|100|N|BRK.B\n"
                        .into(),
                ),
            ],
            ..Default::default()
        };
        let tracker = tracker(market, Arc::new(Recorder::default()));

        let listings = tracker.fetch_symbol_directory().await.unwrap();
        let symbols: Vec<&str> = listings.iter().map(|l| l.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BRK-B", "MSFT"]);
    }

    #[tokio::test]
    async fn test_fetch_symbol_directory_tolerates_one_missing_feed() {
        let market = MockMarket {
            directories: vec![(
                "mock://dir/1".into(),
                "ACT Symbol|Security Name|Exchange|CQS Symbol|ETF|Round Lot Size|Test Issue|NASDAQ Symbol\n\
                 IBM|International Business Machines|N|IBM|N|100|N|IBM\n"
                    .into(),
            )],
            ..Default::default()
        };
        let observer = Arc::new(Recorder::default());
        let tracker = tracker(market, observer.clone());

        let listings = tracker.fetch_symbol_directory().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(observer.errors_of(ErrorKind::Transport), 1);
    }

    #[tokio::test]
    async fn test_fetch_symbol_directory_fails_when_both_feeds_fail() {
        let tracker = tracker(MockMarket::failing(), Arc::new(Recorder::default()));
        assert!(matches!(
            tracker.fetch_symbol_directory().await,
            Err(CoreError::Transport { .. })
        ));
    }

    #[test]
    fn test_start_and_stop_updates() {
        let observer = Arc::new(Recorder::default());
        let tracker = tracker(MockMarket::new(), observer.clone());
        tracker.add_equity("AAPL", 10).unwrap();
        assert_eq!(tracker.stop_updates(), None);

        tracker.start_updates().unwrap();
        tracker.start_updates().unwrap();
        assert!(tracker.is_updating());
        observer.wait_for_snapshots(1);

        assert_eq!(tracker.stop_updates(), Some(LoopExit::Cancelled));
        assert!(!tracker.is_updating());
        assert_eq!(tracker.coordinator().registered_handles(), 0);
        assert_eq!(*observer.fetch_states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_drop_stops_running_loop() {
        let observer = Arc::new(Recorder::default());
        let market = MockMarket::new();
        let tracker = tracker(market, observer.clone());
        tracker.start_updates().unwrap();
        observer.wait_for_snapshots(1);

        tracker.shutdown();
        assert_eq!(observer.fetch_states.lock().unwrap().last().copied(), Some(false));
    }

    #[tokio::test]
    async fn test_drop_sends_no_further_requests() {
        let market = Arc::new(MockMarket::new());
        let tracker = MarketTracker::with_transport(config(), market.clone(), Arc::new(Recorder::default())).unwrap();
        tracker.add_equity("AAPL", 1).unwrap();

        tracker.refresh_once().await.unwrap();
        let calls = market.calls();
        assert_eq!(calls, 9);
        drop(tracker);
        assert_eq!(market.calls(), calls);
    }
}
