pub mod daily;
pub mod filter;

pub use daily::DailyTradeCounter;
pub use filter::TargetFilter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::detector::{DetectorParams, SignalDetector};
use crate::error::Result;
use crate::state::{ActivityTracker, MarketSnapshotStore};
use crate::types::{NewSignal, TradeSignal};
use crate::venue::Venue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Running,
}

/// Everything the controller reads from configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    /// Pause between per-market trade fetches.
    pub market_pacing: Duration,
    pub trade_fetch_limit: usize,
    /// Log hypothetical orders instead of placing them.
    pub demo_mode: bool,
    pub max_daily_trades: u32,
    pub snapshot_ttl: Duration,
    pub detector: DetectorParams,
    pub filter: TargetFilter,
}

impl ControllerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            market_pacing: cfg.market_pacing,
            trade_fetch_limit: cfg.trade_fetch_limit,
            demo_mode: cfg.demo_mode,
            max_daily_trades: cfg.max_daily_trades,
            snapshot_ttl: cfg.snapshot_ttl,
            detector: DetectorParams::from_config(cfg),
            filter: TargetFilter::from_config(cfg),
        }
    }
}

/// What the trade policy did with one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    Executed,
    Simulated,
    SkippedDailyLimit,
    SkippedZeroSize,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub markets_seen: usize,
    pub targets: usize,
    pub signals: usize,
    pub executed: usize,
    pub simulated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Targets whose trade fetch failed this cycle.
    pub fetch_errors: usize,
    pub evicted: usize,
}

impl CycleReport {
    fn count(&mut self, outcome: TradeOutcome) {
        match outcome {
            TradeOutcome::Executed => self.executed += 1,
            TradeOutcome::Simulated => self.simulated += 1,
            TradeOutcome::SkippedDailyLimit | TradeOutcome::SkippedZeroSize => self.skipped += 1,
            TradeOutcome::Failed => self.failed += 1,
        }
    }
}

/// Cloneable stop switch for a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    health: Arc<HealthState>,
}

impl ControllerHandle {
    /// Interrupts the inter-cycle sleep. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> ControllerState {
        if self.health.running() {
            ControllerState::Running
        } else {
            ControllerState::Stopped
        }
    }
}

// ---------------------------------------------------------------------------
// PollingController
// ---------------------------------------------------------------------------

/// Drives the poll → detect → record → trade loop on a single task.
pub struct PollingController {
    venue: Arc<dyn Venue>,
    store: Arc<MarketSnapshotStore>,
    tracker: Arc<ActivityTracker>,
    detector: SignalDetector,
    daily: DailyTradeCounter,
    settings: ControllerSettings,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl PollingController {
    pub fn new(
        venue: Arc<dyn Venue>,
        store: Arc<MarketSnapshotStore>,
        tracker: Arc<ActivityTracker>,
        settings: ControllerSettings,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        let detector = SignalDetector::new(Arc::clone(&store), settings.detector.clone());
        let daily = DailyTradeCounter::new(settings.max_daily_trades, Local::now().naive_local());
        let (stop_tx, _) = watch::channel(false);
        Self {
            venue,
            store,
            tracker,
            detector,
            daily,
            settings,
            health,
            latency,
            stop_tx: Arc::new(stop_tx),
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            stop_tx: Arc::clone(&self.stop_tx),
            health: Arc::clone(&self.health),
        }
    }

    /// Run cycles until stopped. Cycle errors are logged; the loop carries on.
    pub async fn run(mut self) {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() {
            info!("[CYCLE] stop requested before start, not running");
            return;
        }

        self.health.set_running(true);
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            demo = self.settings.demo_mode,
            max_daily_trades = self.settings.max_daily_trades,
            "[CYCLE] controller started ({})",
            if self.settings.demo_mode { "simulation" } else { "LIVE" },
        );

        loop {
            let started = Instant::now();
            match self.run_cycle().await {
                Ok(report) => info!(
                    markets = report.markets_seen,
                    targets = report.targets,
                    signals = report.signals,
                    executed = report.executed,
                    simulated = report.simulated,
                    skipped = report.skipped,
                    failed = report.failed,
                    fetch_errors = report.fetch_errors,
                    evicted = report.evicted,
                    recorded = self.tracker.len(),
                    "[CYCLE] done in {}ms",
                    started.elapsed().as_millis(),
                ),
                Err(e) => error!("[CYCLE] cycle failed: {e}"),
            }
            self.latency.record(started.elapsed());
            self.health.finish_cycle(Utc::now().timestamp_millis().max(0) as u64);

            tokio::select! {
                _ = sleep(self.settings.poll_interval) => {}
                _ = stop_requested(&mut stop_rx) => break,
            }
        }

        self.health.set_running(false);
        info!(cycles = self.health.cycles(), "[CYCLE] controller stopped");
    }

    /// One full pass over the venue: list, filter, detect, record, trade, sweep.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.tick_daily();

        let markets = self.venue.list_open_markets().await?;
        let targets = self.settings.filter.select(&markets);
        let mut report = CycleReport {
            markets_seen: markets.len(),
            targets: targets.len(),
            ..Default::default()
        };
        info!(
            total = markets.len(),
            targets = targets.len(),
            "[FILTER] {} of {} open markets targeted",
            targets.len(),
            markets.len(),
        );

        let mut signals: Vec<(TradeSignal, u64)> = Vec::new();
        for (i, market) in targets.iter().enumerate() {
            if i > 0 && !self.settings.market_pacing.is_zero() {
                sleep(self.settings.market_pacing).await;
            }
            let trades = match self
                .venue
                .list_recent_trades(&market.ticker, self.settings.trade_fetch_limit)
                .await
            {
                Ok(t) => t,
                Err(e) => {
                    warn!(ticker = %market.ticker, "trade fetch failed, skipping market: {e}");
                    report.fetch_errors += 1;
                    continue;
                }
            };
            if let Some(signal) = self.detector.analyze(market, &trades) {
                signals.push((signal, market.volume));
            }
        }
        self.health.set_tracked_markets(self.store.len());

        report.signals = signals.len();
        for (signal, volume) in &signals {
            let outcome = self.process_signal(signal, *volume).await;
            report.count(outcome);
        }

        report.evicted = self.sweep_snapshots();
        Ok(report)
    }

    /// Record the signal, then apply the trade policy to it.
    pub async fn process_signal(&mut self, signal: &TradeSignal, volume_24h: u64) -> TradeOutcome {
        let stored = self.tracker.add_signal(NewSignal::from_trade_signal(signal, volume_24h));
        info!(
            id = %stored.id,
            ticker = %signal.ticker,
            kind = %signal.kind,
            side = %signal.side,
            confidence = signal.confidence,
            "[SIGNAL] {}",
            signal.reason,
        );

        self.tick_daily();
        if !self.daily.can_trade() {
            let reset_in = self.daily.until_reset(Local::now().naive_local());
            info!(
                ticker = %signal.ticker,
                limit = self.daily.limit(),
                "[TRADE] daily limit reached, skipping (resets in {}h{:02}m)",
                reset_in.num_hours(),
                reset_in.num_minutes() % 60,
            );
            return TradeOutcome::SkippedDailyLimit;
        }
        if signal.suggested_size == 0 {
            debug!(ticker = %signal.ticker, "[TRADE] suggested size is zero, skipping");
            return TradeOutcome::SkippedZeroSize;
        }

        if self.settings.demo_mode {
            info!(
                ticker = %signal.ticker,
                side = %signal.side,
                size = signal.suggested_size,
                price = signal.suggested_price,
                "[TRADE] SIMULATED buy {} {} x{} @ {}¢",
                signal.ticker,
                signal.side.label(),
                signal.suggested_size,
                signal.suggested_price,
            );
            return TradeOutcome::Simulated;
        }

        match self
            .venue
            .place_order(&signal.ticker, signal.side, signal.suggested_size, signal.suggested_price)
            .await
        {
            Ok(order) => {
                self.daily.record();
                self.health.set_daily_trades(self.daily.count());
                info!(
                    ticker = %signal.ticker,
                    order_id = order.order_id.as_deref().unwrap_or("-"),
                    status = order.status.as_deref().unwrap_or("-"),
                    daily = self.daily.count(),
                    "[TRADE] order placed: {} {} x{} @ {}¢",
                    signal.ticker,
                    signal.side.label(),
                    signal.suggested_size,
                    signal.suggested_price,
                );
                TradeOutcome::Executed
            }
            Err(e) => {
                error!(ticker = %signal.ticker, "[TRADE] order failed: {e}");
                TradeOutcome::Failed
            }
        }
    }

    #[cfg(test)]
    fn daily_trades(&self) -> u32 {
        self.daily.count()
    }

    fn tick_daily(&mut self) {
        let now = Local::now().naive_local();
        if self.daily.tick(now) {
            info!(limit = self.daily.limit(), "[TRADE] new day, daily trade counter reset");
            self.health.set_daily_trades(0);
        }
    }

    fn sweep_snapshots(&self) -> usize {
        let Ok(ttl) = TimeDelta::from_std(self.settings.snapshot_ttl) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };
        let evicted = self.store.evict_older_than(cutoff);
        if evicted > 0 {
            debug!(evicted, remaining = self.store.len(), "stale snapshots evicted");
        }
        evicted
    }
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    // a closed channel also ends the loop
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WhaleThreshold, DEFAULT_TARGET_KEYWORDS, DEFAULT_TARGET_SERIES};
    use crate::error::AppError;
    use crate::types::{Market, MarketSnapshot, OrderResult, Side, SignalKind, Trade};
    use crate::venue::MockVenue;

    fn settings(demo_mode: bool, max_daily_trades: u32) -> ControllerSettings {
        ControllerSettings {
            poll_interval: Duration::from_secs(30),
            market_pacing: Duration::ZERO,
            trade_fetch_limit: 50,
            demo_mode,
            max_daily_trades,
            snapshot_ttl: Duration::from_secs(24 * 3600),
            detector: DetectorParams {
                min_volume: 1000,
                volume_spike_threshold: 30.0,
                follow_ratio: 0.5,
                max_position_size: 100,
                whale_threshold: WhaleThreshold::Contracts(10_000),
            },
            filter: TargetFilter::new(DEFAULT_TARGET_KEYWORDS, DEFAULT_TARGET_SERIES),
        }
    }

    struct Harness {
        controller: PollingController,
        store: Arc<MarketSnapshotStore>,
        tracker: Arc<ActivityTracker>,
        health: Arc<HealthState>,
    }

    fn harness(venue: MockVenue, settings: ControllerSettings) -> Harness {
        let store = MarketSnapshotStore::new();
        let tracker = ActivityTracker::new();
        let health = Arc::new(HealthState::new());
        let controller = PollingController::new(
            Arc::new(venue),
            Arc::clone(&store),
            Arc::clone(&tracker),
            settings,
            Arc::clone(&health),
            Arc::new(LatencyStats::new()),
        );
        Harness { controller, store, tracker, health }
    }

    fn weather_market(ticker: &str, volume: u64) -> Market {
        Market {
            ticker: ticker.to_string(),
            title: format!("Rain in {ticker}?"),
            series_ticker: "KXRAIN".to_string(),
            volume,
            yes_bid: Some(62),
            no_bid: Some(38),
            ..Default::default()
        }
    }

    /// Baseline of 1000 contracts so a 1600 listing is a +60% spike.
    fn seed_baseline(store: &MarketSnapshotStore, ticker: &str) {
        store.replace(MarketSnapshot {
            ticker: ticker.to_string(),
            title: String::new(),
            volume_24h: 1000,
            yes_price: 62,
            no_price: 38,
            observed_at: Utc::now(),
        });
    }

    /// yes 80 / no 20 over three trades: spike confidence 80, size 40.
    fn yes_heavy_trades() -> Vec<Trade> {
        [(Side::Yes, 40), (Side::Yes, 40), (Side::No, 20)]
            .into_iter()
            .map(|(side, count)| Trade {
                taker_side: Some(side),
                count,
                yes_price: Some(62),
                no_price: Some(38),
                created_at: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn demo_mode_records_signal_without_ordering() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600)]));
        venue
            .expect_list_recent_trades()
            .withf(|ticker, limit| ticker == "SEA" && *limit == 50)
            .returning(|_, _| Ok(yes_heavy_trades()));
        venue.expect_place_order().never();

        let mut h = harness(venue, settings(true, 20));
        seed_baseline(&h.store, "SEA");

        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.signals, 1);
        assert_eq!(report.simulated, 1);
        assert_eq!(h.controller.daily_trades(), 0);

        let recorded = h.tracker.recent(10);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].signal_type, SignalKind::VolumeSpike);
        assert_eq!(recorded[0].confidence, 80);
        assert_eq!(recorded[0].size, 40);
        assert_eq!(recorded[0].volume_24h, 1600);
    }

    #[tokio::test]
    async fn live_mode_places_order_and_counts_it() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600)]));
        venue
            .expect_list_recent_trades()
            .returning(|_, _| Ok(yes_heavy_trades()));
        venue
            .expect_place_order()
            .withf(|ticker, side, count, price| ticker == "SEA" && *side == Side::Yes && *count == 40 && *price == 62)
            .times(1)
            .returning(|_, _, _, _| {
                Ok(OrderResult { order_id: Some("ord-1".to_string()), status: Some("resting".to_string()) })
            });

        let mut h = harness(venue, settings(false, 20));
        seed_baseline(&h.store, "SEA");

        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.executed, 1);
        assert_eq!(h.controller.daily_trades(), 1);
        assert_eq!(h.health.snapshot().daily_trades, 1);
    }

    #[tokio::test]
    async fn daily_limit_skips_but_still_records() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600), weather_market("NYC", 1600)]));
        venue
            .expect_list_recent_trades()
            .times(2)
            .returning(|_, _| Ok(yes_heavy_trades()));
        venue
            .expect_place_order()
            .times(1)
            .returning(|_, _, _, _| Ok(OrderResult::default()));

        let mut h = harness(venue, settings(false, 1));
        seed_baseline(&h.store, "SEA");
        seed_baseline(&h.store, "NYC");

        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.signals, 2);
        assert_eq!(report.executed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.tracker.len(), 2);
    }

    #[tokio::test]
    async fn zero_size_signal_is_skipped() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600)]));
        venue
            .expect_list_recent_trades()
            .returning(|_, _| Ok(yes_heavy_trades()));
        venue.expect_place_order().never();

        let mut s = settings(false, 20);
        s.detector.follow_ratio = 0.0;
        let mut h = harness(venue, s);
        seed_baseline(&h.store, "SEA");

        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.skipped, 1);
        assert_eq!(h.tracker.len(), 1);
    }

    #[tokio::test]
    async fn failed_order_leaves_counter_unchanged() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600)]));
        venue
            .expect_list_recent_trades()
            .returning(|_, _| Ok(yes_heavy_trades()));
        venue
            .expect_place_order()
            .returning(|_, _, _, _| Err(AppError::Venue("insufficient balance".to_string())));

        let mut h = harness(venue, settings(false, 20));
        seed_baseline(&h.store, "SEA");

        let report = h.controller.run_cycle().await.expect("cycle continues");
        assert_eq!(report.failed, 1);
        assert_eq!(h.controller.daily_trades(), 0);
        assert_eq!(h.tracker.len(), 1);
    }

    #[tokio::test]
    async fn trade_fetch_error_skips_only_that_market() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600), weather_market("NYC", 1600)]));
        venue
            .expect_list_recent_trades()
            .withf(|ticker, _| ticker == "SEA")
            .returning(|_, _| Err(AppError::Venue("timeout".to_string())));
        venue
            .expect_list_recent_trades()
            .withf(|ticker, _| ticker == "NYC")
            .returning(|_, _| Ok(yes_heavy_trades()));

        let mut h = harness(venue, settings(true, 20));
        seed_baseline(&h.store, "SEA");
        seed_baseline(&h.store, "NYC");

        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.fetch_errors, 1);
        assert_eq!(report.signals, 1);
        assert_eq!(h.tracker.recent(1)[0].ticker, "NYC");
    }

    #[tokio::test]
    async fn non_target_markets_are_never_fetched() {
        let mut venue = MockVenue::new();
        venue.expect_list_open_markets().returning(|| {
            Ok(vec![Market {
                ticker: "FED-26MAR".to_string(),
                title: "Fed cuts rates?".to_string(),
                series_ticker: "KXFED".to_string(),
                volume: 50_000,
                ..Default::default()
            }])
        });
        venue.expect_list_recent_trades().never();

        let mut h = harness(venue, settings(true, 20));
        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.markets_seen, 1);
        assert_eq!(report.targets, 0);
        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn listing_failure_fails_the_cycle() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Err(AppError::Venue("503".to_string())));

        let mut h = harness(venue, settings(true, 20));
        assert!(h.controller.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn first_cycle_only_builds_baselines() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Ok(vec![weather_market("SEA", 1600)]));
        venue
            .expect_list_recent_trades()
            .returning(|_, _| Ok(yes_heavy_trades()));

        let mut h = harness(venue, settings(true, 20));
        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.signals, 0);
        assert_eq!(h.store.get("SEA").map(|s| s.volume_24h), Some(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_errors_and_stops_on_request() {
        let mut venue = MockVenue::new();
        venue
            .expect_list_open_markets()
            .returning(|| Err(AppError::Venue("down".to_string())));

        let h = harness(venue, settings(true, 20));
        let handle = h.controller.handle();
        assert_eq!(handle.state(), ControllerState::Stopped);

        let task = tokio::spawn(h.controller.run());
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(handle.state(), ControllerState::Running);

        handle.stop();
        task.await.expect("controller task");
        assert_eq!(handle.state(), ControllerState::Stopped);
        assert!(h.health.cycles() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn markets_are_paced_within_a_cycle() {
        let mut venue = MockVenue::new();
        venue.expect_list_open_markets().returning(|| {
            Ok(vec![
                weather_market("SEA", 1600),
                weather_market("NYC", 1600),
                weather_market("DEN", 1600),
            ])
        });
        venue
            .expect_list_recent_trades()
            .times(3)
            .returning(|_, _| Ok(Vec::new()));

        let mut s = settings(true, 20);
        s.market_pacing = Duration::from_millis(250);
        let mut h = harness(venue, s);

        let started = tokio::time::Instant::now();
        let report = h.controller.run_cycle().await.expect("cycle");
        assert_eq!(report.targets, 3);
        // two gaps between three markets, none before the first
        assert!(started.elapsed() >= Duration::from_millis(500), "{:?}", started.elapsed());
        assert!(started.elapsed() < Duration::from_millis(750), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn stop_before_run_returns_immediately() {
        let venue = MockVenue::new();
        let h = harness(venue, settings(true, 20));
        let handle = h.controller.handle();
        handle.stop();
        h.controller.run().await;
        assert_eq!(h.health.cycles(), 0);
    }
}
