use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::detector::heuristics::{self, DetectorParams};
use crate::state::MarketSnapshotStore;
use crate::types::{Market, MarketSnapshot, Trade, TradeSignal};

/// Turns one market observation plus its recent trades into at most one signal.
pub struct SignalDetector {
    store: Arc<MarketSnapshotStore>,
    params: DetectorParams,
}

impl SignalDetector {
    pub fn new(store: Arc<MarketSnapshotStore>, params: DetectorParams) -> Self {
        Self { store, params }
    }

    pub fn analyze(&self, market: &Market, trades: &[Trade]) -> Option<TradeSignal> {
        self.analyze_at(market, trades, Utc::now())
    }

    /// Record the observation, then run every heuristic against the previous
    /// snapshot and return the strongest candidate.
    ///
    /// The snapshot is refreshed even when the market is gated out, so a market
    /// that later crosses `min_volume` already has a baseline. A ticker seen for
    /// the first time never yields a signal.
    pub fn analyze_at(&self, market: &Market, trades: &[Trade], now: DateTime<Utc>) -> Option<TradeSignal> {
        let current = MarketSnapshot::from_market(market, now);
        let previous = self.store.replace(current.clone());
        self.store.cache_trades(&market.ticker, trades.to_vec());

        if market.volume < self.params.min_volume {
            debug!(ticker = %market.ticker, volume = market.volume, "below min volume, skipped");
            return None;
        }

        let Some(previous) = previous else {
            debug!(ticker = %market.ticker, "first observation, no baseline yet");
            return None;
        };

        let candidates = [
            heuristics::volume_spike(&current, &previous, trades, &self.params),
            heuristics::directional_flow(market, trades, &self.params),
            heuristics::large_trade(market, trades, &self.params),
        ];
        heuristics::strongest(candidates.into_iter().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WhaleThreshold;
    use crate::types::{Side, SignalKind};

    fn detector() -> (SignalDetector, Arc<MarketSnapshotStore>) {
        let store = MarketSnapshotStore::new();
        let params = DetectorParams {
            min_volume: 1000,
            volume_spike_threshold: 30.0,
            follow_ratio: 0.5,
            max_position_size: 100,
            whale_threshold: WhaleThreshold::Contracts(25),
        };
        (SignalDetector::new(Arc::clone(&store), params), store)
    }

    fn market(volume: u64) -> Market {
        Market {
            ticker: "KXRAIN-SEA".to_string(),
            title: "Rain in Seattle?".to_string(),
            series_ticker: "KXRAIN".to_string(),
            volume,
            yes_bid: Some(62),
            no_bid: Some(38),
            ..Default::default()
        }
    }

    fn trades(yes: &[u64], no: &[u64]) -> Vec<Trade> {
        yes.iter()
            .map(|c| (Side::Yes, *c))
            .chain(no.iter().map(|c| (Side::No, *c)))
            .map(|(side, count)| Trade {
                taker_side: Some(side),
                count,
                yes_price: Some(62),
                no_price: Some(38),
                created_at: None,
            })
            .collect()
    }

    #[test]
    fn first_observation_never_signals_but_records_snapshot() {
        let (detector, store) = detector();
        let batch = trades(&[20, 20, 20, 20, 20], &[]);

        assert!(detector.analyze(&market(1000), &batch).is_none());
        let snap = store.get("KXRAIN-SEA").expect("snapshot stored");
        assert_eq!(snap.volume_24h, 1000);
        assert_eq!(snap.yes_price, 62);
        assert_eq!(store.recent_trades("KXRAIN-SEA").len(), 5);
    }

    #[test]
    fn illiquid_market_is_gated_but_still_observed() {
        let (detector, store) = detector();
        detector.analyze(&market(100), &[]);
        assert!(detector.analyze(&market(900), &trades(&[50; 6], &[])).is_none());
        assert_eq!(store.get("KXRAIN-SEA").map(|s| s.volume_24h), Some(900));

        // crossing the gate compares against the gated observation
        let signal = detector.analyze(&market(1500), &trades(&[10, 10], &[])).expect("spike");
        assert_eq!(signal.kind, SignalKind::VolumeSpike);
    }

    #[test]
    fn returns_highest_confidence_candidate() {
        let (detector, _) = detector();
        detector.analyze(&market(1000), &[]);

        // spike: +60%, yes 80 / no 20 → 80 ; flow: 0.8 → 80 ; large (≥25): 65
        let batch = trades(&[30, 30, 20], &[10, 10]);
        let signal = detector.analyze(&market(1600), &batch).expect("signal");
        assert_eq!(signal.confidence, 80);
        // equal confidence: the spike was evaluated first
        assert_eq!(signal.kind, SignalKind::VolumeSpike);
        assert_eq!(signal.suggested_size, 40);
    }

    #[test]
    fn flow_wins_when_no_spike() {
        let (detector, _) = detector();
        detector.analyze(&market(1000), &[]);

        let batch = trades(&[10, 10, 10, 10, 10, 10, 10, 10, 10], &[1]);
        let signal = detector.analyze(&market(1010), &batch).expect("signal");
        assert_eq!(signal.kind, SignalKind::DirectionalFlow);
        assert_eq!(signal.confidence, 99);
        assert_eq!(signal.suggested_size, 45);
    }

    #[test]
    fn large_trade_alone() {
        let (detector, _) = detector();
        detector.analyze(&market(1000), &[]);

        let batch = trades(&[30], &[40]);
        let signal = detector.analyze(&market(1000), &batch).expect("signal");
        assert_eq!(signal.kind, SignalKind::LargeTrade);
        assert_eq!(signal.confidence, 65);
        assert_eq!(signal.side, Side::Yes);
        assert_eq!(signal.suggested_size, 15);
    }

    #[test]
    fn quiet_market_yields_nothing() {
        let (detector, _) = detector();
        detector.analyze(&market(1000), &[]);
        assert!(detector.analyze(&market(1000), &trades(&[1, 1], &[1, 1])).is_none());
    }
}
