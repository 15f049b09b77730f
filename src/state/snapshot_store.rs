use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::types::{MarketSnapshot, Trade};

// ---------------------------------------------------------------------------
// MarketSnapshotStore
// ---------------------------------------------------------------------------

/// Latest observed state per market ticker, plus the trade batch seen with it.
///
/// The polling controller is the only writer. The query API and tests read
/// concurrently; DashMap's per-shard locks make every single-key operation atomic.
pub struct MarketSnapshotStore {
    /// ticker → last snapshot
    snapshots: DashMap<String, MarketSnapshot>,
    /// ticker → trades fetched in the cycle that produced the snapshot (inspection only)
    trades: DashMap<String, Vec<Trade>>,
}

impl MarketSnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshots: DashMap::new(),
            trades: DashMap::new(),
        })
    }

    /// Store `snapshot` and return the one it replaced.
    /// The read of the old value and the write of the new one happen under one shard lock.
    pub fn replace(&self, snapshot: MarketSnapshot) -> Option<MarketSnapshot> {
        self.snapshots.insert(snapshot.ticker.clone(), snapshot)
    }

    pub fn get(&self, ticker: &str) -> Option<MarketSnapshot> {
        self.snapshots.get(ticker).map(|r| r.value().clone())
    }

    pub fn cache_trades(&self, ticker: &str, trades: Vec<Trade>) {
        self.trades.insert(ticker.to_string(), trades);
    }

    pub fn recent_trades(&self, ticker: &str) -> Vec<Trade> {
        self.trades.get(ticker).map(|r| r.value().clone()).unwrap_or_default()
    }

    /// Drop snapshots (and their cached trades) last observed before `cutoff`.
    /// Returns how many tickers were evicted.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .snapshots
            .iter()
            .filter(|r| r.value().observed_at < cutoff)
            .map(|r| r.key().clone())
            .collect();

        let mut evicted = 0;
        for ticker in &stale {
            // Re-check under the entry lock: a concurrent refresh may have landed.
            if self.snapshots.remove_if(ticker, |_, s| s.observed_at < cutoff).is_some() {
                self.trades.remove(ticker);
                evicted += 1;
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.snapshots.iter().map(|r| r.key().clone()).collect()
    }
}
