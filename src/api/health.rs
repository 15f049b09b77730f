//! Shared health state for the /health endpoint.
//! Written by the polling controller, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct HealthState {
    /// True between the controller entering and leaving its loop.
    pub running: AtomicBool,
    /// Completed poll cycles, successful or not.
    pub cycles: AtomicU64,
    /// Millisecond timestamp of the last finished cycle (0 = none).
    pub last_cycle_at_ms: AtomicU64,
    pub daily_trades: AtomicU64,
    pub tracked_markets: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthSnapshot {
    pub running: bool,
    pub cycles: u64,
    pub last_cycle_at_ms: Option<u64>,
    pub daily_trades: u64,
    pub tracked_markets: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, v: bool) {
        self.running.store(v, Ordering::Relaxed);
    }

    pub fn finish_cycle(&self, at_ms: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn set_daily_trades(&self, n: u32) {
        self.daily_trades.store(u64::from(n), Ordering::Relaxed);
    }

    pub fn set_tracked_markets(&self, n: usize) {
        self.tracked_markets.store(n as u64, Ordering::Relaxed);
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_cycle_at_ms.load(Ordering::Relaxed);
        HealthSnapshot {
            running: self.running(),
            cycles: self.cycles(),
            last_cycle_at_ms: (last > 0).then_some(last),
            daily_trades: self.daily_trades.load(Ordering::Relaxed),
            tracked_markets: self.tracked_markets.load(Ordering::Relaxed),
        }
    }
}
