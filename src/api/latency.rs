//! In-memory histogram of poll-cycle durations.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Shared cycle latency stats. Controller records, API reads.
/// Values stored in milliseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LatencyReport {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

impl LatencyStats {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record_ms(&self, ms: u64) {
        if let Ok(mut h) = self.inner.lock() {
            // sub-millisecond cycles land in the lowest bucket
            let value = ms.clamp(1, h.high());
            let _ = h.record(value);
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.record_ms(ms);
    }

    pub fn report(&self) -> LatencyReport {
        let Ok(h) = self.inner.lock() else {
            return LatencyReport::empty();
        };
        if h.len() == 0 {
            return LatencyReport::empty();
        }
        LatencyReport {
            samples: h.len(),
            p50_ms: Some(h.value_at_quantile(0.5)),
            p95_ms: Some(h.value_at_quantile(0.95)),
            p99_ms: Some(h.value_at_quantile(0.99)),
            max_ms: Some(h.max()),
        }
    }
}

impl LatencyReport {
    fn empty() -> Self {
        Self { samples: 0, p50_ms: None, p95_ms: None, p99_ms: None, max_ms: None }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
