//! Bounded, newest-first log of accepted signals and the aggregate views the
//! query API serves from it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::config::SIGNAL_CAPACITY;
use crate::types::{ActivitySummary, MarketStats, NewSignal, SignalKind, TimeBucket, WhaleSignal};

/// Rows of `market_stats` included in the summary.
const SUMMARY_TOP_MARKETS: usize = 5;

pub struct ActivityTracker {
    /// Front = newest.
    signals: RwLock<VecDeque<WhaleSignal>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl ActivityTracker {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn new() -> Arc<Self> {
        Self::with_capacity(SIGNAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            signals: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_seq: AtomicU64::new(1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add_signal(&self, input: NewSignal) -> WhaleSignal {
        self.add_signal_at(input, Utc::now())
    }

    /// Record `input` as created at `now`. Evicts the oldest entries past capacity.
    pub fn add_signal_at(&self, input: NewSignal, now: DateTime<Utc>) -> WhaleSignal {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let stored = WhaleSignal {
            id: format!("{}_{seq:06}", now.timestamp_millis()),
            timestamp: now,
            ticker: input.ticker,
            market_title: input.market_title,
            signal_type: input.signal_type,
            side: input.side,
            confidence: input.confidence,
            price: input.price,
            size: input.size,
            reason: input.reason,
            volume_24h: input.volume_24h,
            metadata: input.metadata,
        };

        let mut signals = self.signals.write();
        signals.push_front(stored.clone());
        signals.truncate(self.capacity);
        stored
    }

    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn recent(&self, limit: usize) -> Vec<WhaleSignal> {
        self.signals.read().iter().take(limit).cloned().collect()
    }

    pub fn by_market(&self, ticker: &str) -> Vec<WhaleSignal> {
        self.signals.read().iter().filter(|s| s.ticker == ticker).cloned().collect()
    }

    pub fn by_type(&self, kind: SignalKind) -> Vec<WhaleSignal> {
        self.signals.read().iter().filter(|s| s.signal_type == kind).cloned().collect()
    }

    /// One row per ticker, highest whale activity first.
    pub fn market_stats(&self) -> Vec<MarketStats> {
        let signals = self.signals.read();
        market_stats_of(signals.iter())
    }

    pub fn time_series(&self, hours: usize) -> Vec<TimeBucket> {
        self.time_series_at(hours, Utc::now())
    }

    /// `hours` one-hour bins ending at `now`, oldest first.
    pub fn time_series_at(&self, hours: usize, now: DateTime<Utc>) -> Vec<TimeBucket> {
        if hours == 0 {
            return Vec::new();
        }
        let hour_ms = Duration::hours(1).num_milliseconds();
        let window_ms = hour_ms * hours as i64;

        // index 0 = the hour ending now
        let mut counts = vec![0usize; hours];
        let mut confidence = vec![0u64; hours];
        for signal in self.signals.read().iter() {
            let age_ms = (now - signal.timestamp).num_milliseconds().max(0);
            if age_ms > window_ms {
                continue;
            }
            let bucket = ((age_ms / hour_ms) as usize).min(hours - 1);
            counts[bucket] += 1;
            confidence[bucket] += u64::from(signal.confidence);
        }

        (0..hours)
            .rev()
            .map(|i| TimeBucket {
                time: now - Duration::hours(i as i64),
                count: counts[i],
                avg_confidence: if counts[i] > 0 {
                    confidence[i] as f64 / counts[i] as f64
                } else {
                    0.0
                },
            })
            .collect()
    }

    pub fn summary(&self) -> ActivitySummary {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> ActivitySummary {
        let signals = self.signals.read();
        let hour = Duration::hours(1);
        let day = Duration::hours(24);

        let mut last_1h = 0usize;
        let mut last_24h = 0usize;
        let mut confidence_24h = 0u64;
        for signal in signals.iter() {
            let age = now - signal.timestamp;
            if age < hour {
                last_1h += 1;
            }
            if age < day {
                last_24h += 1;
                confidence_24h += u64::from(signal.confidence);
            }
        }

        let mut top_markets = market_stats_of(signals.iter());
        top_markets.truncate(SUMMARY_TOP_MARKETS);

        ActivitySummary {
            total: signals.len(),
            last_1h,
            last_24h,
            avg_confidence: if last_24h > 0 {
                confidence_24h as f64 / last_24h as f64
            } else {
                0.0
            },
            top_markets,
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn clear(&self) {
        self.signals.write().clear();
    }
}

/// Size contribution to the whale activity score: saturates at 100 contracts.
fn size_score(size: u64) -> f64 {
    (size as f64 / 100.0).min(1.0) * 100.0
}

fn market_stats_of<'a>(signals: impl Iterator<Item = &'a WhaleSignal>) -> Vec<MarketStats> {
    let mut by_ticker: HashMap<&str, MarketStats> = HashMap::new();

    // Newest first, so the first entry per ticker supplies title and last price.
    for signal in signals {
        let activity = (f64::from(signal.confidence) + size_score(signal.size)) / 2.0;
        let stats = by_ticker.entry(signal.ticker.as_str()).or_insert_with(|| MarketStats {
            ticker: signal.ticker.clone(),
            title: signal.market_title.clone(),
            volume_24h: signal.volume_24h,
            last_price: signal.price,
            signal_count: 0,
            last_signal: signal.timestamp,
            whale_activity: 0.0,
        });
        stats.signal_count += 1;
        stats.last_signal = stats.last_signal.max(signal.timestamp);
        stats.volume_24h = stats.volume_24h.max(signal.volume_24h);
        stats.whale_activity = stats.whale_activity.max(activity);
    }

    let mut rows: Vec<MarketStats> = by_ticker.into_values().collect();
    rows.sort_by(|a, b| {
        b.whale_activity
            .total_cmp(&a.whale_activity)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    rows
}
