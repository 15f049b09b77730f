use crate::config::heuristics::*;
use crate::config::{Config, WhaleThreshold};
use crate::types::{Market, MarketSnapshot, Side, SignalKind, SignalMetadata, Trade, TradeSignal};

/// Thresholds the three heuristics read.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    pub min_volume: u64,
    /// Percent increase between consecutive polls.
    pub volume_spike_threshold: f64,
    pub follow_ratio: f64,
    pub max_position_size: u64,
    pub whale_threshold: WhaleThreshold,
}

impl DetectorParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            min_volume: cfg.min_volume,
            volume_spike_threshold: cfg.volume_spike_threshold,
            follow_ratio: cfg.follow_ratio,
            max_position_size: cfg.max_position_size,
            whale_threshold: cfg.whale_threshold,
        }
    }

    fn follow_size(&self, contracts: u64) -> u64 {
        (contracts as f64 * self.follow_ratio).round() as u64
    }

    fn capped_follow_size(&self, contracts: u64) -> u64 {
        self.follow_size(contracts).min(self.max_position_size)
    }
}

// ---------------------------------------------------------------------------
// Side tally
// ---------------------------------------------------------------------------

/// Aggregate contract count per taker side. Trades with no taker side are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideFlow {
    pub yes: u64,
    pub no: u64,
}

impl SideFlow {
    pub fn tally(trades: &[Trade]) -> Self {
        trades.iter().fold(Self::default(), |mut acc, t| {
            match t.taker_side {
                Some(Side::Yes) => acc.yes = acc.yes.saturating_add(t.count),
                Some(Side::No) => acc.no = acc.no.saturating_add(t.count),
                None => {}
            }
            acc
        })
    }

    pub fn total(&self) -> u64 {
        self.yes.saturating_add(self.no)
    }

    /// Larger side and its volume. An exact tie goes to NO.
    pub fn dominant(&self) -> (Side, u64) {
        if self.yes > self.no {
            (Side::Yes, self.yes)
        } else {
            (Side::No, self.no)
        }
    }

    /// Share of total volume on `side`. `None` when nothing traded.
    pub fn ratio(&self, side: Side) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let volume = match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        };
        Some(volume as f64 / total as f64)
    }
}

fn percent(ratio: f64) -> u8 {
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

/// Volume grew by at least the threshold percent since the previous poll.
pub fn volume_spike(
    current: &MarketSnapshot,
    previous: &MarketSnapshot,
    trades: &[Trade],
    params: &DetectorParams,
) -> Option<TradeSignal> {
    if previous.volume_24h == 0 {
        return None;
    }
    let increase = (current.volume_24h as f64 - previous.volume_24h as f64) * 100.0
        / previous.volume_24h as f64;
    if increase < params.volume_spike_threshold {
        return None;
    }

    let flow = SideFlow::tally(trades);
    let (side, dominant) = flow.dominant();
    let flow_ratio = flow.ratio(side)?;

    Some(TradeSignal {
        ticker: current.ticker.clone(),
        market_title: current.title.clone(),
        side,
        confidence: percent(flow_ratio).min(SPIKE_CONFIDENCE_CAP),
        suggested_price: current.price_for(side),
        suggested_size: params.follow_size(dominant),
        reason: format!(
            "Volume spike: +{increase:.1}% with {:.0}% {} flow",
            flow_ratio * 100.0,
            side.label()
        ),
        kind: SignalKind::VolumeSpike,
        metadata: SignalMetadata {
            volume_change_pct: Some(increase),
            flow_ratio: Some(flow_ratio),
            trade_value: None,
        },
    })
}

/// One side took at least 70% of the batch's contract volume.
pub fn directional_flow(market: &Market, trades: &[Trade], params: &DetectorParams) -> Option<TradeSignal> {
    if trades.len() < FLOW_MIN_TRADES {
        return None;
    }

    let flow = SideFlow::tally(trades);
    let side = [Side::Yes, Side::No]
        .into_iter()
        .find(|s| flow.ratio(*s).is_some_and(|r| r >= FLOW_RATIO_THRESHOLD))?;
    let ratio = flow.ratio(side)?;
    let volume = match side {
        Side::Yes => flow.yes,
        Side::No => flow.no,
    };
    let price = match side {
        Side::Yes => market.yes_price(),
        Side::No => market.no_price(),
    };

    Some(TradeSignal {
        ticker: market.ticker.clone(),
        market_title: market.title.clone(),
        side,
        confidence: percent(ratio),
        suggested_price: price,
        suggested_size: params.capped_follow_size(volume),
        reason: format!(
            "Strong {} flow: {:.0}% of {} contracts",
            side.label(),
            ratio * 100.0,
            flow.total()
        ),
        kind: SignalKind::DirectionalFlow,
        metadata: SignalMetadata {
            volume_change_pct: None,
            flow_ratio: Some(ratio),
            trade_value: None,
        },
    })
}

/// The most recent trade at or above the configured large-trade threshold.
pub fn large_trade(market: &Market, trades: &[Trade], params: &DetectorParams) -> Option<TradeSignal> {
    let qualifies = |t: &Trade| match params.whale_threshold {
        WhaleThreshold::Notional(usd) => t.notional_usd() >= usd,
        WhaleThreshold::Contracts(n) => t.count >= n,
    };

    // Strict comparison keeps the earliest batch entry among equal timestamps.
    let latest = trades
        .iter()
        .filter(|t| t.taker_side.is_some() && qualifies(t))
        .fold(None::<&Trade>, |best, t| match best {
            Some(b) if t.created_at <= b.created_at => Some(b),
            _ => Some(t),
        })?;
    let side = latest.taker_side?;
    let price = latest.taker_price();
    let value = latest.notional_usd();

    let (confidence, reason) = match params.whale_threshold {
        WhaleThreshold::Notional(_) => (
            WHALE_NOTIONAL_CONFIDENCE,
            format!(
                "Whale trade: {} ({} {} contracts @ {price}¢)",
                format_usd(value),
                latest.count,
                side.label()
            ),
        ),
        WhaleThreshold::Contracts(_) => (
            LARGE_TRADE_CONFIDENCE,
            format!("Large trade: {} {} contracts @ {price}¢", latest.count, side.label()),
        ),
    };

    Some(TradeSignal {
        ticker: market.ticker.clone(),
        market_title: market.title.clone(),
        side,
        confidence,
        suggested_price: price,
        suggested_size: params.capped_follow_size(latest.count),
        reason,
        kind: SignalKind::LargeTrade,
        metadata: SignalMetadata {
            volume_change_pct: None,
            flow_ratio: None,
            trade_value: Some(value),
        },
    })
}

/// `$2.50M`, `$125K` or `$640`.
fn format_usd(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("${:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.0}K", value / 1_000.0)
    } else {
        format!("${value:.0}")
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// True when `a` beats `b`: higher confidence, then earlier evaluation order.
pub fn outranks(a: &TradeSignal, b: &TradeSignal) -> bool {
    a.confidence > b.confidence
        || (a.confidence == b.confidence && a.kind.evaluation_rank() < b.kind.evaluation_rank())
}

pub fn strongest(candidates: impl IntoIterator<Item = TradeSignal>) -> Option<TradeSignal> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(b) if !outranks(&candidate, &b) => Some(b),
        _ => Some(candidate),
    })
}
