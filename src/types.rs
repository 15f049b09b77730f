use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::NEUTRAL_PRICE_CENTS;

// ---------------------------------------------------------------------------
// Venue data
// ---------------------------------------------------------------------------

/// Binary outcome a taker bought, or the side of a follow-on order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(Side::Yes),
            "no" => Some(Side::No),
            _ => None,
        }
    }

    /// Upper-case label used in reason strings and log lines.
    pub fn label(self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "yes"),
            Side::No => write!(f, "no"),
        }
    }
}

/// An open market as listed by the venue. Prices are integer cents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Market {
    pub ticker: String,
    pub title: String,
    pub subtitle: String,
    pub category: String,
    pub series_ticker: String,
    pub volume: u64,
    pub yes_bid: Option<u32>,
    pub no_bid: Option<u32>,
}

impl Market {
    pub fn yes_price(&self) -> u32 {
        self.yes_bid.unwrap_or(NEUTRAL_PRICE_CENTS)
    }

    pub fn no_price(&self) -> u32 {
        self.no_bid.unwrap_or(NEUTRAL_PRICE_CENTS)
    }
}

/// A single executed trade from the venue's recent-trades feed.
/// Fields the venue omitted stay `None`/0 and resolve to neutral values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trade {
    pub taker_side: Option<Side>,
    pub count: u64,
    pub yes_price: Option<u32>,
    pub no_price: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Price paid on the taker's side, in cents.
    pub fn taker_price(&self) -> u32 {
        let price = match self.taker_side {
            Some(Side::Yes) => self.yes_price,
            Some(Side::No) => self.no_price,
            None => None,
        };
        price.unwrap_or(NEUTRAL_PRICE_CENTS)
    }

    /// Dollar value of the trade: `count * price_cents / 100`.
    pub fn notional_usd(&self) -> f64 {
        self.count as f64 * self.taker_price() as f64 / 100.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    /// Signed contract count (negative = short NO exposure).
    pub position: i64,
    /// Cents.
    pub market_exposure: i64,
    /// Cents.
    pub total_traded_value: i64,
}

impl Position {
    pub fn pnl_usd(&self) -> f64 {
        (self.total_traded_value - self.market_exposure) as f64 / 100.0
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Last observed state of one market, used as the baseline for the next poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub title: String,
    pub volume_24h: u64,
    pub yes_price: u32,
    pub no_price: u32,
    pub observed_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn from_market(market: &Market, observed_at: DateTime<Utc>) -> Self {
        Self {
            ticker: market.ticker.clone(),
            title: market.title.clone(),
            volume_24h: market.volume,
            yes_price: market.yes_price(),
            no_price: market.no_price(),
            observed_at,
        }
    }

    pub fn price_for(&self, side: Side) -> u32 {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Which heuristic produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    VolumeSpike,
    DirectionalFlow,
    LargeTrade,
}

impl SignalKind {
    /// Evaluation order. Lower wins a confidence tie.
    pub fn evaluation_rank(self) -> u8 {
        match self {
            SignalKind::VolumeSpike => 0,
            SignalKind::DirectionalFlow => 1,
            SignalKind::LargeTrade => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "volume_spike" => Some(SignalKind::VolumeSpike),
            "directional_flow" => Some(SignalKind::DirectionalFlow),
            "large_trade" => Some(SignalKind::LargeTrade),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalKind::VolumeSpike => "volume_spike",
            SignalKind::DirectionalFlow => "directional_flow",
            SignalKind::LargeTrade => "large_trade",
        };
        write!(f, "{s}")
    }
}

/// Key statistic recorded by whichever heuristic fired.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_change_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_value: Option<f64>,
}

/// Detector output for one market in one poll cycle. Not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSignal {
    pub ticker: String,
    pub market_title: String,
    pub side: Side,
    /// 0–100 heuristic strength, not a probability.
    pub confidence: u8,
    pub suggested_price: u32,
    pub suggested_size: u64,
    pub reason: String,
    pub kind: SignalKind,
    pub metadata: SignalMetadata,
}

/// Input to `ActivityTracker::add_signal`: a signal minus its id and timestamp.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub ticker: String,
    pub market_title: String,
    pub signal_type: SignalKind,
    pub side: Side,
    pub confidence: u8,
    pub price: u32,
    pub size: u64,
    pub reason: String,
    pub volume_24h: u64,
    pub metadata: SignalMetadata,
}

impl NewSignal {
    pub fn from_trade_signal(signal: &TradeSignal, volume_24h: u64) -> Self {
        Self {
            ticker: signal.ticker.clone(),
            market_title: signal.market_title.clone(),
            signal_type: signal.kind,
            side: signal.side,
            confidence: signal.confidence,
            price: signal.suggested_price,
            size: signal.suggested_size,
            reason: signal.reason.clone(),
            volume_24h,
            metadata: signal.metadata.clone(),
        }
    }
}

/// A recorded signal. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhaleSignal {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub market_title: String,
    pub signal_type: SignalKind,
    pub side: Side,
    pub confidence: u8,
    pub price: u32,
    pub size: u64,
    pub reason: String,
    pub volume_24h: u64,
    pub metadata: SignalMetadata,
}

// ---------------------------------------------------------------------------
// Aggregate views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketStats {
    pub ticker: String,
    pub title: String,
    pub volume_24h: u64,
    pub last_price: u32,
    pub signal_count: usize,
    pub last_signal: DateTime<Utc>,
    /// 0–100 score: best `(confidence + size_score) / 2` among the market's signals.
    pub whale_activity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub time: DateTime<Utc>,
    pub count: usize,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub total: usize,
    pub last_1h: usize,
    pub last_24h: usize,
    pub avg_confidence: f64,
    pub top_markets: Vec<MarketStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_notional_uses_taker_side_price() {
        let trade = Trade {
            taker_side: Some(Side::No),
            count: 200,
            yes_price: Some(30),
            no_price: Some(70),
            created_at: None,
        };
        assert_eq!(trade.taker_price(), 70);
        assert!((trade.notional_usd() - 140.0).abs() < 1e-9);
    }

    #[test]
    fn missing_prices_fall_back_to_neutral() {
        let trade = Trade { taker_side: Some(Side::Yes), count: 10, ..Default::default() };
        assert_eq!(trade.taker_price(), NEUTRAL_PRICE_CENTS);

        let market = Market { ticker: "T".to_string(), ..Default::default() };
        assert_eq!(market.yes_price(), 50);
        assert_eq!(market.no_price(), 50);
    }

    #[test]
    fn signal_kind_round_trips_through_wire_name() {
        for kind in [SignalKind::VolumeSpike, SignalKind::DirectionalFlow, SignalKind::LargeTrade] {
            assert_eq!(SignalKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(SignalKind::parse("whale"), None);
    }

    #[test]
    fn position_pnl_is_in_dollars() {
        let pos = Position {
            ticker: "T".to_string(),
            position: 10,
            market_exposure: 450,
            total_traded_value: 600,
        };
        assert!((pos.pnl_usd() - 1.5).abs() < 1e-9);
    }
}
