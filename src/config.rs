use std::time::Duration;

use crate::error::{AppError, Result};

pub const KALSHI_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Port for the read-only signal query API.
pub const API_PORT: u16 = 3001;

/// Seconds between poll cycles.
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Delay between per-market trade fetches inside one cycle (milliseconds).
pub const MARKET_PACING_MS: u64 = 100;

/// Trades requested per market per cycle. The venue returns the last hour only.
pub const TRADE_FETCH_LIMIT: usize = 50;

/// Max signals retained by the activity tracker.
pub const SIGNAL_CAPACITY: usize = 1000;

/// Snapshots not refreshed for this long are swept at the end of a cycle.
pub const SNAPSHOT_TTL_SECS: u64 = 24 * 3600;

/// HTTP timeout applied to every venue request.
pub const VENUE_TIMEOUT_SECS: u64 = 10;

/// Markets requested per page from the venue listing endpoint.
pub const MARKET_PAGE_SIZE: usize = 1000;

/// Hard cap on listing pages per cycle.
pub const MARKET_MAX_PAGES: usize = 10;

/// Neutral price in cents used when the venue omits a price.
pub const NEUTRAL_PRICE_CENTS: u32 = 50;

/// Heuristic constants for the signal detector.
pub mod heuristics {
    /// Volume-spike confidence never exceeds this.
    pub const SPIKE_CONFIDENCE_CAP: u8 = 95;
    /// Directional flow needs at least this many trades in the batch.
    pub const FLOW_MIN_TRADES: usize = 5;
    /// Dominant-side share at or above which directional flow fires.
    pub const FLOW_RATIO_THRESHOLD: f64 = 0.70;
    /// Fixed confidence for a notional (USD) whale trade.
    pub const WHALE_NOTIONAL_CONFIDENCE: u8 = 85;
    /// Fixed confidence for a contract-count large trade.
    pub const LARGE_TRADE_CONFIDENCE: u8 = 65;
}

/// Title/series/category keywords that mark a weather or climate market.
pub const DEFAULT_TARGET_KEYWORDS: &[&str] = &[
    "weather", "temperature", "rain", "snow", "storm", "hurricane", "tornado", "flood",
    "drought", "precipitation", "celsius", "fahrenheit", "wind", "heat", "cold", "freeze",
    "frost", "blizzard", "hail", "thunder", "lightning", "degrees", "°f", "°c",
    "climate", "warming", "carbon", "emissions", "sea level", "glacier", "ice cap",
    "el nino", "la nina", "arctic", "antarctic",
];

/// Series ticker prefixes of the venue's weather series.
pub const DEFAULT_TARGET_SERIES: &[&str] = &["kxhigh", "kxlow", "kxsnow", "kxrain", "highnyc", "temp"];

/// Unit of the large-trade threshold. Exactly one is configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WhaleThreshold {
    /// USD notional: `count * taker_price_cents / 100 >= usd`.
    Notional(f64),
    /// Raw contract count: `count >= contracts`.
    Contracts(u64),
}

impl WhaleThreshold {
    /// `unit` is `notional` or `contracts` (WHALE_THRESHOLD_UNIT).
    pub fn parse(unit: &str, value: &str) -> Result<Self> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "notional" | "usd" => value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(WhaleThreshold::Notional)
                .ok_or_else(|| AppError::Config(format!("MIN_TRADE_SIZE must be a non-negative number, got {value:?}"))),
            "contracts" | "count" => value
                .trim()
                .parse::<u64>()
                .map(WhaleThreshold::Contracts)
                .map_err(|_| AppError::Config(format!("MIN_TRADE_SIZE must be a whole contract count, got {value:?}"))),
            other => Err(AppError::Config(format!(
                "WHALE_THRESHOLD_UNIT must be 'notional' or 'contracts', got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for WhaleThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhaleThreshold::Notional(usd) => write!(f, "${usd:.0} notional"),
            WhaleThreshold::Contracts(n) => write!(f, "{n} contracts"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub private_key: String,
    pub log_level: String,
    pub api_port: u16,
    /// Simulate trades instead of placing orders (BOT_DEMO_MODE, default true)
    pub demo_mode: bool,
    pub poll_interval: Duration,
    pub market_pacing: Duration,
    pub trade_fetch_limit: usize,
    /// Markets below this volume are never analysed for signals (MIN_VOLUME)
    pub min_volume: u64,
    /// Large-trade threshold (WHALE_THRESHOLD_UNIT + MIN_TRADE_SIZE)
    pub whale_threshold: WhaleThreshold,
    /// Percent volume increase between polls that counts as a spike (VOLUME_SPIKE_THRESHOLD)
    pub volume_spike_threshold: f64,
    /// Fraction of detected size proposed for the follow-on order (FOLLOW_RATIO)
    pub follow_ratio: f64,
    /// Max contracts per follow-on order (MAX_POSITION_SIZE)
    pub max_position_size: u64,
    /// Executed (non-simulated) orders allowed per local day (MAX_DAILY_TRADES)
    pub max_daily_trades: u32,
    pub signal_capacity: usize,
    pub snapshot_ttl: Duration,
    /// Comma-separated keyword override (TARGET_KEYWORDS)
    pub target_keywords: Vec<String>,
    /// Comma-separated series prefix override (TARGET_SERIES)
    pub target_series: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let follow_ratio = parse_var("FOLLOW_RATIO", 0.3_f64)?;
        if !(0.0..=1.0).contains(&follow_ratio) {
            return Err(AppError::Config("FOLLOW_RATIO must be between 0 and 1".to_string()));
        }

        let whale_threshold = WhaleThreshold::parse(
            &std::env::var("WHALE_THRESHOLD_UNIT").unwrap_or_else(|_| "contracts".to_string()),
            &std::env::var("MIN_TRADE_SIZE").unwrap_or_else(|_| "10".to_string()),
        )?;

        let volume_spike_threshold =
            validate_spike_threshold(parse_var("VOLUME_SPIKE_THRESHOLD", 30.0_f64)?)?;

        let poll_secs = parse_var("POLL_INTERVAL_SECS", POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(AppError::Config("POLL_INTERVAL_SECS must be at least 1".to_string()));
        }

        Ok(Self {
            api_url: std::env::var("KALSHI_API_URL").unwrap_or_else(|_| KALSHI_API_URL.to_string()),
            api_key: std::env::var("KALSHI_API_KEY").unwrap_or_default(),
            private_key: std::env::var("KALSHI_PRIVATE_KEY").unwrap_or_default(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| API_PORT.to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            demo_mode: std::env::var("BOT_DEMO_MODE").map(|v| v != "false").unwrap_or(true),
            poll_interval: Duration::from_secs(poll_secs),
            market_pacing: Duration::from_millis(parse_var("MARKET_PACING_MS", MARKET_PACING_MS)?),
            trade_fetch_limit: parse_var("TRADE_FETCH_LIMIT", TRADE_FETCH_LIMIT)?,
            min_volume: parse_var("MIN_VOLUME", 1000_u64)?,
            whale_threshold,
            volume_spike_threshold,
            follow_ratio,
            max_position_size: parse_var("MAX_POSITION_SIZE", 100_u64)?,
            max_daily_trades: parse_var("MAX_DAILY_TRADES", 20_u32)?,
            signal_capacity: parse_var("SIGNAL_CAPACITY", SIGNAL_CAPACITY)?.max(1),
            snapshot_ttl: Duration::from_secs(parse_var("SNAPSHOT_TTL_SECS", SNAPSHOT_TTL_SECS)?),
            target_keywords: list_var("TARGET_KEYWORDS", DEFAULT_TARGET_KEYWORDS),
            target_series: list_var("TARGET_SERIES", DEFAULT_TARGET_SERIES),
        })
    }

    /// Missing credentials are the one fatal startup condition.
    pub fn require_credentials(&self) -> Result<()> {
        if self.api_key.trim().is_empty() || self.private_key.trim().is_empty() {
            return Err(AppError::Config(
                "missing API credentials: set KALSHI_API_KEY and KALSHI_PRIVATE_KEY".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_spike_threshold(pct: f64) -> Result<f64> {
    if !pct.is_finite() || pct < 0.0 {
        return Err(AppError::Config(format!(
            "VOLUME_SPIKE_THRESHOLD must be a non-negative percentage, got {pct}"
        )));
    }
    Ok(pct)
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}

fn list_var(name: &str, default: &[&str]) -> Vec<String> {
    let parsed: Vec<String> = std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if parsed.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        parsed
    }
}
