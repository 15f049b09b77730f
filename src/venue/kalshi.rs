use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use tracing::{debug, warn};

use crate::config::{Config, MARKET_MAX_PAGES, MARKET_PAGE_SIZE, VENUE_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{Market, OrderResult, Position, Side, Trade};
use crate::venue::Venue;

/// Trades older than this are not requested.
const TRADE_WINDOW_SECS: i64 = 3600;

/// REST client for the Kalshi trade API.
pub struct KalshiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl KalshiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(VENUE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("KALSHI-ACCESS-KEY", &self.api_key)
            .header("KALSHI-ACCESS-TIMESTAMP", Utc::now().timestamp_millis().to_string())
    }

    async fn send_json(&self, req: RequestBuilder, what: &str) -> Result<serde_json::Value> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Venue(format!("{what} returned {status}: {}", truncate(&body, 200))));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Venue for KalshiClient {
    async fn list_open_markets(&self) -> Result<Vec<Market>> {
        let mut markets = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MARKET_MAX_PAGES {
            let mut query = vec![
                ("status", "open".to_string()),
                ("limit", MARKET_PAGE_SIZE.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let resp = self
                .send_json(self.request(Method::GET, "/markets").query(&query), "GET /markets")
                .await?;
            let items = resp
                .get("markets")
                .and_then(|m| m.as_array())
                .ok_or_else(|| AppError::Venue("GET /markets response had no markets array".to_string()))?;

            let before = markets.len();
            markets.extend(items.iter().filter_map(parse_market));
            let skipped = items.len() - (markets.len() - before);
            if skipped > 0 {
                debug!(page, skipped, "markets without a ticker skipped");
            }

            cursor = resp
                .get("cursor")
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() || items.is_empty() {
                break;
            }
            if page + 1 == MARKET_MAX_PAGES {
                warn!(pages = MARKET_MAX_PAGES, "market listing truncated at page cap");
            }
        }

        Ok(markets)
    }

    async fn list_recent_trades(&self, ticker: &str, limit: usize) -> Result<Vec<Trade>> {
        let min_ts = Utc::now().timestamp() - TRADE_WINDOW_SECS;
        let query = [
            ("ticker", ticker.to_string()),
            ("limit", limit.to_string()),
            ("min_ts", min_ts.to_string()),
        ];
        let resp = self
            .send_json(self.request(Method::GET, "/markets/trades").query(&query), "GET /markets/trades")
            .await?;

        Ok(resp
            .get("trades")
            .and_then(|t| t.as_array())
            .map(|items| items.iter().map(parse_trade).collect())
            .unwrap_or_default())
    }

    async fn place_order(&self, ticker: &str, side: Side, count: u64, price_cents: u32) -> Result<OrderResult> {
        let mut body = serde_json::json!({
            "ticker": ticker,
            "action": "buy",
            "side": side.to_string(),
            "count": count,
            "type": "limit",
            "client_order_id": uuid::Uuid::new_v4().to_string(),
        });
        let price_field = match side {
            Side::Yes => "yes_price",
            Side::No => "no_price",
        };
        body[price_field] = serde_json::json!(price_cents);

        let resp = self
            .send_json(
                self.request(Method::POST, "/portfolio/orders").json(&body),
                "POST /portfolio/orders",
            )
            .await?;

        let order = resp.get("order");
        Ok(OrderResult {
            order_id: order.and_then(|o| str_field(o, "order_id")),
            status: order.and_then(|o| str_field(o, "status")),
        })
    }

    async fn list_positions(&self) -> Result<Vec<Position>> {
        let resp = self
            .send_json(self.request(Method::GET, "/portfolio/positions"), "GET /portfolio/positions")
            .await?;

        Ok(resp
            .get("market_positions")
            .and_then(|p| p.as_array())
            .map(|items| items.iter().filter_map(parse_position).collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Response parsing. Missing numeric fields stay None/0, never an error.
// ---------------------------------------------------------------------------

fn str_field(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key).and_then(|s| s.as_str()).map(str::to_string)
}

fn u64_field(v: &serde_json::Value, key: &str) -> Option<u64> {
    v.get(key).and_then(|x| {
        x.as_u64()
            .or_else(|| x.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .or_else(|| x.as_str().and_then(|s| s.parse().ok()))
    })
}

fn i64_field(v: &serde_json::Value, key: &str) -> Option<i64> {
    v.get(key).and_then(|x| {
        x.as_i64()
            .or_else(|| x.as_f64().map(|f| f.round() as i64))
            .or_else(|| x.as_str().and_then(|s| s.parse().ok()))
    })
}

fn cents_field(v: &serde_json::Value, key: &str) -> Option<u32> {
    u64_field(v, key).map(|c| c.min(100) as u32)
}

pub(crate) fn parse_market(v: &serde_json::Value) -> Option<Market> {
    let ticker = str_field(v, "ticker").filter(|t| !t.is_empty())?;
    let event_ticker = str_field(v, "event_ticker").unwrap_or_default();
    // Markets carry an event ticker; the series is its first segment.
    let series_ticker = str_field(v, "series_ticker")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| event_ticker.split('-').next().unwrap_or_default().to_string());

    Some(Market {
        ticker,
        title: str_field(v, "title").unwrap_or_default(),
        subtitle: str_field(v, "subtitle").unwrap_or_default(),
        category: str_field(v, "category").unwrap_or_default(),
        series_ticker,
        volume: u64_field(v, "volume").unwrap_or(0),
        yes_bid: cents_field(v, "yes_bid"),
        no_bid: cents_field(v, "no_bid"),
    })
}

pub(crate) fn parse_trade(v: &serde_json::Value) -> Trade {
    Trade {
        taker_side: v.get("taker_side").and_then(|s| s.as_str()).and_then(Side::parse),
        count: u64_field(v, "count").unwrap_or(0),
        yes_price: cents_field(v, "yes_price"),
        no_price: cents_field(v, "no_price"),
        created_at: v
            .get("created_time")
            .and_then(|s| s.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn parse_position(v: &serde_json::Value) -> Option<Position> {
    Some(Position {
        ticker: str_field(v, "ticker")?,
        position: i64_field(v, "position").unwrap_or(0),
        market_exposure: i64_field(v, "market_exposure").unwrap_or(0),
        total_traded_value: i64_field(v, "total_traded").unwrap_or(0),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
