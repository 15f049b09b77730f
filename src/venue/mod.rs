//! The prediction-market venue, seen through the four calls the bot needs.

pub mod kalshi;

pub use kalshi::KalshiClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Market, OrderResult, Position, Side, Trade};

/// Venue API. Implementations own authentication, pagination and request timeouts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Venue: Send + Sync {
    /// Every currently open market.
    async fn list_open_markets(&self) -> Result<Vec<Market>>;

    /// Up to `limit` trades from the last hour on `ticker`.
    async fn list_recent_trades(&self, ticker: &str, limit: usize) -> Result<Vec<Trade>>;

    /// Limit buy of `count` contracts on `side` at `price_cents`.
    async fn place_order(&self, ticker: &str, side: Side, count: u64, price_cents: u32) -> Result<OrderResult>;

    async fn list_positions(&self) -> Result<Vec<Position>>;
}
