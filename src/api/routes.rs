use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencyReport, LatencyStats};
use crate::error::AppError;
use crate::state::{ActivityTracker, MarketSnapshotStore};
use crate::types::{ActivitySummary, MarketSnapshot, MarketStats, SignalKind, TimeBucket, Trade, WhaleSignal};

const DEFAULT_SIGNAL_LIMIT: usize = 50;
const DEFAULT_TIMESERIES_HOURS: usize = 24;
/// Upper bound on `?hours=`; the tracker never holds more than a few days anyway.
const MAX_TIMESERIES_HOURS: usize = 24 * 7;

#[derive(Clone)]
pub struct ApiState {
    pub tracker: Arc<ActivityTracker>,
    pub store: Arc<MarketSnapshotStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/api/signals", get(get_signals))
        .route("/api/signals/market", get(get_market_signals))
        .route("/api/signals/type/:kind", get(get_signals_by_type))
        .route("/api/stats", get(get_market_stats))
        .route("/api/timeseries", get(get_timeseries))
        .route("/api/summary", get(get_summary))
        .route("/api/markets", get(get_markets))
        .route("/api/markets/:ticker", get(get_market))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SignalsQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct MarketQuery {
    pub ticker: Option<String>,
}

#[derive(Deserialize)]
pub struct TimeseriesQuery {
    pub hours: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct MarketDetail {
    pub snapshot: MarketSnapshot,
    /// Trade batch fetched in the poll that produced `snapshot`.
    pub trades: Vec<Trade>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_signals(
    State(state): State<ApiState>,
    Query(params): Query<SignalsQuery>,
) -> Json<Vec<WhaleSignal>> {
    let limit = params.limit.unwrap_or(DEFAULT_SIGNAL_LIMIT);
    Json(state.tracker.recent(limit))
}

async fn get_market_signals(
    State(state): State<ApiState>,
    Query(params): Query<MarketQuery>,
) -> Result<Json<Vec<WhaleSignal>>, AppError> {
    let ticker = params
        .ticker
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("ticker parameter required".to_string()))?;
    Ok(Json(state.tracker.by_market(&ticker)))
}

async fn get_signals_by_type(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<WhaleSignal>>, AppError> {
    let kind = SignalKind::parse(&kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown signal type: {kind}")))?;
    Ok(Json(state.tracker.by_type(kind)))
}

async fn get_market_stats(State(state): State<ApiState>) -> Json<Vec<MarketStats>> {
    Json(state.tracker.market_stats())
}

async fn get_timeseries(
    State(state): State<ApiState>,
    Query(params): Query<TimeseriesQuery>,
) -> Result<Json<Vec<TimeBucket>>, AppError> {
    let hours = params.hours.unwrap_or(DEFAULT_TIMESERIES_HOURS);
    if hours == 0 || hours > MAX_TIMESERIES_HOURS {
        return Err(AppError::BadRequest(format!(
            "hours must be between 1 and {MAX_TIMESERIES_HOURS}"
        )));
    }
    Ok(Json(state.tracker.time_series(hours)))
}

async fn get_summary(State(state): State<ApiState>) -> Json<ActivitySummary> {
    Json(state.tracker.summary())
}

async fn get_markets(State(state): State<ApiState>) -> Json<Vec<MarketSnapshot>> {
    let mut snapshots: Vec<MarketSnapshot> = state
        .store
        .tickers()
        .iter()
        .filter_map(|t| state.store.get(t))
        .collect();
    snapshots.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    Json(snapshots)
}

async fn get_market(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<MarketDetail>, AppError> {
    let snapshot = state
        .store
        .get(&ticker)
        .ok_or_else(|| AppError::NotFound(format!("no snapshot for {ticker}")))?;
    Ok(Json(MarketDetail {
        trades: state.store.recent_trades(&ticker),
        snapshot,
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyReport> {
    Json(state.latency.report())
}
