mod api;
mod config;
mod controller;
mod detector;
mod error;
mod state;
mod types;
mod venue;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState, HealthState, LatencyStats};
use crate::config::Config;
use crate::controller::{ControllerHandle, ControllerSettings, PollingController};
use crate::error::Result;
use crate::state::{ActivityTracker, MarketSnapshotStore};
use crate::venue::{KalshiClient, Venue};

/// Follows large and one-sided flow on weather prediction markets.
#[derive(Parser)]
#[command(name = "follower", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the query API and the polling loop (default)
    Run,
    /// Print current venue positions with P&L, then exit
    Positions,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg).await,
        Command::Positions => positions(cfg).await,
    };
    if let Err(e) = result {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    cfg.require_credentials()?;

    let venue: Arc<dyn Venue> = Arc::new(KalshiClient::new(&cfg)?);
    let store = MarketSnapshotStore::new();
    let tracker = ActivityTracker::with_capacity(cfg.signal_capacity);
    debug!(capacity = tracker.capacity(), "activity tracker ready");
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    info!(
        demo = cfg.demo_mode,
        min_volume = cfg.min_volume,
        whale_threshold = %cfg.whale_threshold,
        spike_pct = cfg.volume_spike_threshold,
        follow_ratio = cfg.follow_ratio,
        max_position = cfg.max_position_size,
        max_daily_trades = cfg.max_daily_trades,
        keywords = cfg.target_keywords.len(),
        series = cfg.target_series.len(),
        "Starting follower against {}",
        cfg.api_url,
    );
    if !cfg.demo_mode {
        warn!("LIVE trading enabled: orders will be placed on the venue");
    }

    let controller = PollingController::new(
        venue,
        Arc::clone(&store),
        Arc::clone(&tracker),
        ControllerSettings::from_config(&cfg),
        Arc::clone(&health),
        Arc::clone(&latency),
    );
    let handle = controller.handle();

    // HTTP query API
    let app = router(ApiState { tracker, store, health, latency });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP API stopped: {e}");
        }
    });

    tokio::spawn(stop_on_signal(handle));

    controller.run().await;
    Ok(())
}

async fn positions(cfg: Config) -> Result<()> {
    cfg.require_credentials()?;
    let venue = KalshiClient::new(&cfg)?;
    let positions = venue.list_positions().await?;

    if positions.is_empty() {
        println!("No open positions.");
        return Ok(());
    }

    println!("{:<32} {:>10} {:>12} {:>10}", "TICKER", "CONTRACTS", "EXPOSURE", "P&L");
    let mut total_pnl = 0.0;
    for p in &positions {
        let pnl = p.pnl_usd();
        total_pnl += pnl;
        println!(
            "{:<32} {:>10} {:>12} {:>10}",
            p.ticker,
            p.position,
            format!("${:.2}", p.market_exposure as f64 / 100.0),
            format!("{}${:.2}", if pnl < 0.0 { "-" } else { "" }, pnl.abs()),
        );
    }
    println!("{} positions, total P&L {}${:.2}", positions.len(), if total_pnl < 0.0 { "-" } else { "" }, total_pnl.abs());
    Ok(())
}

/// Stops the controller on ctrl-c or SIGTERM.
async fn stop_on_signal(handle: ControllerHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received"),
        _ = terminate => info!("SIGTERM received"),
    }
    info!(state = ?handle.state(), "stopping controller after the current cycle");
    handle.stop();
}
