//! B5Bot entry point
//!
//! Wires configuration into the snapshot cache, analytics engine,
//! paper store and paper engine, then runs the periodic engine task
//! alongside the HTTP view surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use b5bot::config::AppConfig;
use b5bot::dashboard::{self, AppState};
use b5bot::engine::{Analytics, EngineParams};
use b5bot::firstclose::FirstCloseReader;
use b5bot::paper::PaperEngine;
use b5bot::persistence::TradeStore;
use b5bot::snapshot::SnapshotCache;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!(config = %config.digest(), "starting b5bot");
    if config.paper.trade_mode.eq_ignore_ascii_case("live") && !config.paper.enable_live_trading {
        warn!("TRADE_MODE=live without ENABLE_LIVE_TRADING=1, running paper");
    }

    let snapshots = Arc::new(SnapshotCache::new(&config.data.snapshot_file));
    let analytics = Arc::new(Analytics::new(EngineParams::from_config(&config.paper)));
    let store = Arc::new(TradeStore::open(&config.data.paper_db)?);
    let firstclose = Arc::new(FirstCloseReader::new(&config.data.first_close_db));
    let engine = Arc::new(PaperEngine::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&analytics),
        Arc::clone(&snapshots),
    ));

    // Periodic engine task: the single writer over all mutable state
    let cycle_ms = config.paper.cycle_ms_clamped();
    let engine_task = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(cycle_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let engine = Arc::clone(&engine_task);
            let result = tokio::task::spawn_blocking(move || engine.cycle()).await;
            match result {
                Ok(Ok(outcome)) if outcome.ran => {
                    if outcome.opened > 0 || outcome.closed > 0 {
                        info!(
                            version = outcome.version,
                            opened = outcome.opened,
                            closed = outcome.closed,
                            "engine cycle"
                        );
                    }
                }
                Ok(Ok(_)) => {} // no new snapshot
                Ok(Err(err)) => warn!(error = %err, "engine cycle failed"),
                Err(err) => warn!(error = %err, "engine cycle panicked"),
            }
        }
    });

    let port = config.server.port;
    let state = Arc::new(AppState {
        config,
        snapshots,
        analytics,
        store,
        firstclose,
        engine,
    });
    let router = dashboard::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "http surface listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
