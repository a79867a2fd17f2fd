// =============================================================================
// candlefeed — Main Entry Point
// =============================================================================
//
// Streams delayed OHLC candle events for a small set of equity symbols,
// maintains a fixed-size rolling window of completed candles per symbol, and
// serves snapshots to a browser candlestick chart over REST and WebSocket.
// =============================================================================

mod api;
mod app_state;
mod market_data;
mod runtime_config;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::feed;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override symbols and feed endpoint from env if available.
    if let Ok(syms) = std::env::var("CANDLEFEED_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.symbols.is_empty() {
        config.symbols = vec!["AAPL".into(), "AMZN".into()];
    }
    if let Ok(url) = std::env::var("CANDLEFEED_FEED_URL") {
        config.feed_url = url;
    }

    info!(
        symbols = ?config.symbols,
        period = %config.candle_period,
        window_capacity = config.window_capacity,
        "Configured candle series"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Spawn the candle feed stream ──────────────────────────────────
    let subscriptions: Vec<String> = {
        let config = state.runtime_config.read();
        config
            .symbols
            .iter()
            .map(|s| feed::subscription_symbol(s, &config.candle_period))
            .collect()
    };
    let feed_url = state.runtime_config.read().feed_url.clone();

    {
        let aggregator = state.aggregator.clone();
        let health = state.feed_health.clone();
        let subs = subscriptions.clone();
        let url = feed_url.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = feed::run_candle_stream(&url, &subs, &aggregator, &health).await
                {
                    error!(error = %e, "Candle feed error — reconnecting in 5s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });
    }
    info!(count = subscriptions.len(), "Candle feed stream launched");

    // ── 4. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("CANDLEFEED_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");

    if let Err(e) = state.runtime_config.read().save("runtime_config.json") {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("candlefeed shut down complete.");
    Ok(())
}
