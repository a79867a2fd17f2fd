// =============================================================================
// Candle feed WebSocket client
// =============================================================================
//
// Connects to the market-data endpoint, subscribes to Candle events for the
// configured symbols (feed-qualified with an aggregation period, e.g.
// `AAPL&Q{=5m}`), and hands each received event batch to the aggregator.
//
// Runs until the stream disconnects or an error occurs, then returns so the
// caller (main.rs) can handle reconnection with a delay. Malformed frames are
// logged and skipped, never fatal.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::market_data::aggregator::{CandleAggregator, CandleEvent};

// =============================================================================
// Feed health
// =============================================================================

/// Connection status shared between the feed task and the API snapshot.
#[derive(Default)]
pub struct FeedHealth {
    connected: RwLock<bool>,
    last_event: RwLock<Option<Instant>>,
}

impl FeedHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_connected(&self) {
        *self.connected.write() = true;
    }

    pub fn mark_disconnected(&self) {
        *self.connected.write() = false;
    }

    pub fn record_event(&self) {
        *self.last_event.write() = Some(Instant::now());
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    /// Seconds since the last event batch arrived, if any batch has.
    pub fn last_event_age_secs(&self) -> Option<u64> {
        self.last_event.read().map(|t| t.elapsed().as_secs())
    }
}

// =============================================================================
// Subscription & wire format
// =============================================================================

/// Build the feed-qualified subscription symbol for a base symbol and an
/// aggregation period, e.g. `("AAPL", "5m") -> "AAPL&Q{=5m}"`.
pub fn subscription_symbol(base: &str, period: &str) -> String {
    format!("{base}&Q{{={period}}}")
}

/// One pushed frame from the feed: a batch of candle events.
#[derive(Debug, Deserialize)]
struct EventBatch {
    events: Vec<CandleEvent>,
}

/// Parse a feed frame into its candle events.
///
/// Expected shape:
/// ```json
/// { "events": [ { "symbol": "AAPL&Q{=5m}", "time": 1700000000000,
///                 "open": 182.5, "high": 183.1, "low": 182.2, "close": 182.9 } ] }
/// ```
fn parse_event_batch(text: &str) -> Result<Vec<CandleEvent>> {
    let batch: EventBatch =
        serde_json::from_str(text).context("failed to parse candle event batch")?;
    Ok(batch.events)
}

// =============================================================================
// Stream loop
// =============================================================================

/// Connect to the candle feed and pump event batches into `aggregator` until
/// the stream ends or errors.
pub async fn run_candle_stream(
    url: &str,
    subscriptions: &[String],
    aggregator: &Arc<CandleAggregator>,
    health: &Arc<FeedHealth>,
) -> Result<()> {
    info!(url = %url, symbols = ?subscriptions, "connecting to candle feed");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to candle feed")?;

    let (mut write, mut read) = ws_stream.split();

    // Subscribe to Candle events for the qualified symbols.
    let subscribe = serde_json::json!({
        "type": "subscribe",
        "events": ["Candle"],
        "symbols": subscriptions,
    });
    write
        .send(Message::Text(subscribe.to_string()))
        .await
        .context("failed to send feed subscription")?;

    health.mark_connected();
    info!(count = subscriptions.len(), "candle feed connected and subscribed");

    let result = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match parse_event_batch(&text) {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!(count = events.len(), "candle event batch received");
                        health.record_event();
                        aggregator.update(events);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse feed frame");
                }
            },
            Some(Ok(Message::Close(_))) => {
                warn!("candle feed sent Close frame");
                break Ok(());
            }
            // Ping/Pong/Binary frames carry no candle data -- tungstenite
            // answers pings automatically.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(error = %e, "candle feed read error");
                break Err(e.into());
            }
            None => {
                warn!("candle feed stream ended");
                break Ok(());
            }
        }
    };

    health.mark_disconnected();
    result
}

// =============================================================================
// Tests
// =============================================================================
