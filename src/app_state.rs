// =============================================================================
// Central Application State — candlefeed
// =============================================================================
//
// The explicit shared context injected into both the feed task and the API
// handlers, with lifetime tied to process startup/shutdown. Ties together the
// runtime config, the candle aggregator, feed health, and the current display
// selection, and builds the serialisable snapshot the chart front end pulls.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for mutable shared collections.
//   - The aggregator manages its own per-symbol interior locking.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::market_data::{CandleAggregator, FeedHealth, SeriesSnapshot};
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter for config/display changes.
    /// Combined with the aggregator's commit revision to form the state
    /// version the WebSocket push uses for change detection.
    version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub aggregator: Arc<CandleAggregator>,
    pub feed_health: Arc<FeedHealth>,

    /// Symbols currently selected for display: a subset of the registry.
    /// Starts as the first registered symbol, mirroring a single-choice
    /// chart selector.
    selected_symbols: RwLock<Vec<String>>,

    /// Instant the process started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct the shared state from the given runtime configuration.
    ///
    /// Builds the aggregator's symbol registry (and optional min-open event
    /// filter) from `config`. The returned value is typically wrapped in
    /// `Arc` immediately.
    pub fn new(config: RuntimeConfig) -> Self {
        let mut aggregator = CandleAggregator::new(&config.symbols, config.window_capacity);
        if let Some(min_open) = config.min_open {
            aggregator = aggregator.with_filter(move |event| event.open > min_open);
        }

        let selected = config.symbols.first().cloned().into_iter().collect();

        Self {
            version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            aggregator: Arc::new(aggregator),
            feed_health: Arc::new(FeedHealth::new()),
            selected_symbols: RwLock::new(selected),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Increment the config/display version. Call after every meaningful
    /// mutation so push clients see fresh data.
    pub fn increment_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst)
    }

    /// Combined state version: config/display changes plus committed candles.
    pub fn current_state_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst) + self.aggregator.revision()
    }

    // ── Display selection ───────────────────────────────────────────────

    pub fn selected_symbols(&self) -> Vec<String> {
        self.selected_symbols.read().clone()
    }

    /// Replace the display selection. Every symbol must be in the registry.
    pub fn set_selected_symbols(&self, symbols: Vec<String>) -> Result<()> {
        for symbol in &symbols {
            if !self.aggregator.is_tracked(symbol) {
                bail!("unknown symbol: {symbol}");
            }
        }
        *self.selected_symbols.write() = symbols;
        self.increment_version();
        Ok(())
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build the serialisable snapshot sent to the chart front end via
    /// `GET /api/v1/state` and the WebSocket push feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let config = self.runtime_config.read();
        let selected = self.selected_symbols();

        let mut series = HashMap::new();
        for symbol in &selected {
            if let Some(snap) = self.aggregator.snapshot(symbol) {
                series.insert(symbol.clone(), snap);
            }
        }

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            feed: FeedSnapshot {
                connected: self.feed_health.is_connected(),
                last_event_age_secs: self.feed_health.last_event_age_secs(),
            },
            config: ConfigSummary {
                symbols: config.symbols.clone(),
                window_capacity: config.window_capacity,
                candle_period: config.candle_period.clone(),
                refresh_interval_secs: config.refresh_interval_secs,
            },
            selected_symbols: selected,
            series,
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

/// Full backend state snapshot sent to the chart front end.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub feed: FeedSnapshot,
    pub config: ConfigSummary,
    pub selected_symbols: Vec<String>,
    /// Per-symbol candle series for the currently selected symbols.
    pub series: HashMap<String, SeriesSnapshot>,
}

/// Feed connection status for the front end's status banner.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_age_secs: Option<u64>,
}

/// Summary of the runtime configuration for the front end.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub symbols: Vec<String>,
    pub window_capacity: usize,
    pub candle_period: String,
    pub refresh_interval_secs: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::CandleEvent;

    fn state() -> AppState {
        AppState::new(RuntimeConfig::default())
    }

    fn event(symbol: &str, time: i64, price: f64) -> CandleEvent {
        CandleEvent {
            symbol: symbol.to_string(),
            time,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    #[test]
    fn default_selection_is_first_registered_symbol() {
        let state = state();
        assert_eq!(state.selected_symbols(), vec!["AAPL"]);
    }

    #[test]
    fn set_selected_symbols_validates_against_registry() {
        let state = state();
        assert!(state
            .set_selected_symbols(vec!["AAPL".into(), "AMZN".into()])
            .is_ok());
        assert!(state.set_selected_symbols(vec!["MSFT".into()]).is_err());
        // A failed update leaves the previous selection intact.
        assert_eq!(state.selected_symbols(), vec!["AAPL", "AMZN"]);
    }

    #[test]
    fn selection_change_bumps_state_version() {
        let state = state();
        let before = state.current_state_version();
        state.set_selected_symbols(vec!["AMZN".into()]).unwrap();
        assert!(state.current_state_version() > before);
    }

    #[test]
    fn committed_candles_bump_state_version() {
        let state = state();
        let before = state.current_state_version();
        state.aggregator.update(vec![
            event("AAPL&Q{=5m}", 1_000, 10.0),
            event("AAPL&Q{=5m}", 2_000, 11.0),
        ]);
        assert!(state.current_state_version() > before);
    }

    #[test]
    fn snapshot_contains_series_for_selected_symbols_only() {
        let state = state();
        state.aggregator.update(vec![
            event("AAPL&Q{=5m}", 1_000, 10.0),
            event("AAPL&Q{=5m}", 2_000, 11.0),
            event("AMZN&Q{=5m}", 1_000, 50.0),
            event("AMZN&Q{=5m}", 2_000, 51.0),
        ]);

        let snap = state.build_snapshot();
        assert_eq!(snap.selected_symbols, vec!["AAPL"]);
        assert!(snap.series.contains_key("AAPL"));
        assert!(!snap.series.contains_key("AMZN"));
        assert_eq!(snap.series["AAPL"].close, vec![10.0]);
        assert_eq!(snap.config.window_capacity, 40);
    }

    #[test]
    fn min_open_config_installs_event_filter() {
        let config = RuntimeConfig {
            min_open: Some(1.0),
            ..RuntimeConfig::default()
        };
        let state = AppState::new(config);
        state.aggregator.update(vec![
            event("AAPL&Q{=5m}", 1_000, 0.5), // dropped by the gate
            event("AAPL&Q{=5m}", 2_000, 10.0),
            event("AAPL&Q{=5m}", 3_000, 11.0),
        ]);
        let snap = state.aggregator.snapshot("AAPL").unwrap();
        assert_eq!(snap.open, vec![10.0]);
    }
}
