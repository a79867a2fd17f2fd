// =============================================================================
// Runtime Configuration — candlefeed settings with atomic save
// =============================================================================
//
// Every tunable parameter lives here: the tracked symbol registry, rolling
// window capacity, feed endpoint and aggregation period, and the UI refresh
// hint. Persistence uses an atomic tmp + rename pattern to prevent corruption
// on crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["AAPL".to_string(), "AMZN".to_string()]
}

fn default_window_capacity() -> usize {
    40
}

fn default_candle_period() -> String {
    "5m".to_string()
}

fn default_feed_url() -> String {
    "wss://demo.dxfeed.com:7300/candles".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    300
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for candlefeed.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Tracked base symbols. Fixed for the process lifetime: the aggregator's
    /// registry is built from this once at startup.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Completed candles retained per symbol (rolling window capacity).
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Candle aggregation period used in the feed subscription qualifier
    /// (e.g. "5m" -> `AAPL&Q{=5m}`).
    #[serde(default = "default_candle_period")]
    pub candle_period: String,

    /// WebSocket endpoint of the candle feed.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// How often the chart front end should re-poll, in seconds. Advisory:
    /// surfaced in the state snapshot, not enforced server-side.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Optional data-quality gate: when set, events with `open <= min_open`
    /// are dropped before aggregation. Off by default.
    #[serde(default)]
    pub min_open: Option<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            window_capacity: default_window_capacity(),
            candle_period: default_candle_period(),
            feed_url: default_feed_url(),
            refresh_interval_secs: default_refresh_interval_secs(),
            min_open: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            window_capacity = config.window_capacity,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbols, vec!["AAPL", "AMZN"]);
        assert_eq!(cfg.window_capacity, 40);
        assert_eq!(cfg.candle_period, "5m");
        assert_eq!(cfg.refresh_interval_secs, 300);
        assert!(cfg.min_open.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbols.len(), 2);
        assert_eq!(cfg.window_capacity, 40);
        assert!(cfg.min_open.is_none());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["TSLA"], "min_open": 1.0 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["TSLA"]);
        assert_eq!(cfg.min_open, Some(1.0));
        assert_eq!(cfg.window_capacity, 40);
        assert_eq!(cfg.candle_period, "5m");
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.window_capacity, cfg2.window_capacity);
        assert_eq!(cfg.feed_url, cfg2.feed_url);
        assert_eq!(cfg.min_open, cfg2.min_open);
    }
}
