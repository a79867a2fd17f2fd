// =============================================================================
// CandleAggregator — per-symbol rolling windows of completed candles
// =============================================================================
//
// Consumes raw candle events from the feed and maintains, per tracked symbol,
// five index-aligned rolling windows (Open, High, Low, Close, Time) of
// *completed* candles only.
//
// Bucket semantics: events carry a bucket start time in epoch milliseconds.
// The newest event for a bucket is held as a pending candle and is committed
// only when an event for a *different* bucket arrives — so repeated partial
// updates to the same bucket supersede each other and exactly one candle is
// ever committed per (symbol, time). The forming candle is never visible in a
// snapshot.
//
// Thread safety: one parking_lot::Mutex per symbol series. Both the commit of
// a candle's five fields and the five-field snapshot copy happen under that
// lock, so readers never observe a torn or length-misaligned quintuple.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::market_data::rolling_window::RollingWindow;

// =============================================================================
// Data types
// =============================================================================

/// A single candle observation from the feed.
///
/// `symbol` is feed-qualified (e.g. `AAPL&Q{=5m}`); `time` is the bucket
/// start in epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleEvent {
    pub symbol: String,
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Point-in-time copy of one symbol's committed candles.
///
/// The five vectors are equal length (≤ window capacity) and index-aligned:
/// index `i` across all five describes one committed candle. `time` is in
/// epoch seconds.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSnapshot {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub time: Vec<i64>,
}

// =============================================================================
// Per-symbol series
// =============================================================================

/// One symbol's pending candle plus its five rolling windows. Always accessed
/// under the owning aggregator's per-symbol lock.
struct SymbolSeries {
    pending: Option<CandleEvent>,
    open: RollingWindow<f64>,
    high: RollingWindow<f64>,
    low: RollingWindow<f64>,
    close: RollingWindow<f64>,
    time: RollingWindow<i64>,
}

impl SymbolSeries {
    fn new(capacity: usize) -> Self {
        Self {
            pending: None,
            open: RollingWindow::new(capacity),
            high: RollingWindow::new(capacity),
            low: RollingWindow::new(capacity),
            close: RollingWindow::new(capacity),
            time: RollingWindow::new(capacity),
        }
    }

    /// Append a closed candle's fields to all five windows. Bucket time is
    /// converted from epoch milliseconds to epoch seconds.
    fn commit(&mut self, candle: &CandleEvent) {
        self.open.append(candle.open);
        self.high.append(candle.high);
        self.low.append(candle.low);
        self.close.append(candle.close);
        self.time.append(candle.time / 1000);
    }

    fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            open: self.open.snapshot(),
            high: self.high.snapshot(),
            low: self.low.snapshot(),
            close: self.close.snapshot(),
            time: self.time.snapshot(),
        }
    }
}

// =============================================================================
// CandleAggregator
// =============================================================================

type EventFilter = Box<dyn Fn(&CandleEvent) -> bool + Send + Sync>;

/// Thread-safe candle accumulator over a fixed symbol registry.
///
/// The registry is set at construction and never grows; events whose symbol
/// does not prefix-match a registered base symbol are ignored.
pub struct CandleAggregator {
    /// Base symbol -> locked series. The map itself is immutable after
    /// construction; only the series behind each lock mutate.
    series: HashMap<String, Mutex<SymbolSeries>>,
    /// Optional pre-routing event filter (e.g. a minimum-open data-quality
    /// gate). Events rejected by the filter are dropped entirely.
    filter: Option<EventFilter>,
    /// Bumped on every committed candle. Push transports compare this to
    /// detect fresh data without locking any series.
    revision: AtomicU64,
}

impl CandleAggregator {
    /// Create an aggregator tracking `symbols`, each with five rolling
    /// windows of `capacity` completed candles.
    pub fn new(symbols: &[String], capacity: usize) -> Self {
        let series = symbols
            .iter()
            .map(|s| (s.clone(), Mutex::new(SymbolSeries::new(capacity))))
            .collect();
        Self {
            series,
            filter: None,
            revision: AtomicU64::new(0),
        }
    }

    /// Install an event filter applied before routing. Events for which the
    /// predicate returns `false` are dropped.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&CandleEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Registered base symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut syms: Vec<String> = self.series.keys().cloned().collect();
        syms.sort();
        syms
    }

    /// Whether `symbol` is a registered base symbol.
    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    /// Current commit revision.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Consume a batch of feed events.
    ///
    /// For each event: filter, route by prefix match against the registry,
    /// then either stage it as the pending candle (same bucket as the current
    /// pending, or first event for the symbol) or commit the pending candle
    /// and stage the event (bucket transition).
    pub fn update(&self, events: Vec<CandleEvent>) {
        for event in events {
            if let Some(filter) = &self.filter {
                if !filter(&event) {
                    trace!(symbol = %event.symbol, open = event.open, "event rejected by filter");
                    continue;
                }
            }

            let Some(series) = self.route(&event.symbol) else {
                trace!(symbol = %event.symbol, "event for unregistered symbol ignored");
                continue;
            };

            let mut series = series.lock();
            let closed = match &series.pending {
                // Bucket transition: the held candle is now closed.
                Some(pending) if pending.time != event.time => Some(pending.clone()),
                // Same bucket (latest observation wins) or first event.
                _ => None,
            };
            if let Some(closed) = closed {
                series.commit(&closed);
                self.revision.fetch_add(1, Ordering::SeqCst);
                debug!(
                    symbol = %closed.symbol,
                    time = closed.time,
                    close = closed.close,
                    "candle committed"
                );
            }
            series.pending = Some(event);
        }
    }

    /// Atomic five-field snapshot of a symbol's committed candles, or `None`
    /// for an unregistered symbol.
    pub fn snapshot(&self, symbol: &str) -> Option<SeriesSnapshot> {
        self.series.get(symbol).map(|s| s.lock().snapshot())
    }

    /// Number of committed candles currently held for `symbol`.
    pub fn committed_len(&self, symbol: &str) -> Option<usize> {
        self.series.get(symbol).map(|s| s.lock().close.len())
    }

    /// Map a feed-qualified event symbol (e.g. `AAPL&Q{=5m}`) to its series
    /// by prefix match against the registered base symbols.
    fn route(&self, event_symbol: &str) -> Option<&Mutex<SymbolSeries>> {
        self.series
            .iter()
            .find(|(base, _)| event_symbol.starts_with(base.as_str()))
            .map(|(_, series)| series)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn event(symbol: &str, time: i64, open: f64) -> CandleEvent {
        CandleEvent {
            symbol: symbol.to_string(),
            time,
            open,
            high: open + 1.0,
            low: open - 1.0,
            close: open + 0.5,
        }
    }

    #[test]
    fn first_event_commits_nothing() {
        let agg = CandleAggregator::new(&symbols(&["AAPL"]), 10);
        agg.update(vec![event("AAPL&Q{=5m}", 1_000, 10.0)]);
        let snap = agg.snapshot("AAPL").unwrap();
        assert!(snap.open.is_empty());
        assert_eq!(agg.revision(), 0);
    }

    #[test]
    fn bucket_transition_commits_the_pending_candle() {
        let agg = CandleAggregator::new(&symbols(&["AAPL"]), 10);
        agg.update(vec![
            event("AAPL&Q{=5m}", 1_000, 10.0),
            event("AAPL&Q{=5m}", 2_000, 20.0),
        ]);
        let snap = agg.snapshot("AAPL").unwrap();
        assert_eq!(snap.open, vec![10.0]);
        assert_eq!(snap.time, vec![1]); // ms -> s
        assert_eq!(agg.revision(), 1);
    }

    #[test]
    fn same_bucket_update_supersedes_without_committing() {
        // [t=1000 O=10, t=1000 O=11, t=2000 O=20] -> only the superseding
        // t=1000 observation is committed, at the t=2000 transition.
        let agg = CandleAggregator::new(&symbols(&["AAPL"]), 10);
        agg.update(vec![
            event("AAPL&Q{=5m}", 1_000, 10.0),
            event("AAPL&Q{=5m}", 1_000, 11.0),
            event("AAPL&Q{=5m}", 2_000, 20.0),
        ]);
        let snap = agg.snapshot("AAPL").unwrap();
        assert_eq!(snap.open, vec![11.0]);
    }

    #[test]
    fn strictly_increasing_times_commit_all_but_the_last() {
        let agg = CandleAggregator::new(&symbols(&["AAPL"]), 100);
        let events: Vec<CandleEvent> = (0..10)
            .map(|i| event("AAPL&Q{=5m}", i * 300_000, 100.0 + i as f64))
            .collect();
        agg.update(events);
        assert_eq!(agg.committed_len("AAPL"), Some(9));
    }

    #[test]
    fn capacity_bound_keeps_newest_closes() {
        let agg = CandleAggregator::new(&symbols(&["AAPL"]), 2);
        // Closes 1, 2, 3 get committed; the 4th event only closes the 3rd.
        for (i, close) in [1.0, 2.0, 3.0, 0.0].iter().enumerate() {
            agg.update(vec![CandleEvent {
                symbol: "AAPL".to_string(),
                time: (i as i64 + 1) * 1_000,
                open: *close,
                high: *close,
                low: *close,
                close: *close,
            }]);
        }
        let snap = agg.snapshot("AAPL").unwrap();
        assert_eq!(snap.close, vec![2.0, 3.0]);
    }

    #[test]
    fn unregistered_symbol_leaves_windows_unchanged() {
        let agg = CandleAggregator::new(&symbols(&["AAPL", "AMZN"]), 10);
        agg.update(vec![
            event("MSFT&Q{=5m}", 1_000, 10.0),
            event("MSFT&Q{=5m}", 2_000, 20.0),
        ]);
        assert_eq!(agg.committed_len("AAPL"), Some(0));
        assert_eq!(agg.committed_len("AMZN"), Some(0));
        assert!(agg.snapshot("MSFT").is_none());
    }

    #[test]
    fn events_route_independently_per_symbol() {
        let agg = CandleAggregator::new(&symbols(&["AAPL", "AMZN"]), 10);
        agg.update(vec![
            event("AAPL&Q{=5m}", 1_000, 10.0),
            event("AMZN&Q{=5m}", 1_000, 50.0),
            event("AAPL&Q{=5m}", 2_000, 11.0),
        ]);
        assert_eq!(agg.committed_len("AAPL"), Some(1));
        assert_eq!(agg.committed_len("AMZN"), Some(0));
    }

    #[test]
    fn filter_drops_events_before_routing() {
        let agg =
            CandleAggregator::new(&symbols(&["AAPL"]), 10).with_filter(|e| e.open > 1.0);
        agg.update(vec![
            event("AAPL&Q{=5m}", 1_000, 0.0), // rejected
            event("AAPL&Q{=5m}", 2_000, 10.0),
            event("AAPL&Q{=5m}", 3_000, 11.0),
        ]);
        let snap = agg.snapshot("AAPL").unwrap();
        // The zero-open tick never became pending, so the first commit is
        // the t=2000 candle.
        assert_eq!(snap.open, vec![10.0]);
        assert_eq!(snap.time, vec![2]);
    }

    #[test]
    fn snapshot_fields_stay_aligned_under_concurrent_appends() {
        let agg = Arc::new(CandleAggregator::new(&symbols(&["AAPL"]), 5));

        let writer = {
            let agg = agg.clone();
            std::thread::spawn(move || {
                for i in 0..2_000i64 {
                    agg.update(vec![event("AAPL&Q{=5m}", i * 1_000, i as f64)]);
                }
            })
        };

        for _ in 0..2_000 {
            let snap = agg.snapshot("AAPL").unwrap();
            assert!(snap.open.len() <= 5);
            assert_eq!(snap.open.len(), snap.high.len());
            assert_eq!(snap.open.len(), snap.low.len());
            assert_eq!(snap.open.len(), snap.close.len());
            assert_eq!(snap.open.len(), snap.time.len());
        }

        writer.join().unwrap();
        assert_eq!(agg.committed_len("AAPL"), Some(5));
    }
}
