pub mod aggregator;
pub mod feed;
pub mod rolling_window;

// Re-export the core types for convenient access
// (e.g. `use crate::market_data::CandleEvent`).
pub use aggregator::{CandleAggregator, CandleEvent, SeriesSnapshot};
pub use feed::FeedHealth;
