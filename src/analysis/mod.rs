// src/analysis/mod.rs
pub mod indicators;
pub mod labeling;

pub use indicators::{compute, compute_series, IndicatorSnapshot};
pub use labeling::{label_candles, label_prices, LabeledRow};
