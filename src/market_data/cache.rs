// src/market_data/cache.rs
use crate::domain::models::PriceSample;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 26;

/// Bounded rolling window of price samples per instrument
#[derive(Debug, Clone)]
pub struct PriceCache {
    capacity: usize,
    windows: HashMap<String, VecDeque<PriceSample>>,
}

impl PriceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            windows: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest once capacity is exceeded
    pub fn record(&mut self, pair: &str, price: Decimal, timestamp: DateTime<Utc>) {
        let window = self
            .windows
            .entry(pair.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity + 1));

        window.push_back(PriceSample { timestamp, price });
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// The last `n` samples, oldest first; fewer if not enough were recorded
    pub fn window(&self, pair: &str, n: usize) -> Vec<PriceSample> {
        match self.windows.get(pair) {
            Some(window) => {
                let skip = window.len().saturating_sub(n);
                window.iter().skip(skip).copied().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn len(&self, pair: &str) -> usize {
        self.windows.get(pair).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, pair: &str) -> bool {
        self.len(pair) == 0
    }

    pub fn latest(&self, pair: &str) -> Option<PriceSample> {
        self.windows.get(pair).and_then(|w| w.back().copied())
    }

    /// Last `n` prices as floats for indicator math
    pub fn closes(&self, pair: &str, n: usize) -> Vec<f64> {
        self.window(pair, n).iter().map(PriceSample::price_f64).collect()
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
