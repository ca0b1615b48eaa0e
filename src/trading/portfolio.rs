// src/trading/portfolio.rs
use crate::domain::models::{Instrument, PortfolioSnapshot};
use crate::exchange::client::Wallet;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// One day of values at the default 10 s cycle
pub const DEFAULT_HISTORY: usize = 8640;

/// Mark the wallet to market: free quote cash plus the free balance of every
/// traded base asset at its current price, rounded to cents. Locked amounts
/// are left out on both sides.
pub fn snapshot(
    wallet: &Wallet,
    instruments: &[Instrument],
    prices: &HashMap<String, Decimal>,
    now: DateTime<Utc>,
) -> PortfolioSnapshot {
    let quote = instruments
        .first()
        .map(|i| i.quote.as_str())
        .unwrap_or("USD");
    let cash = wallet.free(quote);

    let holdings: Decimal = instruments
        .iter()
        .filter_map(|inst| {
            let price = prices.get(&inst.pair)?;
            Some(wallet.free(&inst.base) * *price)
        })
        .sum();

    PortfolioSnapshot {
        cash: cash.round_dp(2),
        total_value: (cash + holdings).round_dp(2),
        timestamp: now,
    }
}

/// Rolling per-cycle portfolio values and the Sharpe ratio of their returns
#[derive(Debug, Clone)]
pub struct PortfolioTracker {
    values: VecDeque<f64>,
    capacity: usize,
    risk_free_rate: f64,
}

impl PortfolioTracker {
    pub fn new(risk_free_rate: f64) -> Self {
        Self::with_capacity(risk_free_rate, DEFAULT_HISTORY)
    }

    /// Keep at most `capacity` values (at least two), oldest dropped first
    pub fn with_capacity(risk_free_rate: f64, capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            values: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY)),
            capacity,
            risk_free_rate,
        }
    }

    pub fn record(&mut self, value: Decimal) {
        if let Some(v) = value.to_f64() {
            if self.values.len() == self.capacity {
                self.values.pop_front();
            }
            self.values.push_back(v);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean excess return over its population standard deviation;
    /// 0 with fewer than two values or zero dispersion
    pub fn sharpe_ratio(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }

        let excess: Vec<f64> = self
            .values
            .iter()
            .zip(self.values.iter().skip(1))
            .filter(|(prev, _)| **prev != 0.0)
            .map(|(prev, next)| (next - prev) / prev - self.risk_free_rate)
            .collect();
        if excess.is_empty() {
            return 0.0;
        }

        let n = excess.len() as f64;
        let mean = excess.iter().sum::<f64>() / n;
        let std = (excess.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();

        if std > 0.0 {
            mean / std
        } else {
            0.0
        }
    }
}
