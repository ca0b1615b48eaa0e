// src/analysis/indicators.rs
use crate::domain::errors::{AnalysisError, AnalysisResult};
use ta::indicators::ExponentialMovingAverage;
use ta::Next;

pub const FAST_SPAN: usize = 12;
pub const SLOW_SPAN: usize = 26;
pub const SIGNAL_SPAN: usize = 9;
pub const LOOKBACK: usize = 14;
pub const MOMENTUM_SHIFT: usize = 4;

/// Stand-in for a zero average loss so RSI stays finite
const MIN_AVG_LOSS: f64 = 1e-10;

/// Names of the classifier features, in `features()` order
pub const FEATURE_NAMES: [&str; 7] = [
    "macd",
    "macd_hist",
    "rsi",
    "momentum",
    "atr",
    "volatility",
    "ema_fast",
];

/// Technical indicators evaluated at one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd: f64,
    pub signal: f64,
    pub macd_hist: f64,
    pub atr: f64,
    pub rsi: f64,
    pub momentum: f64,
    pub volatility: f64,
}

impl IndicatorSnapshot {
    /// Feature vector fed to the classifier
    pub fn features(&self) -> [f64; 7] {
        [
            self.macd,
            self.macd_hist,
            self.rsi,
            self.momentum,
            self.atr,
            self.volatility,
            self.ema_fast,
        ]
    }
}

fn ema(span: usize) -> AnalysisResult<ExponentialMovingAverage> {
    ExponentialMovingAverage::new(span)
        .map_err(|e| AnalysisError::IndicatorCalculation(format!("EMA({}): {:?}", span, e)))
}

/// Indices of the last `LOOKBACK` rows ending at `i`, skipping row 0
/// where a difference is undefined
fn diff_window(i: usize) -> std::ops::RangeInclusive<usize> {
    (i + 1).saturating_sub(LOOKBACK).max(1)..=i
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Sample standard deviation (ddof 1); `None` with fewer than two values
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Indicator rows for every sample in `prices`, oldest first
pub fn compute_series(prices: &[f64]) -> AnalysisResult<Vec<IndicatorSnapshot>> {
    if prices.iter().any(|p| !p.is_finite()) {
        return Err(AnalysisError::IndicatorCalculation(
            "Price window contains a non-finite value".to_string(),
        ));
    }

    let mut fast = ema(FAST_SPAN)?;
    let mut slow = ema(SLOW_SPAN)?;
    let mut signal_line = ema(SIGNAL_SPAN)?;

    // First row has no predecessor: zero change, undefined return
    let deltas: Vec<f64> = std::iter::once(0.0)
        .chain(prices.windows(2).map(|w| w[1] - w[0]))
        .collect();
    let returns: Vec<f64> = std::iter::once(0.0)
        .chain(prices.windows(2).map(|w| {
            if w[0] == 0.0 {
                0.0
            } else {
                w[1] / w[0] - 1.0
            }
        }))
        .collect();

    let mut rows = Vec::with_capacity(prices.len());
    for (i, &price) in prices.iter().enumerate() {
        let ema_fast = fast.next(price);
        let ema_slow = slow.next(price);
        let macd = ema_fast - ema_slow;
        let signal = signal_line.next(macd);

        let atr = mean(diff_window(i).map(|j| deltas[j].abs())).unwrap_or(0.0);

        let rsi_range = (i + 1).saturating_sub(LOOKBACK)..=i;
        let avg_gain = mean(rsi_range.clone().map(|j| deltas[j].max(0.0))).unwrap_or(0.0);
        let mut avg_loss = mean(rsi_range.map(|j| (-deltas[j]).max(0.0))).unwrap_or(0.0);
        if avg_loss == 0.0 {
            avg_loss = MIN_AVG_LOSS;
        }
        let rsi = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);

        let momentum = if i >= MOMENTUM_SHIFT {
            price - prices[i - MOMENTUM_SHIFT]
        } else {
            0.0
        };

        let window_returns: Vec<f64> = diff_window(i).map(|j| returns[j]).collect();
        let volatility = sample_std(&window_returns).unwrap_or(0.0);

        rows.push(IndicatorSnapshot {
            ema_fast,
            ema_slow,
            macd,
            signal,
            macd_hist: macd - signal,
            atr,
            rsi,
            momentum,
            volatility,
        });
    }

    Ok(rows)
}

/// Indicators at the last sample; all zeros for an empty window
pub fn compute(prices: &[f64]) -> AnalysisResult<IndicatorSnapshot> {
    Ok(compute_series(prices)?.pop().unwrap_or_default())
}
