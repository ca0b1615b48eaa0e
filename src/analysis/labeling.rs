// src/analysis/labeling.rs
use crate::analysis::indicators::{compute_series, IndicatorSnapshot};
use crate::domain::errors::AnalysisResult;
use crate::domain::models::{Candlestick, StrategyLabel};
use rust_decimal::prelude::ToPrimitive;

/// Closes a breakout has to clear
pub const BREAKOUT_LOOKBACK: usize = 20;

/// One training example for the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub snapshot: IndicatorSnapshot,
    pub label: StrategyLabel,
}

/// Highest of the `BREAKOUT_LOOKBACK` prices before the last one;
/// `None` until that many exist
pub fn prior_high(prices: &[f64]) -> Option<f64> {
    let n = prices.len();
    if n <= BREAKOUT_LOOKBACK {
        return None;
    }
    prices[n - 1 - BREAKOUT_LOOKBACK..n - 1]
        .iter()
        .copied()
        .reduce(f64::max)
}

/// Regime label for one row. Rules are applied in order and a later
/// match overrides an earlier one.
pub fn label_row(snapshot: &IndicatorSnapshot, price: f64, prior_high: Option<f64>) -> StrategyLabel {
    let mut label = StrategyLabel::Hold;

    if snapshot.macd > snapshot.signal && snapshot.rsi < 65.0 {
        label = StrategyLabel::Trend;
    }
    if snapshot.macd < snapshot.signal && snapshot.rsi > 35.0 {
        label = StrategyLabel::MeanReversion;
    }
    if snapshot.rsi < 35.0 || snapshot.momentum > 0.0 {
        label = StrategyLabel::Sentiment;
    }
    if prior_high.map_or(false, |high| price > high) {
        label = StrategyLabel::Breakout;
    }

    label
}

/// Label every row of a close-price series
pub fn label_prices(prices: &[f64]) -> AnalysisResult<Vec<LabeledRow>> {
    let rows = compute_series(prices)?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, snapshot)| LabeledRow {
            label: label_row(&snapshot, prices[i], prior_high(&prices[..=i])),
            snapshot,
        })
        .collect())
}

/// Label candle history by close price
pub fn label_candles(candles: &[Candlestick]) -> AnalysisResult<Vec<LabeledRow>> {
    let closes: Vec<f64> = candles
        .iter()
        .filter_map(|c| c.close.to_f64())
        .collect();
    label_prices(&closes)
}
