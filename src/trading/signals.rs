// src/trading/signals.rs
use crate::analysis::indicators::{self, IndicatorSnapshot, SLOW_SPAN};
use crate::analysis::labeling::{prior_high, BREAKOUT_LOOKBACK};
use crate::domain::errors::AnalysisResult;
use crate::domain::models::{StrategyLabel, TradeAction};
use crate::trading::classifier::LabelClassifier;
use std::collections::HashMap;
use std::fmt;

const MEAN_REVERSION_RSI: f64 = 60.0;
const SENTIMENT_RSI: f64 = 40.0;
const SENTIMENT_VOLATILITY: f64 = 0.001;

/// Signal for one instrument at one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: TradeAction,
    /// Predicted regime; crossover signals carry none
    pub label: Option<StrategyLabel>,
    pub indicators: Option<IndicatorSnapshot>,
}

impl Decision {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            label: None,
            indicators: None,
        }
    }
}

/// Source of BUY/SELL/HOLD decisions from a price window
pub enum SignalGenerator {
    /// Short SMA against long SMA
    Crossover {
        short_window: usize,
        long_window: usize,
    },
    /// Per-instrument regime classifiers plus a fixed decision table
    Classifier {
        models: HashMap<String, Box<dyn LabelClassifier>>,
        min_profit_potential: f64,
    },
}

impl fmt::Debug for SignalGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalGenerator::Crossover {
                short_window,
                long_window,
            } => write!(f, "Crossover({}/{})", short_window, long_window),
            SignalGenerator::Classifier { models, .. } => {
                let mut pairs: Vec<_> = models.keys().collect();
                pairs.sort();
                write!(f, "Classifier({:?})", pairs)
            }
        }
    }
}

/// Mean of the last `window` prices, or of all of them when fewer
fn sma(prices: &[f64], window: usize) -> f64 {
    let tail = &prices[prices.len().saturating_sub(window)..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

impl SignalGenerator {
    pub fn crossover(short_window: usize, long_window: usize) -> Self {
        if short_window == 0 || short_window >= long_window {
            log::warn!(
                "Crossover windows {}/{} are not short < long; signals may never trigger",
                short_window,
                long_window
            );
        }
        SignalGenerator::Crossover {
            short_window,
            long_window,
        }
    }

    pub fn classifier(min_profit_potential: f64) -> Self {
        SignalGenerator::Classifier {
            models: HashMap::new(),
            min_profit_potential,
        }
    }

    /// Attach a trained model for `pair`; ignored by the crossover variant
    pub fn insert_model(&mut self, pair: &str, model: Box<dyn LabelClassifier>) {
        if let SignalGenerator::Classifier { models, .. } = self {
            models.insert(pair.to_string(), model);
        }
    }

    /// Samples needed before a decision other than HOLD is possible
    pub fn required_samples(&self) -> usize {
        match self {
            SignalGenerator::Crossover {
                short_window,
                long_window,
            } => (*short_window).max(*long_window).max(1),
            SignalGenerator::Classifier { .. } => SLOW_SPAN.max(BREAKOUT_LOOKBACK + 1),
        }
    }

    /// Whether `pair` has a usable signal source
    pub fn is_ready(&self, pair: &str) -> bool {
        match self {
            SignalGenerator::Crossover { .. } => true,
            SignalGenerator::Classifier { models, .. } => {
                models.get(pair).map_or(false, |m| m.is_fitted())
            }
        }
    }

    /// Decide for `pair` given its price window (oldest first) and position state
    pub fn decide(&self, pair: &str, prices: &[f64], position_open: bool) -> AnalysisResult<Decision> {
        if prices.len() < self.required_samples() {
            return Ok(Decision::hold());
        }

        match self {
            SignalGenerator::Crossover {
                short_window,
                long_window,
            } => Ok(Self::crossover_decision(prices, *short_window, *long_window, position_open)),
            SignalGenerator::Classifier {
                models,
                min_profit_potential,
            } => {
                let model = match models.get(pair) {
                    Some(model) if model.is_fitted() => model,
                    _ => return Ok(Decision::hold()),
                };

                let snapshot = indicators::compute(prices)?;
                let label = model.predict(&snapshot)?;
                let action = Self::table_action(
                    label,
                    &snapshot,
                    prices,
                    position_open,
                    *min_profit_potential,
                );

                Ok(Decision {
                    action,
                    label: Some(label),
                    indicators: Some(snapshot),
                })
            }
        }
    }

    fn crossover_decision(
        prices: &[f64],
        short_window: usize,
        long_window: usize,
        position_open: bool,
    ) -> Decision {
        let short = sma(prices, short_window);
        let long = sma(prices, long_window);

        let action = if short > long && !position_open {
            TradeAction::Buy
        } else if short < long && position_open {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };

        Decision {
            action,
            label: None,
            indicators: None,
        }
    }

    /// Regime label plus position state to an action; unmatched cases hold
    pub fn table_action(
        label: StrategyLabel,
        snapshot: &IndicatorSnapshot,
        prices: &[f64],
        position_open: bool,
        min_profit_potential: f64,
    ) -> TradeAction {
        let price = match prices.last() {
            Some(price) => *price,
            None => return TradeAction::Hold,
        };

        match (label, position_open) {
            (StrategyLabel::Trend, false)
                if snapshot.macd > snapshot.signal
                    && price * min_profit_potential > snapshot.atr =>
            {
                TradeAction::Buy
            }
            (StrategyLabel::MeanReversion, true) if snapshot.rsi > MEAN_REVERSION_RSI => {
                TradeAction::Sell
            }
            (StrategyLabel::Sentiment, false)
                if snapshot.rsi < SENTIMENT_RSI || snapshot.volatility > SENTIMENT_VOLATILITY =>
            {
                TradeAction::Buy
            }
            (StrategyLabel::Breakout, false)
                if snapshot.momentum > 0.0 && prior_high(prices).map_or(false, |high| price > high) =>
            {
                TradeAction::Buy
            }
            _ => TradeAction::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::labeling::LabeledRow;

    struct FixedLabel(StrategyLabel);

    impl LabelClassifier for FixedLabel {
        fn train(&mut self, _rows: &[LabeledRow]) -> AnalysisResult<()> {
            Ok(())
        }

        fn predict(&self, _snapshot: &IndicatorSnapshot) -> AnalysisResult<StrategyLabel> {
            Ok(self.0)
        }

        fn is_fitted(&self) -> bool {
            true
        }
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn crossover_holds_on_short_window() {
        let generator = SignalGenerator::crossover(5, 20);
        let decision = generator.decide("BTC/USD", &rising(19), false).unwrap();
        assert_eq!(decision.action, TradeAction::Hold);
    }

    #[test]
    fn crossover_respects_position_state() {
        let generator = SignalGenerator::crossover(5, 20);
        let up = rising(20);
        let down: Vec<f64> = up.iter().rev().copied().collect();

        assert_eq!(generator.decide("X/USD", &up, false).unwrap().action, TradeAction::Buy);
        assert_eq!(generator.decide("X/USD", &up, true).unwrap().action, TradeAction::Hold);
        assert_eq!(generator.decide("X/USD", &down, true).unwrap().action, TradeAction::Sell);
        assert_eq!(generator.decide("X/USD", &down, false).unwrap().action, TradeAction::Hold);
    }

    #[test]
    fn inverted_crossover_windows_do_not_panic() {
        let generator = SignalGenerator::crossover(20, 5);
        assert_eq!(generator.required_samples(), 20);
        assert_eq!(generator.decide("X/USD", &rising(19), false).unwrap().action, TradeAction::Hold);

        // Long average now covers the newer prices, so a rise reads as a fall
        let decision = generator.decide("X/USD", &rising(20), true).unwrap();
        assert_eq!(decision.action, TradeAction::Sell);

        let degenerate = SignalGenerator::crossover(0, 0);
        assert_eq!(degenerate.decide("X/USD", &rising(3), false).unwrap().action, TradeAction::Hold);
    }

    #[test]
    fn classifier_without_model_holds() {
        let generator = SignalGenerator::classifier(0.003);
        assert!(!generator.is_ready("BTC/USD"));
        let decision = generator.decide("BTC/USD", &rising(30), false).unwrap();
        assert_eq!(decision, Decision::hold());
    }

    #[test]
    fn classifier_short_window_never_trades() {
        let mut generator = SignalGenerator::classifier(0.003);
        generator.insert_model("BTC/USD", Box::new(FixedLabel(StrategyLabel::Breakout)));

        for n in 0..generator.required_samples() {
            let decision = generator.decide("BTC/USD", &rising(n), false).unwrap();
            assert_eq!(decision.action, TradeAction::Hold);
        }
    }

    #[test]
    fn breakout_on_new_high() {
        let mut generator = SignalGenerator::classifier(0.003);
        generator.insert_model("BTC/USD", Box::new(FixedLabel(StrategyLabel::Breakout)));

        let decision = generator.decide("BTC/USD", &rising(26), false).unwrap();
        assert_eq!(decision.label, Some(StrategyLabel::Breakout));
        assert_eq!(decision.action, TradeAction::Buy);
        let snapshot = decision.indicators.unwrap();
        assert!(snapshot.momentum > 0.0);

        // Open position: breakout never adds
        let decision = generator.decide("BTC/USD", &rising(26), true).unwrap();
        assert_eq!(decision.action, TradeAction::Hold);
    }

    #[test]
    fn decision_table_rows() {
        let prices = vec![100.0; 26];
        let mut snapshot = IndicatorSnapshot {
            macd: 1.0,
            signal: 0.5,
            atr: 0.2,
            rsi: 70.0,
            ..Default::default()
        };

        // 100 * 0.003 = 0.3 > atr 0.2
        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::Trend, &snapshot, &prices, false, 0.003),
            TradeAction::Buy
        );
        snapshot.atr = 0.5;
        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::Trend, &snapshot, &prices, false, 0.003),
            TradeAction::Hold
        );

        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::MeanReversion, &snapshot, &prices, true, 0.003),
            TradeAction::Sell
        );
        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::MeanReversion, &snapshot, &prices, false, 0.003),
            TradeAction::Hold
        );

        snapshot.rsi = 30.0;
        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::Sentiment, &snapshot, &prices, false, 0.003),
            TradeAction::Buy
        );
        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::Hold, &snapshot, &prices, false, 0.003),
            TradeAction::Hold
        );

        // Flat prices never break the prior high
        snapshot.momentum = 1.0;
        assert_eq!(
            SignalGenerator::table_action(StrategyLabel::Breakout, &snapshot, &prices, false, 0.003),
            TradeAction::Hold
        );
    }
}
