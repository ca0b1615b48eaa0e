#![allow(dead_code)]

use async_trait::async_trait;
use roostoo_trader::analysis::indicators::IndicatorSnapshot;
use roostoo_trader::analysis::labeling::LabeledRow;
use roostoo_trader::config::{Config, InstrumentConfig, StrategyConfig};
use roostoo_trader::domain::errors::{AnalysisResult, ExchangeError, ExchangeResult};
use roostoo_trader::domain::models::{Order, OrderFill, OrderSide, OrderStatus, StrategyLabel, Ticker};
use roostoo_trader::exchange::{Balance, ExchangeClient, Wallet};
use roostoo_trader::trading::LabelClassifier;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MockState {
    pub prices: HashMap<String, Decimal>,
    pub balances: HashMap<String, Decimal>,
    pub orders: Vec<Order>,
    pub fail_balance: bool,
    pub ticker_calls: usize,
}

/// Scriptable venue: fills market orders at the current price, no fees
#[derive(Clone, Default)]
pub struct MockExchange {
    pub state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(asset.to_string(), amount);
        self
    }

    pub fn set_price(&self, pair: &str, price: Decimal) {
        self.state
            .lock()
            .unwrap()
            .prices
            .insert(pair.to_string(), price);
    }

    pub fn clear_price(&self, pair: &str) {
        self.state.lock().unwrap().prices.remove(pair);
    }

    pub fn set_fail_balance(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance = fail;
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn ticker_calls(&self) -> usize {
        self.state.lock().unwrap().ticker_calls
    }
}

fn ticker(pair: &str, price: Decimal) -> Ticker {
    Ticker {
        pair: pair.to_string(),
        last_price: price,
        bid_price: None,
        ask_price: None,
        timestamp: 0,
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
        let mut state = self.state.lock().unwrap();
        state.ticker_calls += 1;
        state
            .prices
            .get(pair)
            .map(|p| ticker(pair, *p))
            .ok_or_else(|| ExchangeError::InvalidSymbol(pair.to_string()))
    }

    async fn get_all_tickers(&self) -> ExchangeResult<HashMap<String, Ticker>> {
        let mut state = self.state.lock().unwrap();
        state.ticker_calls += 1;
        Ok(state
            .prices
            .iter()
            .map(|(pair, p)| (pair.clone(), ticker(pair, *p)))
            .collect())
    }

    async fn get_balance(&self) -> ExchangeResult<Wallet> {
        let state = self.state.lock().unwrap();
        if state.fail_balance {
            return Err(ExchangeError::Connection("balance endpoint down".to_string()));
        }
        Ok(Wallet::new(
            state
                .balances
                .iter()
                .map(|(asset, amount)| Balance::new(asset, *amount, Decimal::ZERO)),
        ))
    }

    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderFill> {
        let mut state = self.state.lock().unwrap();
        let price = *state
            .prices
            .get(&order.pair)
            .ok_or_else(|| ExchangeError::InvalidSymbol(order.pair.clone()))?;
        let (base, quote) = order
            .pair
            .split_once('/')
            .ok_or_else(|| ExchangeError::InvalidSymbol(order.pair.clone()))?;
        let (base, quote) = (base.to_string(), quote.to_string());
        let notional = price * order.quantity;

        let sign = match order.side {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        };
        *state.balances.entry(base).or_default() += sign * order.quantity;
        *state.balances.entry(quote).or_default() -= sign * notional;
        state.orders.push(order.clone());

        Ok(OrderFill {
            order_id: state.orders.len().to_string(),
            pair: order.pair.clone(),
            side: order.side,
            status: OrderStatus::Filled,
            filled_price: price,
            filled_quantity: order.quantity,
            timestamp: 0,
        })
    }
}

/// Classifier that always predicts the same regime
pub struct FixedLabel(pub StrategyLabel);

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

pub fn config_for(pairs: &[(&str, Decimal, Decimal)]) -> Config {
    let mut config = Config::default();
    config.trading.instruments = pairs
        .iter()
        .map(|(pair, step, min)| InstrumentConfig {
            pair: pair.to_string(),
            step_size: *step,
            min_quantity: *min,
        })
        .collect();
    config.trading.strategy = StrategyConfig::Classifier {
        history_interval: "1h".to_string(),
        history_limit: 200,
    };
    config
}
