// src/exchange/client.rs
use crate::domain::errors::ExchangeResult;
use crate::domain::models::{Candlestick, Order, OrderFill, Ticker};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Core trading client interface
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Get latest ticker for a pair
    async fn get_ticker(&self, pair: &str) -> ExchangeResult<Ticker>;

    /// Get latest tickers for every listed pair
    async fn get_all_tickers(&self) -> ExchangeResult<HashMap<String, Ticker>>;

    /// Get account balances
    async fn get_balance(&self) -> ExchangeResult<Wallet>;

    /// Place a market order and return its fill
    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderFill>;
}

#[async_trait]
impl<T: ExchangeClient + ?Sized> ExchangeClient for Arc<T> {
    async fn get_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
        (**self).get_ticker(pair).await
    }

    async fn get_all_tickers(&self) -> ExchangeResult<HashMap<String, Ticker>> {
        (**self).get_all_tickers().await
    }

    async fn get_balance(&self) -> ExchangeResult<Wallet> {
        (**self).get_balance().await
    }

    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderFill> {
        (**self).place_order(order).await
    }
}

/// Source of historical candles used to train classifiers
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn get_klines(
        &self,
        pair: &str,
        interval: &str,
        limit: u32,
    ) -> ExchangeResult<Vec<Candlestick>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

impl Balance {
    pub fn new(asset: &str, free: Decimal, locked: Decimal) -> Self {
        Self {
            asset: asset.to_string(),
            free,
            locked,
            total: free + locked,
        }
    }
}

/// Balances keyed by asset symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wallet {
    balances: HashMap<String, Balance>,
}

impl Wallet {
    pub fn new(balances: impl IntoIterator<Item = Balance>) -> Self {
        Self {
            balances: balances
                .into_iter()
                .map(|b| (b.asset.clone(), b))
                .collect(),
        }
    }

    pub fn get(&self, asset: &str) -> Option<&Balance> {
        self.balances.get(asset)
    }

    /// Free amount of `asset`, zero when the asset is absent
    pub fn free(&self, asset: &str) -> Decimal {
        self.balances
            .get(asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}
