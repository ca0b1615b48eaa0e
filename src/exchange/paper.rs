// src/exchange/paper.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{Order, OrderFill, OrderSide, OrderStatus, Ticker};
use crate::exchange::client::{Balance, ExchangeClient, Wallet};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Simulated account state
#[derive(Debug)]
struct PaperBook {
    cash: Decimal,
    holdings: HashMap<String, Decimal>,
    last_prices: HashMap<String, Decimal>,
}

/// Exchange that reads live prices from `feed` and simulates balances and fills
pub struct PaperExchange<F> {
    feed: F,
    quote_asset: String,
    slippage: Decimal,
    commission_rate: Decimal,
    min_commission: Decimal,
    book: Mutex<PaperBook>,
    next_order_id: AtomicU64,
}

impl<F: ExchangeClient> PaperExchange<F> {
    pub fn new(
        feed: F,
        quote_asset: &str,
        initial_cash: Decimal,
        slippage: Decimal,
        commission_rate: Decimal,
        min_commission: Decimal,
    ) -> Self {
        log::info!("Paper trading with {} {}", initial_cash, quote_asset);

        Self {
            feed,
            quote_asset: quote_asset.to_string(),
            slippage,
            commission_rate,
            min_commission,
            book: Mutex::new(PaperBook {
                cash: initial_cash,
                holdings: HashMap::new(),
                last_prices: HashMap::new(),
            }),
            next_order_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> ExchangeResult<std::sync::MutexGuard<'_, PaperBook>> {
        self.book
            .lock()
            .map_err(|_| ExchangeError::Order("Paper book lock poisoned".to_string()))
    }

    fn remember(&self, ticker: &Ticker) -> ExchangeResult<()> {
        self.lock()?
            .last_prices
            .insert(ticker.pair.clone(), ticker.last_price);
        Ok(())
    }

    async fn reference_price(&self, pair: &str) -> ExchangeResult<Decimal> {
        if let Some(price) = self.lock()?.last_prices.get(pair).copied() {
            return Ok(price);
        }

        let ticker = self.feed.get_ticker(pair).await?;
        self.remember(&ticker)?;
        Ok(ticker.last_price)
    }

    fn commission(&self, notional: Decimal) -> Decimal {
        (notional * self.commission_rate).max(self.min_commission)
    }
}

#[async_trait]
impl<F: ExchangeClient> ExchangeClient for PaperExchange<F> {
    async fn get_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
        let ticker = self.feed.get_ticker(pair).await?;
        self.remember(&ticker)?;
        Ok(ticker)
    }

    async fn get_all_tickers(&self) -> ExchangeResult<HashMap<String, Ticker>> {
        let tickers = self.feed.get_all_tickers().await?;
        let mut book = self.lock()?;
        for ticker in tickers.values() {
            book.last_prices.insert(ticker.pair.clone(), ticker.last_price);
        }
        Ok(tickers)
    }

    async fn get_balance(&self) -> ExchangeResult<Wallet> {
        let book = self.lock()?;
        let mut balances = vec![Balance::new(&self.quote_asset, book.cash, Decimal::ZERO)];
        balances.extend(
            book.holdings
                .iter()
                .filter(|(_, qty)| !qty.is_zero())
                .map(|(asset, qty)| Balance::new(asset, *qty, Decimal::ZERO)),
        );
        Ok(Wallet::new(balances))
    }

    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderFill> {
        if order.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Order(format!(
                "Quantity must be positive, got {}",
                order.quantity
            )));
        }

        let base = order
            .pair
            .split_once('/')
            .map(|(base, _)| base.to_string())
            .ok_or_else(|| ExchangeError::InvalidSymbol(order.pair.clone()))?;

        let price = self.reference_price(&order.pair).await?;

        let mut book = self.lock()?;
        let filled_price = match order.side {
            OrderSide::Buy => {
                let fill = price * (Decimal::ONE + self.slippage);
                let notional = fill * order.quantity;
                let cost = notional + self.commission(notional);
                if book.cash < cost {
                    return Err(ExchangeError::InsufficientFunds(format!(
                        "Need {} {}, have {}",
                        cost, self.quote_asset, book.cash
                    )));
                }
                book.cash -= cost;
                *book.holdings.entry(base).or_insert(Decimal::ZERO) += order.quantity;
                fill
            }
            OrderSide::Sell => {
                let held = book.holdings.get(&base).copied().unwrap_or(Decimal::ZERO);
                if held < order.quantity {
                    return Err(ExchangeError::InsufficientFunds(format!(
                        "Need {} {}, have {}",
                        order.quantity, base, held
                    )));
                }
                let fill = price * (Decimal::ONE - self.slippage);
                let notional = fill * order.quantity;
                book.cash += notional - self.commission(notional);
                book.holdings.insert(base, held - order.quantity);
                fill
            }
        };

        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "[paper] {} {} {} @ {} (cash {})",
            order.side,
            order.quantity_str(),
            order.pair,
            filled_price,
            book.cash
        );

        Ok(OrderFill {
            order_id: format!("paper-{}", order_id),
            pair: order.pair.clone(),
            side: order.side,
            status: OrderStatus::Filled,
            filled_price,
            filled_quantity: order.quantity,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}
