// src/trading/execution.rs
use crate::config::RiskConfig;
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{
    Instrument, InstrumentBook, Order, OrderFill, OrderSide, TradeAction, TradeRecord,
};
use crate::exchange::client::ExchangeClient;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Result of an execution attempt that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Order filled and the book updated
    Filled(TradeRecord),
    /// Business rejection; nothing was sent and nothing changed
    Skipped(String),
}

/// Step-aligned BUY quantity for `cash * fraction` at `adjusted_price`,
/// raised to the minimum lot when the budget falls short of it
pub fn buy_quantity(
    instrument: &Instrument,
    cash: Decimal,
    fraction: Decimal,
    adjusted_price: Decimal,
) -> Decimal {
    let qty = instrument.floor_to_step(cash * fraction / adjusted_price);
    let min_lot = instrument.min_lot();
    if qty < min_lot {
        instrument.ceil_to_step(min_lot)
    } else {
        qty
    }
}

/// Commission charged on a fill: a rate on notional with a floor
pub fn commission(notional: Decimal, rate: Decimal, minimum: Decimal) -> Decimal {
    (notional * rate).max(minimum)
}

/// Turns approved actions into market orders and books the fills
pub struct ExecutionEngine {
    config: RiskConfig,
}

impl ExecutionEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Execute `action` for `instrument`. The book is only touched after a
    /// confirmed fill; any failure leaves it exactly as it was.
    pub async fn execute<E: ExchangeClient + ?Sized>(
        &self,
        exchange: &E,
        instrument: &Instrument,
        book: &mut InstrumentBook,
        action: TradeAction,
        price: Decimal,
        risk_fraction: Decimal,
        now: DateTime<Utc>,
    ) -> TradingResult<ExecutionOutcome> {
        match action {
            TradeAction::Hold => Ok(ExecutionOutcome::Skipped("hold".to_string())),
            TradeAction::Buy => {
                self.buy(exchange, instrument, book, price, risk_fraction, now)
                    .await
            }
            TradeAction::Sell => self.sell(exchange, instrument, book, price, now).await,
        }
    }

    async fn buy<E: ExchangeClient + ?Sized>(
        &self,
        exchange: &E,
        instrument: &Instrument,
        book: &mut InstrumentBook,
        price: Decimal,
        risk_fraction: Decimal,
        now: DateTime<Utc>,
    ) -> TradingResult<ExecutionOutcome> {
        if book.position.is_open {
            return Ok(ExecutionOutcome::Skipped(format!(
                "{} position already open",
                instrument.pair
            )));
        }
        if price <= Decimal::ZERO {
            return Ok(ExecutionOutcome::Skipped(format!("invalid price {}", price)));
        }

        let wallet = exchange.get_balance().await?;
        let cash = wallet.free(&instrument.quote);
        if cash < self.config.min_notional {
            return Ok(ExecutionOutcome::Skipped(format!(
                "{} {} below minimum notional {}",
                cash, instrument.quote, self.config.min_notional
            )));
        }

        let adjusted = price * (Decimal::ONE + self.config.slippage);
        let quantity = buy_quantity(instrument, cash, risk_fraction, adjusted);
        if cash < quantity * adjusted {
            return Ok(ExecutionOutcome::Skipped(format!(
                "insufficient {}: {} < {} x {}",
                instrument.quote, cash, quantity, adjusted
            )));
        }

        let order = Order::market(&instrument.pair, OrderSide::Buy, quantity);
        log::info!(
            "Submitting BUY {} {} (cash {}, adjusted price {})",
            order.quantity_str(),
            instrument.pair,
            cash,
            adjusted
        );
        let fill = Self::confirmed(exchange.place_order(&order).await?)?;

        book.position.open_at(
            fill.filled_price,
            self.config.stop_loss_pct,
            self.config.take_profit_pct,
        );
        book.position.record_trade(now);

        let record = TradeRecord {
            side: OrderSide::Buy,
            price: fill.filled_price,
            quantity: fill.filled_quantity,
            profit: Decimal::ZERO,
            timestamp: now,
        };
        book.trades.push(record.clone());

        log::info!(
            "BUY filled: {} {} @ {} (stop {:?}, target {:?})",
            fill.filled_quantity,
            instrument.pair,
            fill.filled_price,
            book.position.stop_loss_price,
            book.position.profit_target_price
        );
        Ok(ExecutionOutcome::Filled(record))
    }

    async fn sell<E: ExchangeClient + ?Sized>(
        &self,
        exchange: &E,
        instrument: &Instrument,
        book: &mut InstrumentBook,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> TradingResult<ExecutionOutcome> {
        if !book.position.is_open {
            return Ok(ExecutionOutcome::Skipped(format!(
                "no open {} position",
                instrument.pair
            )));
        }
        let entry = book.position.entry_price.ok_or_else(|| {
            TradingError::PositionManagement(format!(
                "{} position is open without an entry price",
                instrument.pair
            ))
        })?;

        let wallet = exchange.get_balance().await?;
        let quantity = instrument.floor_to_step(wallet.free(&instrument.base));
        if quantity < instrument.min_lot() {
            return Ok(ExecutionOutcome::Skipped(format!(
                "{} {} below minimum lot {}",
                quantity,
                instrument.base,
                instrument.min_lot()
            )));
        }

        let order = Order::market(&instrument.pair, OrderSide::Sell, quantity);
        log::info!(
            "Submitting SELL {} {} (reference price {})",
            order.quantity_str(),
            instrument.pair,
            price * (Decimal::ONE - self.config.slippage)
        );
        let fill = Self::confirmed(exchange.place_order(&order).await?)?;

        let fee = commission(
            fill.filled_price * fill.filled_quantity,
            self.config.transaction_cost,
            self.config.min_commission,
        );
        let profit = (fill.filled_price - entry) * fill.filled_quantity - fee;

        book.position.close();
        book.position.record_trade(now);

        let record = TradeRecord {
            side: OrderSide::Sell,
            price: fill.filled_price,
            quantity: fill.filled_quantity,
            profit,
            timestamp: now,
        };
        book.trades.push(record.clone());

        log::info!(
            "SELL filled: {} {} @ {} (entry {}, profit {})",
            fill.filled_quantity,
            instrument.pair,
            fill.filled_price,
            entry,
            profit
        );
        Ok(ExecutionOutcome::Filled(record))
    }

    /// Reject fills that do not describe an actual execution
    fn confirmed(fill: OrderFill) -> TradingResult<OrderFill> {
        if !fill.status.is_filled() {
            return Err(TradingError::OrderExecution(format!(
                "Order {} not filled (status {})",
                fill.order_id, fill.status
            )));
        }
        if fill.filled_quantity <= Decimal::ZERO || fill.filled_price <= Decimal::ZERO {
            return Err(TradingError::OrderExecution(format!(
                "Order {} returned an empty fill ({} @ {})",
                fill.order_id, fill.filled_quantity, fill.filled_price
            )));
        }
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::errors::{ExchangeError, ExchangeResult};
    use crate::domain::models::{OrderStatus, Ticker};
    use crate::exchange::client::{Balance, Wallet};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fills every order at a fixed price and remembers what it was sent
    struct StubExchange {
        wallet: Wallet,
        fill_price: Decimal,
        fail_orders: bool,
        orders: Mutex<Vec<Order>>,
    }

    impl StubExchange {
        fn new(balances: Vec<Balance>, fill_price: Decimal) -> Self {
            Self {
                wallet: Wallet::new(balances),
                fill_price,
                fail_orders: false,
                orders: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for StubExchange {
        async fn get_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
            Err(ExchangeError::InvalidSymbol(pair.to_string()))
        }

        async fn get_all_tickers(&self) -> ExchangeResult<HashMap<String, Ticker>> {
            Ok(HashMap::new())
        }

        async fn get_balance(&self) -> ExchangeResult<Wallet> {
            Ok(self.wallet.clone())
        }

        async fn place_order(&self, order: &Order) -> ExchangeResult<OrderFill> {
            if self.fail_orders {
                return Err(ExchangeError::Api("order rejected".to_string()));
            }
            self.orders.lock().unwrap().push(order.clone());
            Ok(OrderFill {
                order_id: "1".to_string(),
                pair: order.pair.clone(),
                side: order.side,
                status: OrderStatus::Filled,
                filled_price: self.fill_price,
                filled_quantity: order.quantity,
                timestamp: 0,
            })
        }
    }

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(Config::default().risk)
    }

    fn instrument(step: Decimal, min: Decimal) -> Instrument {
        Instrument::new("ABC/USD", step, min).unwrap()
    }

    #[tokio::test]
    async fn buy_opens_position_with_bands() {
        let exchange = StubExchange::new(vec![Balance::new("USD", dec!(1000), dec!(0))], dec!(100));
        let inst = instrument(dec!(0.01), dec!(0.01));
        let mut book = InstrumentBook::default();
        let now = Utc::now();

        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Buy, dec!(100), dec!(0.10), now)
            .await
            .unwrap();

        // 1000 * 0.10 / 100.1 = 0.999.. -> 0.99
        let sent = exchange.orders.lock().unwrap()[0].quantity;
        assert_eq!(sent, dec!(0.99));
        assert!(matches!(outcome, ExecutionOutcome::Filled(ref r) if r.profit == Decimal::ZERO));
        assert!(book.position.is_open);
        assert_eq!(book.position.entry_price, Some(dec!(100)));
        assert_eq!(book.position.stop_loss_price, Some(dec!(98.5)));
        assert_eq!(book.position.profit_target_price, Some(dec!(103)));
        assert_eq!(book.position.daily_trade_count, 1);
        assert_eq!(book.position.last_trade_time, Some(now));
        assert_eq!(book.trades.len(), 1);
    }

    #[tokio::test]
    async fn buy_is_skipped_when_open_or_broke() {
        let inst = instrument(dec!(0.01), dec!(0.01));
        let exchange = StubExchange::new(vec![Balance::new("USD", dec!(0.05), dec!(0))], dec!(100));

        let mut book = InstrumentBook::default();
        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Buy, dec!(100), dec!(0.1), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Skipped(_)));

        book.position.open_at(dec!(100), dec!(0.015), dec!(0.03));
        let before = book.position.clone();
        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Buy, dec!(100), dec!(0.1), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Skipped(_)));
        assert_eq!(book.position, before);
        assert!(exchange.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn min_lot_larger_than_cash_is_rejected() {
        // Budget covers 0.999 units but the minimum lot is 10000 at 10.01
        let exchange = StubExchange::new(vec![Balance::new("USD", dec!(100000), dec!(0))], dec!(10));
        let inst = instrument(dec!(1), dec!(10000));
        let mut book = InstrumentBook::default();

        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Buy, dec!(10), dec!(0.1), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Skipped(_)));
        assert!(!book.position.is_open);
    }

    #[tokio::test]
    async fn sell_books_exact_profit() {
        let exchange = StubExchange::new(
            vec![
                Balance::new("USD", dec!(0), dec!(0)),
                Balance::new("ABC", dec!(2.009), dec!(0)),
            ],
            dec!(110),
        );
        let inst = instrument(dec!(0.01), dec!(0.01));
        let mut book = InstrumentBook::default();
        book.position.open_at(dec!(100), dec!(0.015), dec!(0.03));

        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Sell, dec!(110), dec!(0.1), Utc::now())
            .await
            .unwrap();

        // qty 2.00, commission max(220 * 0.001, 0.1) = 0.22
        match outcome {
            ExecutionOutcome::Filled(record) => {
                assert_eq!(record.quantity, dec!(2.00));
                assert_eq!(record.profit, dec!(19.78));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!book.position.is_open);
        assert_eq!(book.position.entry_price, None);
        assert_eq!(book.realized_profit(), dec!(19.78));
    }

    #[tokio::test]
    async fn small_sell_pays_commission_floor() {
        let exchange = StubExchange::new(vec![Balance::new("ABC", dec!(1), dec!(0))], dec!(10));
        let inst = instrument(dec!(1), dec!(1));
        let mut book = InstrumentBook::default();
        book.position.open_at(dec!(9), dec!(0.015), dec!(0.03));

        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Sell, dec!(10), dec!(0.1), Utc::now())
            .await
            .unwrap();
        // (10 - 9) * 1 - max(0.01, 0.1)
        assert!(matches!(outcome, ExecutionOutcome::Filled(ref r) if r.profit == dec!(0.9)));
    }

    #[tokio::test]
    async fn sell_without_position_or_balance_is_skipped() {
        let inst = instrument(dec!(1), dec!(1));
        let exchange = StubExchange::new(vec![Balance::new("ABC", dec!(0.5), dec!(0))], dec!(10));

        let mut book = InstrumentBook::default();
        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Sell, dec!(10), dec!(0.1), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Skipped(_)));

        book.position.open_at(dec!(9), dec!(0.015), dec!(0.03));
        let outcome = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Sell, dec!(10), dec!(0.1), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Skipped(_)));
        assert!(book.position.is_open);
    }

    #[tokio::test]
    async fn failed_order_leaves_book_untouched() {
        let mut exchange = StubExchange::new(vec![Balance::new("USD", dec!(1000), dec!(0))], dec!(100));
        exchange.fail_orders = true;
        let inst = instrument(dec!(0.01), dec!(0.01));
        let mut book = InstrumentBook::default();
        let before = book.position.clone();

        let result = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Buy, dec!(100), dec!(0.1), Utc::now())
            .await;

        assert!(matches!(result, Err(TradingError::Exchange(_))));
        assert_eq!(book.position, before);
        assert!(book.trades.is_empty());
    }

    #[tokio::test]
    async fn zero_fill_is_an_error() {
        let exchange = StubExchange::new(vec![Balance::new("USD", dec!(1000), dec!(0))], dec!(0));
        let inst = instrument(dec!(0.01), dec!(0.01));
        let mut book = InstrumentBook::default();

        let result = engine()
            .execute(&exchange, &inst, &mut book, TradeAction::Buy, dec!(100), dec!(0.1), Utc::now())
            .await;
        assert!(matches!(result, Err(TradingError::OrderExecution(_))));
        assert!(!book.position.is_open);
    }

    fn step_strategy() -> impl Strategy<Value = Decimal> {
        prop_oneof![
            Just(dec!(0.0001)),
            Just(dec!(0.01)),
            Just(dec!(0.1)),
            Just(dec!(1)),
            Just(dec!(10)),
        ]
    }

    proptest! {
        #[test]
        fn buy_quantity_is_step_aligned(
            step in step_strategy(),
            min_units in 0u32..50,
            cash_cents in 1u64..100_000_000,
            price_cents in 1u64..10_000_000,
            fraction_bp in 100u32..=1000,
        ) {
            let min_quantity = step * Decimal::from(min_units);
            let inst = Instrument::new("ABC/USD", step, min_quantity).unwrap();
            let cash = Decimal::new(cash_cents as i64, 2);
            let price = Decimal::new(price_cents as i64, 2) * dec!(1.001);
            let fraction = Decimal::new(fraction_bp as i64, 4);

            let qty = buy_quantity(&inst, cash, fraction, price);

            prop_assert!(qty >= inst.min_lot());
            prop_assert_eq!(qty % step, Decimal::ZERO);
            prop_assert!(qty * price <= cash * fraction || qty == inst.min_lot());
        }
    }
}
