mod common;

use chrono::{TimeZone, Utc};
use common::MockExchange;
use roostoo_trader::config::Config;
use roostoo_trader::domain::models::{Instrument, InstrumentBook, TradeAction};
use roostoo_trader::exchange::{ExchangeClient, PaperExchange};
use roostoo_trader::trading::{ExecutionEngine, ExecutionOutcome};
use rust_decimal_macros::dec;

const PAIR: &str = "LOT/USD";

fn paper(cash: rust_decimal::Decimal) -> PaperExchange<MockExchange> {
    let feed = MockExchange::new();
    feed.set_price(PAIR, dec!(10));
    PaperExchange::new(feed, "USD", cash, dec!(0.001), dec!(0.001), dec!(0.1))
}

fn large_lot() -> Instrument {
    Instrument::new(PAIR, dec!(1), dec!(10000)).unwrap()
}

#[tokio::test]
async fn minimum_lot_buy_fills_when_affordable() {
    let exchange = paper(dec!(200000));
    let engine = ExecutionEngine::new(Config::default().risk);
    let mut book = InstrumentBook::default();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    let outcome = engine
        .execute(&exchange, &large_lot(), &mut book, TradeAction::Buy, dec!(10), dec!(0.10), now)
        .await
        .unwrap();

    match outcome {
        ExecutionOutcome::Filled(record) => {
            assert_eq!(record.quantity, dec!(10000));
            assert_eq!(record.price, dec!(10.01));
        }
        other => panic!("expected a fill, got {:?}", other),
    }

    let wallet = exchange.get_balance().await.unwrap();
    // 200000 - 10000 * 10.01 - 100.1 commission
    assert_eq!(wallet.free("USD"), dec!(99799.9));
    assert_eq!(wallet.free("LOT"), dec!(10000));
    assert!(book.position.is_open);
}

#[tokio::test]
async fn minimum_lot_buy_skipped_when_cash_short() {
    let exchange = paper(dec!(100000));
    let engine = ExecutionEngine::new(Config::default().risk);
    let mut book = InstrumentBook::default();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    let outcome = engine
        .execute(&exchange, &large_lot(), &mut book, TradeAction::Buy, dec!(10), dec!(0.10), now)
        .await
        .unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Skipped(_)));
    assert!(!book.position.is_open);
    assert!(book.trades.is_empty());
    let wallet = exchange.get_balance().await.unwrap();
    assert_eq!(wallet.free("USD"), dec!(100000));
}

#[tokio::test]
async fn round_trip_books_profit_against_entry() {
    let exchange = paper(dec!(1000));
    let engine = ExecutionEngine::new(Config::default().risk);
    let instrument = Instrument::new(PAIR, dec!(1), dec!(1)).unwrap();
    let mut book = InstrumentBook::default();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    engine
        .execute(&exchange, &instrument, &mut book, TradeAction::Buy, dec!(10), dec!(0.10), now)
        .await
        .unwrap();
    // floor(1000 * 0.10 / 10.01) = 9 at 10.01
    assert_eq!(book.position.entry_price, Some(dec!(10.01)));

    let outcome = engine
        .execute(&exchange, &instrument, &mut book, TradeAction::Sell, dec!(10), dec!(0.10), now)
        .await
        .unwrap();

    match outcome {
        // (9.99 - 10.01) * 9 - 0.1 minimum commission
        ExecutionOutcome::Filled(record) => assert_eq!(record.profit, dec!(-0.28)),
        other => panic!("expected a fill, got {:?}", other),
    }
    assert!(!book.position.is_open);
    assert_eq!(book.trades.len(), 2);
}
