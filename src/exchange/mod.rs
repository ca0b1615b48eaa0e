// src/exchange/mod.rs
pub mod binance;
pub mod client;
pub mod http;
pub mod paper;
pub mod rate_limit;
pub mod roostoo;
pub mod signing;

pub use binance::BinanceHistory;
pub use client::{Balance, ExchangeClient, HistoryProvider, Wallet};
pub use paper::PaperExchange;
pub use roostoo::RoostooClient;
