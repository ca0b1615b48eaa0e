// src/market_data/mod.rs
pub mod cache;

pub use cache::PriceCache;
