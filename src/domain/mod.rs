// src/domain/mod.rs
pub mod errors;
pub mod models;

// Re-export common types for convenience
pub use errors::{
    AnalysisError, AnalysisResult, AppError, AppResult, ExchangeError, ExchangeResult,
    MarketDataError, MarketDataResult, TradingError, TradingResult,
};
pub use models::{
    Candlestick, Instrument, InstrumentBook, Order, OrderFill, OrderSide, OrderStatus, OrderType,
    PortfolioSnapshot, Position, PriceSample, StrategyLabel, Ticker, TradeAction, TradeRecord,
};
