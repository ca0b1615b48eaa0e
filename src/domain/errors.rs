// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Order error: {0}")]
    Order(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl ExchangeError {
    /// Whether the transport may retry the request that produced this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_) | ExchangeError::RateLimit(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),
}

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Order execution error: {0}")]
    OrderExecution(String),

    #[error("Position management error: {0}")]
    PositionManagement(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Indicator calculation error: {0}")]
    IndicatorCalculation(String),

    #[error("Model training error: {0}")]
    Training(String),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type MarketDataResult<T> = Result<T, MarketDataError>;
pub type TradingResult<T> = Result<T, TradingError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
