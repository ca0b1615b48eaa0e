// src/domain/models.rs
use crate::domain::errors::{MarketDataError, MarketDataResult};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;

/// A tradable base/quote pair and its order granularity
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub pair: String,
    pub base: String,
    pub quote: String,
    pub step_size: Decimal,
    pub min_quantity: Decimal,
}

impl Instrument {
    pub fn new(pair: &str, step_size: Decimal, min_quantity: Decimal) -> MarketDataResult<Self> {
        let (base, quote) = pair
            .split_once('/')
            .filter(|(b, q)| !b.is_empty() && !q.is_empty())
            .ok_or_else(|| MarketDataError::UnknownInstrument(pair.to_string()))?;

        if step_size <= Decimal::ZERO {
            return Err(MarketDataError::UnknownInstrument(format!(
                "{}: step size must be positive",
                pair
            )));
        }

        Ok(Self {
            pair: pair.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            step_size,
            min_quantity,
        })
    }

    /// Largest multiple of the step size not above `quantity`
    pub fn floor_to_step(&self, quantity: Decimal) -> Decimal {
        (quantity / self.step_size).floor() * self.step_size
    }

    /// Smallest multiple of the step size not below `quantity`
    pub fn ceil_to_step(&self, quantity: Decimal) -> Decimal {
        (quantity / self.step_size).ceil() * self.step_size
    }

    /// Smallest quantity the venue will accept that is also a step multiple
    pub fn min_lot(&self) -> Decimal {
        self.ceil_to_step(self.min_quantity).max(self.step_size)
    }
}

/// One observed price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PriceSample {
    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or_default()
    }
}

/// Latest ticker data for one pair
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub pair: String,
    pub last_price: Decimal,
    pub bid_price: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Candlestick {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Core Trading Components
#[derive(Debug, Clone)]
pub struct Order {
    pub pair: String,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub timestamp: i64,
}

impl Order {
    pub fn market(pair: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            pair: pair.to_string(),
            quantity,
            order_type: OrderType::Market,
            side,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Quantity as sent on the wire, without trailing zeros
    pub fn quantity_str(&self) -> String {
        self.quantity.normalize().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderType {
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderStatus {
    New,
    Filled,
    PartiallyFilled,
    Canceled,
    Rejected,
    Pending,
}

impl OrderStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "PENDING" | "PENDING_CANCEL" => OrderStatus::Pending,
            _ => OrderStatus::New,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Pending => write!(f, "PENDING"),
        }
    }
}

/// Confirmed execution returned by the venue
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub order_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub filled_price: Decimal,
    pub filled_quantity: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Market regime predicted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyLabel {
    Trend,
    MeanReversion,
    Sentiment,
    Breakout,
    Hold,
}

impl StrategyLabel {
    pub const ALL: [StrategyLabel; 5] = [
        StrategyLabel::Trend,
        StrategyLabel::MeanReversion,
        StrategyLabel::Sentiment,
        StrategyLabel::Breakout,
        StrategyLabel::Hold,
    ];

    pub fn index(&self) -> usize {
        match self {
            StrategyLabel::Trend => 0,
            StrategyLabel::MeanReversion => 1,
            StrategyLabel::Sentiment => 2,
            StrategyLabel::Breakout => 3,
            StrategyLabel::Hold => 4,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(StrategyLabel::Hold)
    }
}

impl fmt::Display for StrategyLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StrategyLabel::Trend => write!(f, "TREND"),
            StrategyLabel::MeanReversion => write!(f, "MEAN_REVERSION"),
            StrategyLabel::Sentiment => write!(f, "SENTIMENT"),
            StrategyLabel::Breakout => write!(f, "BREAKOUT"),
            StrategyLabel::Hold => write!(f, "HOLD"),
        }
    }
}

/// Per-instrument position state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub is_open: bool,
    pub entry_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub profit_target_price: Option<Decimal>,
    pub last_trade_time: Option<DateTime<Utc>>,
    pub daily_trade_count: u32,
}

impl Position {
    /// Open at `price` with fixed stop-loss/take-profit bands
    pub fn open_at(&mut self, price: Decimal, stop_loss_pct: Decimal, take_profit_pct: Decimal) {
        self.is_open = true;
        self.entry_price = Some(price);
        self.stop_loss_price = Some(price * (Decimal::ONE - stop_loss_pct));
        self.profit_target_price = Some(price * (Decimal::ONE + take_profit_pct));
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.entry_price = None;
        self.stop_loss_price = None;
        self.profit_target_price = None;
    }

    /// Stamp a confirmed trade against the rate and daily limits
    pub fn record_trade(&mut self, now: DateTime<Utc>) {
        self.last_trade_time = Some(now);
        self.daily_trade_count += 1;
    }
}

/// Append-only trade history entry
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub profit: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Everything the loop tracks for one instrument
#[derive(Debug, Clone, Default)]
pub struct InstrumentBook {
    pub position: Position,
    pub trades: Vec<TradeRecord>,
}

impl InstrumentBook {
    pub fn realized_profit(&self) -> Decimal {
        self.trades.iter().map(|t| t.profit).sum()
    }
}

/// Cash and marked-to-market total at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub total_value: Decimal,
    pub timestamp: DateTime<Utc>,
}
