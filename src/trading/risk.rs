// src/trading/risk.rs
use crate::config::RiskConfig;
use crate::domain::models::{InstrumentBook, Position};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

/// Outcome of the pre-trade limit checks
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admit,
    Deny(String),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Why an open position is being force-closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    StaleProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::StaleProfit => write!(f, "stale profit"),
        }
    }
}

/// Kelly fraction `p - (1 - p) / r`, clamped to `[min, max]`
pub fn kelly_fraction(
    win_probability: Decimal,
    win_loss_ratio: Decimal,
    min: Decimal,
    max: Decimal,
) -> Decimal {
    if win_loss_ratio <= Decimal::ZERO {
        return min;
    }
    let kelly = win_probability - (Decimal::ONE - win_probability) / win_loss_ratio;
    kelly.max(min).min(max)
}

/// Position sizing, trade-rate limits, drawdown limit and forced exits
pub struct RiskGate {
    config: RiskConfig,
    baseline: Option<Decimal>,
    day_start: DateTime<Utc>,
}

impl RiskGate {
    pub fn new(config: RiskConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            baseline: None,
            day_start: now,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn baseline(&self) -> Option<Decimal> {
        self.baseline
    }

    pub fn day_start(&self) -> DateTime<Utc> {
        self.day_start
    }

    /// Record the drawdown reference; only the first call has effect
    pub fn set_baseline(&mut self, value: Decimal) -> bool {
        if self.baseline.is_some() {
            return false;
        }
        log::info!("Portfolio baseline set to {}", value);
        self.baseline = Some(value);
        true
    }

    /// Fraction of quote cash to commit to a BUY
    pub fn size_fraction(&self) -> Decimal {
        kelly_fraction(
            self.config.win_probability,
            self.config.win_loss_ratio,
            self.config.min_risk_fraction,
            self.config.base_risk_per_trade,
        )
    }

    /// Trade-rate, daily-count and drawdown checks for one instrument
    pub fn check_limits(
        &self,
        position: &Position,
        portfolio_value: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Admission {
        if let Some(last) = position.last_trade_time {
            let elapsed = now - last;
            if elapsed < Duration::seconds(self.config.min_trade_interval_secs) {
                return Admission::Deny(format!(
                    "last trade {}s ago, minimum interval is {}s",
                    elapsed.num_seconds(),
                    self.config.min_trade_interval_secs
                ));
            }
        }

        if position.daily_trade_count >= self.config.max_daily_trades {
            return Admission::Deny(format!(
                "daily trade limit {} reached",
                self.config.max_daily_trades
            ));
        }

        if let (Some(baseline), Some(value)) = (self.baseline, portfolio_value) {
            let floor = baseline * (Decimal::ONE - self.config.max_drawdown);
            if value < floor {
                return Admission::Deny(format!(
                    "portfolio value {} below drawdown floor {}",
                    value, floor
                ));
            }
        }

        Admission::Admit
    }

    /// Reset every daily trade count once 24h have passed since the day start
    pub fn roll_day(&mut self, books: &mut HashMap<String, InstrumentBook>, now: DateTime<Utc>) -> bool {
        if now - self.day_start < Duration::hours(24) {
            return false;
        }

        for book in books.values_mut() {
            book.position.daily_trade_count = 0;
        }
        self.day_start = now;
        log::info!("Daily trade counters reset");
        true
    }

    /// Forced SELL for an open position, overriding the signal
    pub fn exit_override(
        &self,
        position: &Position,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        if !position.is_open {
            return None;
        }

        if position.stop_loss_price.map_or(false, |stop| price <= stop) {
            return Some(ExitReason::StopLoss);
        }

        if position.profit_target_price.map_or(false, |target| price >= target) {
            return Some(ExitReason::TakeProfit);
        }

        let stale = position
            .last_trade_time
            .map_or(false, |t| now - t > Duration::seconds(self.config.stale_exit_secs));
        let in_profit = position
            .entry_price
            .map_or(false, |entry| price > entry * (Decimal::ONE + self.config.stale_exit_gain));
        if stale && in_profit {
            return Some(ExitReason::StaleProfit);
        }

        None
    }
}
