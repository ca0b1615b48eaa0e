// src/trading/bot.rs
use crate::config::{Config, TradingConfig};
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::{Instrument, InstrumentBook, PortfolioSnapshot, TradeAction};
use crate::exchange::client::{ExchangeClient, Wallet};
use crate::market_data::cache::PriceCache;
use crate::trading::execution::{ExecutionEngine, ExecutionOutcome};
use crate::trading::portfolio::{self, PortfolioTracker};
use crate::trading::risk::{Admission, RiskGate};
use crate::trading::signals::SignalGenerator;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use tokio::time::{sleep, Instant};

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Initializing,
    Running,
    Polling,
    Deciding,
    Executing,
    Stopped,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LoopPhase::Initializing => "initializing",
            LoopPhase::Running => "running",
            LoopPhase::Polling => "polling",
            LoopPhase::Deciding => "deciding",
            LoopPhase::Executing => "executing",
            LoopPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Every instrument was evaluated
    Completed {
        trades: usize,
        portfolio: PortfolioSnapshot,
    },
    /// Some instrument had no price; nothing was evaluated
    MissingPrices(Vec<String>),
    /// The balance query failed; nothing was evaluated
    PortfolioUnavailable(String),
}

/// Sequential poll, decide, execute loop over all configured instruments
pub struct TradingLoop<E> {
    exchange: E,
    instruments: Vec<Instrument>,
    signals: SignalGenerator,
    cache: PriceCache,
    risk: RiskGate,
    execution: ExecutionEngine,
    tracker: PortfolioTracker,
    books: HashMap<String, InstrumentBook>,
    settings: TradingConfig,
    phase: LoopPhase,
}

impl<E: ExchangeClient> TradingLoop<E> {
    pub fn new(exchange: E, config: &Config, signals: SignalGenerator) -> AppResult<Self> {
        let instruments = config.instruments()?;
        let capacity = config
            .trading
            .window_capacity
            .max(signals.required_samples());

        let books = instruments
            .iter()
            .map(|i| (i.pair.clone(), InstrumentBook::default()))
            .collect();

        Ok(Self {
            exchange,
            instruments,
            signals,
            cache: PriceCache::new(capacity),
            risk: RiskGate::new(config.risk.clone(), Utc::now()),
            execution: ExecutionEngine::new(config.risk.clone()),
            tracker: PortfolioTracker::new(config.risk.risk_free_rate),
            books,
            settings: config.trading.clone(),
            phase: LoopPhase::Initializing,
        })
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn book(&self, pair: &str) -> Option<&InstrumentBook> {
        self.books.get(pair)
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn risk(&self) -> &RiskGate {
        &self.risk
    }

    pub fn tracker(&self) -> &PortfolioTracker {
        &self.tracker
    }

    /// Check signal sources, sync positions from balances and take the
    /// baseline. Fails only when no instrument can produce signals.
    pub async fn initialize(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.phase = LoopPhase::Initializing;

        let ready: Vec<&str> = self
            .instruments
            .iter()
            .filter(|i| self.signals.is_ready(&i.pair))
            .map(|i| i.pair.as_str())
            .collect();
        if ready.is_empty() {
            return Err(AppError::Initialization(
                "No instrument has a ready signal source".to_string(),
            ));
        }
        log::info!("Signal source {:?} ready for {:?}", self.signals, ready);

        self.risk = RiskGate::new(self.risk.config().clone(), now);

        let prices = self.poll_prices().await;
        match self.exchange.get_balance().await {
            Ok(wallet) => {
                self.sync_positions(&wallet, &prices, now);
                if prices.len() == self.instruments.len() {
                    let snapshot = portfolio::snapshot(&wallet, &self.instruments, &prices, now);
                    self.risk.set_baseline(snapshot.total_value);
                }
            }
            Err(e) => log::warn!("Could not read balances at startup: {}", e),
        }

        self.phase = LoopPhase::Running;
        Ok(())
    }

    /// Treat existing base balances as open positions priced at the current market
    fn sync_positions(&mut self, wallet: &Wallet, prices: &HashMap<String, Decimal>, now: DateTime<Utc>) {
        let config = self.risk.config();
        for instrument in &self.instruments {
            let held = instrument.floor_to_step(wallet.free(&instrument.base));
            if held < instrument.min_lot() {
                continue;
            }
            let price = match prices.get(&instrument.pair) {
                Some(price) => *price,
                None => continue,
            };

            if let Some(book) = self.books.get_mut(&instrument.pair) {
                book.position
                    .open_at(price, config.stop_loss_pct, config.take_profit_pct);
                log::info!(
                    "Found {} {} at startup ({}), tracking as open from {}",
                    held,
                    instrument.base,
                    now.format("%Y-%m-%d %H:%M:%S"),
                    price
                );
            }
        }
    }

    /// Latest price per instrument; instruments without one are absent
    async fn poll_prices(&self) -> HashMap<String, Decimal> {
        let mut prices = HashMap::with_capacity(self.instruments.len());

        if self.settings.batch_tickers {
            match self.exchange.get_all_tickers().await {
                Ok(tickers) => {
                    for instrument in &self.instruments {
                        if let Some(ticker) = tickers.get(&instrument.pair) {
                            prices.insert(instrument.pair.clone(), ticker.last_price);
                        }
                    }
                }
                Err(e) => log::warn!("Ticker poll failed: {}", e),
            }
        } else {
            let results = join_all(
                self.instruments
                    .iter()
                    .map(|i| self.exchange.get_ticker(&i.pair)),
            )
            .await;

            for (instrument, result) in self.instruments.iter().zip(results) {
                match result {
                    Ok(ticker) => {
                        prices.insert(instrument.pair.clone(), ticker.last_price);
                    }
                    Err(e) => log::warn!("Ticker for {} failed: {}", instrument.pair, e),
                }
            }
        }

        prices
    }

    /// One poll, decide and execute pass over every instrument
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> AppResult<CycleOutcome> {
        // Step 1: all prices or nothing
        self.phase = LoopPhase::Polling;
        let prices = self.poll_prices().await;
        let missing: Vec<String> = self
            .instruments
            .iter()
            .filter(|i| !prices.contains_key(&i.pair))
            .map(|i| i.pair.clone())
            .collect();
        if !missing.is_empty() {
            log::warn!("Missing prices for {:?}, skipping cycle", missing);
            self.phase = LoopPhase::Running;
            return Ok(CycleOutcome::MissingPrices(missing));
        }

        // Step 2: portfolio
        let wallet = match self.exchange.get_balance().await {
            Ok(wallet) => wallet,
            Err(e) => {
                log::warn!("Balance query failed, skipping cycle: {}", e);
                self.phase = LoopPhase::Running;
                return Ok(CycleOutcome::PortfolioUnavailable(e.to_string()));
            }
        };
        let snapshot = portfolio::snapshot(&wallet, &self.instruments, &prices, now);
        self.risk.set_baseline(snapshot.total_value);
        self.tracker.record(snapshot.total_value);

        // Step 3: daily counters
        self.risk.roll_day(&mut self.books, now);

        // Step 4: per instrument, in configured order
        self.phase = LoopPhase::Deciding;
        let mut trades = 0;
        for instrument in self.instruments.clone() {
            let price = match prices.get(&instrument.pair) {
                Some(price) => *price,
                None => continue,
            };
            self.cache.record(&instrument.pair, price, now);

            if self.evaluate(&instrument, price, snapshot.total_value, now).await? {
                trades += 1;
            }
        }

        log::info!(
            "Portfolio value: {} | cash: {} | Sharpe ratio: {:.4}",
            snapshot.total_value,
            snapshot.cash,
            self.tracker.sharpe_ratio()
        );

        self.phase = LoopPhase::Running;
        Ok(CycleOutcome::Completed {
            trades,
            portfolio: snapshot,
        })
    }

    /// Decide and possibly trade one instrument; true when an order filled
    async fn evaluate(
        &mut self,
        instrument: &Instrument,
        price: Decimal,
        portfolio_value: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let pair = instrument.pair.as_str();
        if !self.signals.is_ready(pair) {
            return Ok(false);
        }

        let closes = self.cache.closes(pair, self.cache.capacity());
        if closes.len() < self.signals.required_samples() {
            log::debug!(
                "{}: {}/{} samples, waiting",
                pair,
                closes.len(),
                self.signals.required_samples()
            );
            return Ok(false);
        }

        let book = match self.books.get_mut(pair) {
            Some(book) => book,
            None => return Ok(false),
        };

        let decision = self.signals.decide(pair, &closes, book.position.is_open)?;
        let mut action = decision.action;
        if let Some(reason) = self.risk.exit_override(&book.position, price, now) {
            log::info!("{}: {} exit at {}", pair, reason, price);
            action = TradeAction::Sell;
        }

        if let Some(snapshot) = &decision.indicators {
            log::debug!(
                "{}: {:?} -> {} (rsi {:.2}, macd {:.4}, atr {:.4}, volatility {:.5})",
                pair,
                decision.label,
                decision.action,
                snapshot.rsi,
                snapshot.macd,
                snapshot.atr,
                snapshot.volatility
            );
        }

        if action == TradeAction::Hold {
            return Ok(false);
        }

        if let Admission::Deny(reason) = self.risk.check_limits(&book.position, Some(portfolio_value), now) {
            log::info!("{}: {} denied, {}", pair, action, reason);
            return Ok(false);
        }

        self.phase = LoopPhase::Executing;
        let fraction = self.risk.size_fraction();
        let result = self
            .execution
            .execute(&self.exchange, instrument, book, action, price, fraction, now)
            .await;
        self.phase = LoopPhase::Deciding;

        match result {
            Ok(ExecutionOutcome::Filled(record)) => {
                log::info!(
                    "{}: {} {} @ {} (profit {})",
                    pair,
                    record.side,
                    record.quantity,
                    record.price,
                    record.profit
                );
                Ok(true)
            }
            Ok(ExecutionOutcome::Skipped(reason)) => {
                log::info!("{}: {} skipped, {}", pair, action, reason);
                Ok(false)
            }
            Err(e) => {
                log::error!("{}: {} failed: {}", pair, action, e);
                Ok(false)
            }
        }
    }

    /// Initialize, then cycle until the configured runtime has elapsed
    pub async fn run(&mut self) -> AppResult<()> {
        self.initialize(Utc::now()).await?;

        let started = Instant::now();
        let runtime = self.settings.runtime();
        log::info!("Trading loop started for {:?}", runtime);

        while started.elapsed() < runtime {
            let delay = match self.run_cycle(Utc::now()).await {
                Ok(CycleOutcome::Completed { .. }) => self.settings.cycle_delay(),
                Ok(CycleOutcome::MissingPrices(_)) => self.settings.retry_delay(),
                Ok(CycleOutcome::PortfolioUnavailable(_)) => self.settings.error_delay(),
                Err(e) => {
                    log::error!("Error in trading loop: {}", e);
                    self.phase = LoopPhase::Running;
                    self.settings.error_delay()
                }
            };
            sleep(delay).await;
        }

        self.phase = LoopPhase::Stopped;
        log::info!("Trading loop stopped after {:?}", started.elapsed());
        Ok(())
    }
}
