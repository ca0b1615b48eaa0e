// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::Instrument;
use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Quantity steps for the pairs the mock exchange lists
const DEFAULT_STEPS: [(&str, Decimal); 9] = [
    ("BTC/USD", dec!(0.0001)),
    ("ETH/USD", dec!(0.01)),
    ("SOL/USD", dec!(0.1)),
    ("BCH/USD", dec!(0.01)),
    ("BNB/USD", dec!(0.01)),
    ("XRP/USD", dec!(1)),
    ("ADA/USD", dec!(1)),
    ("SAND/USD", dec!(1)),
    ("USTC/USD", dec!(10)),
];

const FALLBACK_STEP: Decimal = dec!(0.01);
const DEFAULT_MIN_QUANTITY: Decimal = dec!(0.0001);

/// Trading bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Exchange API credentials and transport settings
    pub exchange: ExchangeConfig,

    /// Trading configuration
    pub trading: TradingConfig,

    /// Risk management configuration
    pub risk: RiskConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Exchange API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST base URL of the venue
    pub base_url: String,

    /// API key
    pub api_key: String,

    /// API secret
    pub api_secret: String,

    /// Simulate balances and fills locally, using live prices
    pub paper_trading: bool,

    /// Starting quote cash for paper trading
    pub initial_cash: Decimal,

    /// Public klines endpoint used to fetch classifier training history
    pub history_url: String,

    /// Minimum spacing between outbound API calls
    pub request_interval_ms: u64,

    /// Retries for transient HTTP failures
    pub max_retries: u32,

    /// First backoff delay, doubled on each retry
    pub retry_backoff_ms: u64,

    /// Per-request timeout
    pub timeout_secs: u64,
}

/// One tradable pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Pair identifier (e.g., "BTC/USD")
    pub pair: String,

    /// Minimum order granularity
    pub step_size: Decimal,

    /// Minimum order quantity
    pub min_quantity: Decimal,
}

/// Signal source selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Short/long simple moving average crossover
    Crossover {
        short_window: usize,
        long_window: usize,
    },

    /// Per-instrument classifier trained on hourly history
    Classifier {
        history_interval: String,
        history_limit: u32,
    },
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Instruments traded each cycle, in this order
    pub instruments: Vec<InstrumentConfig>,

    /// Active signal source
    pub strategy: StrategyConfig,

    /// Price samples kept per instrument
    pub window_capacity: usize,

    /// Poll all tickers in one request instead of one per instrument
    pub batch_tickers: bool,

    /// Delay between cycles
    pub cycle_delay_secs: u64,

    /// Delay after a cycle skipped for missing prices
    pub retry_delay_secs: u64,

    /// Delay after an unexpected loop error
    pub error_delay_secs: u64,

    /// Total runtime before the loop stops
    pub runtime_secs: u64,
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Upper clamp of the Kelly fraction
    pub base_risk_per_trade: Decimal,

    /// Lower clamp of the Kelly fraction
    pub min_risk_fraction: Decimal,

    /// Estimated probability that a trade wins
    pub win_probability: Decimal,

    /// Estimated average win over average loss
    pub win_loss_ratio: Decimal,

    /// Commission rate charged on notional
    pub transaction_cost: Decimal,

    /// Commission floor per trade
    pub min_commission: Decimal,

    /// Largest tolerated fractional decline from the baseline
    pub max_drawdown: Decimal,

    /// Minimum seconds between trades on one instrument
    pub min_trade_interval_secs: i64,

    /// Trades allowed per instrument per day
    pub max_daily_trades: u32,

    /// Assumed adverse price move on execution
    pub slippage: Decimal,

    /// Minimum quote cash before a BUY is attempted
    pub min_notional: Decimal,

    /// Required edge over ATR for TREND entries
    pub min_profit_potential: f64,

    /// Stop-loss distance below entry
    pub stop_loss_pct: Decimal,

    /// Take-profit distance above entry
    pub take_profit_pct: Decimal,

    /// Age after which a profitable position is closed
    pub stale_exit_secs: i64,

    /// Gain over entry required for the stale exit
    pub stale_exit_gain: Decimal,

    /// Per-cycle risk-free rate for the Sharpe ratio
    pub risk_free_rate: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Step size for a pair, falling back to 0.01 for unlisted pairs
pub fn default_step(pair: &str) -> Decimal {
    DEFAULT_STEPS
        .iter()
        .find(|(p, _)| *p == pair)
        .map(|(_, step)| *step)
        .unwrap_or(FALLBACK_STEP)
}

fn instrument_config(pair: &str) -> InstrumentConfig {
    InstrumentConfig {
        pair: pair.to_string(),
        step_size: default_step(pair),
        min_quantity: DEFAULT_MIN_QUANTITY,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let paper_trading = env_or("PAPER_TRADING", defaults.exchange.paper_trading);
        let api_key = env::var("API_KEY").unwrap_or_default();
        let api_secret = env::var("API_SECRET").unwrap_or_default();

        let exchange_config = ExchangeConfig {
            base_url: env::var("BASE_URL").unwrap_or(defaults.exchange.base_url),
            api_key,
            api_secret,
            paper_trading,
            initial_cash: env_or("INITIAL_CASH", defaults.exchange.initial_cash),
            ..defaults.exchange
        };

        let instruments = match env::var("TRADING_PAIRS") {
            Ok(pairs) => pairs
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(instrument_config)
                .collect(),
            Err(_) => defaults.trading.instruments,
        };

        let strategy = match env::var("STRATEGY").map(|s| s.to_lowercase()).as_deref() {
            Ok("crossover") => StrategyConfig::Crossover {
                short_window: env_or("SHORT_WINDOW", 5),
                long_window: env_or("LONG_WINDOW", 20),
            },
            Ok("classifier") | Err(_) => defaults.trading.strategy,
            Ok(other) => {
                return Err(AppError::Config(format!("Unsupported strategy: {}", other)));
            }
        };

        let trading_config = TradingConfig {
            instruments,
            strategy,
            runtime_secs: env_or("RUNTIME_SECS", defaults.trading.runtime_secs),
            cycle_delay_secs: env_or("CYCLE_DELAY_SECS", defaults.trading.cycle_delay_secs),
            ..defaults.trading
        };

        let logging_config = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or(defaults.logging.level),
            to_file: env_or("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            exchange: exchange_config,
            trading: trading_config,
            risk: defaults.risk,
            logging: logging_config,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| AppError::Config(format!("Failed to open config file: {}", e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_json(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> AppResult<Self> {
        serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if !self.exchange.paper_trading
            && (self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty())
        {
            return Err(AppError::Config(
                "API_KEY and API_SECRET are required unless paper trading".to_string(),
            ));
        }

        if self.trading.instruments.is_empty() {
            return Err(AppError::Config("No instruments configured".to_string()));
        }

        self.instruments()?;

        if let StrategyConfig::Crossover {
            short_window,
            long_window,
        } = self.trading.strategy
        {
            if short_window == 0 || short_window >= long_window {
                return Err(AppError::Config(format!(
                    "Crossover windows must satisfy 0 < short ({}) < long ({})",
                    short_window, long_window
                )));
            }
        }

        let risk = &self.risk;
        if risk.min_risk_fraction <= Decimal::ZERO || risk.min_risk_fraction > risk.base_risk_per_trade
        {
            return Err(AppError::Config(format!(
                "Risk fraction bounds must satisfy 0 < {} <= {}",
                risk.min_risk_fraction, risk.base_risk_per_trade
            )));
        }

        if risk.base_risk_per_trade > Decimal::ONE {
            return Err(AppError::Config(
                "base_risk_per_trade cannot exceed 1".to_string(),
            ));
        }

        if risk.win_loss_ratio <= Decimal::ZERO {
            return Err(AppError::Config(
                "win_loss_ratio must be positive".to_string(),
            ));
        }

        if risk.max_drawdown < Decimal::ZERO || risk.max_drawdown > Decimal::ONE {
            return Err(AppError::Config(
                "max_drawdown must be within [0, 1]".to_string(),
            ));
        }

        if risk.slippage < Decimal::ZERO || risk.slippage >= Decimal::ONE {
            return Err(AppError::Config("slippage must be within [0, 1)".to_string()));
        }

        Ok(())
    }

    /// Parsed instruments in configured order
    pub fn instruments(&self) -> AppResult<Vec<Instrument>> {
        self.trading
            .instruments
            .iter()
            .map(|i| {
                Instrument::new(&i.pair, i.step_size, i.min_quantity)
                    .map_err(|e| AppError::Config(e.to_string()))
            })
            .collect()
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path)
                    .map_err(|e| AppError::Config(format!("Failed to create log file: {}", e)))?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder
            .try_init()
            .map_err(|e| AppError::Config(format!("Failed to initialize logger: {}", e)))
    }
}

impl TradingConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.cycle_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_secs(self.error_delay_secs)
    }

    pub fn runtime(&self) -> Duration {
        Duration::from_secs(self.runtime_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                base_url: "https://mock-api.roostoo.com".to_string(),
                api_key: "".to_string(),
                api_secret: "".to_string(),
                paper_trading: true,
                initial_cash: dec!(100000),
                history_url: "https://api.binance.com".to_string(),
                request_interval_ms: 500,
                max_retries: 3,
                retry_backoff_ms: 500,
                timeout_secs: 10,
            },
            trading: TradingConfig {
                instruments: DEFAULT_STEPS
                    .iter()
                    .map(|(pair, _)| instrument_config(pair))
                    .collect(),
                strategy: StrategyConfig::Classifier {
                    history_interval: "1h".to_string(),
                    history_limit: 200,
                },
                window_capacity: 26,
                batch_tickers: true,
                cycle_delay_secs: 10,
                retry_delay_secs: 5,
                error_delay_secs: 5,
                runtime_secs: 3600,
            },
            risk: RiskConfig {
                base_risk_per_trade: dec!(0.10),
                min_risk_fraction: dec!(0.01),
                win_probability: dec!(0.6),
                win_loss_ratio: dec!(2.0),
                transaction_cost: dec!(0.001),
                min_commission: dec!(0.1),
                max_drawdown: dec!(0.50),
                min_trade_interval_secs: 10,
                max_daily_trades: 100,
                slippage: dec!(0.001),
                min_notional: dec!(0.1),
                min_profit_potential: 0.003,
                stop_loss_pct: dec!(0.015),
                take_profit_pct: dec!(0.03),
                stale_exit_secs: 300,
                stale_exit_gain: dec!(0.005),
                risk_free_rate: 0.001,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
