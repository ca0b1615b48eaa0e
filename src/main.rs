// src/main.rs
use roostoo_trader::analysis::labeling::label_candles;
use roostoo_trader::config::{Config, StrategyConfig};
use roostoo_trader::domain::errors::AppResult;
use roostoo_trader::domain::models::Instrument;
use roostoo_trader::exchange::{
    BinanceHistory, ExchangeClient, HistoryProvider, PaperExchange, RoostooClient,
};
use roostoo_trader::trading::{LabelClassifier, RandomForestClassifier, SignalGenerator, TradingLoop};

use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration: JSON file if given, environment otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting roostoo_trader v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Trading {} instruments against {} ({})",
        config.trading.instruments.len(),
        config.exchange.base_url,
        if config.exchange.paper_trading { "paper" } else { "live" }
    );

    // Create exchange client
    let exchange = create_exchange_client(&config);

    // Build the signal source
    let signals = create_signal_generator(&config).await?;

    let mut trading_loop = TradingLoop::new(exchange, &config, signals)?;
    trading_loop.run().await?;

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}

/// Create exchange client based on configuration
fn create_exchange_client(config: &Config) -> Arc<dyn ExchangeClient> {
    let client = RoostooClient::new(&config.exchange);

    if config.exchange.paper_trading {
        let quote = config
            .instruments()
            .ok()
            .and_then(|i| i.first().map(|i| i.quote.clone()))
            .unwrap_or_else(|| "USD".to_string());

        Arc::new(PaperExchange::new(
            client,
            &quote,
            config.exchange.initial_cash,
            config.risk.slippage,
            config.risk.transaction_cost,
            config.risk.min_commission,
        ))
    } else {
        Arc::new(client)
    }
}

async fn create_signal_generator(config: &Config) -> AppResult<SignalGenerator> {
    match &config.trading.strategy {
        StrategyConfig::Crossover {
            short_window,
            long_window,
        } => {
            log::info!("Using SMA crossover {}/{}", short_window, long_window);
            Ok(SignalGenerator::crossover(*short_window, *long_window))
        }
        StrategyConfig::Classifier {
            history_interval,
            history_limit,
        } => {
            let history = BinanceHistory::new(
                &config.exchange.history_url,
                config.exchange.max_retries,
                Duration::from_millis(config.exchange.retry_backoff_ms),
                Duration::from_secs(config.exchange.timeout_secs),
            );

            let mut signals = SignalGenerator::classifier(config.risk.min_profit_potential);
            for instrument in config.instruments()? {
                match train_model(&history, &instrument, history_interval, *history_limit).await {
                    Ok(model) => signals.insert_model(&instrument.pair, Box::new(model)),
                    Err(e) => log::warn!("No model for {}: {}", instrument.pair, e),
                }
            }
            Ok(signals)
        }
    }
}

/// Fit one random forest on labeled hourly history for `instrument`
async fn train_model(
    history: &BinanceHistory,
    instrument: &Instrument,
    interval: &str,
    limit: u32,
) -> AppResult<RandomForestClassifier> {
    let candles = history.get_klines(&instrument.pair, interval, limit).await?;
    let rows = label_candles(&candles)?;

    let mut model = RandomForestClassifier::default();
    model.train(&rows)?;

    log::info!(
        "Trained {} on {} candles ({} trees, max depth {})",
        instrument.pair,
        candles.len(),
        model.n_trees(),
        model.depth()
    );
    Ok(model)
}
