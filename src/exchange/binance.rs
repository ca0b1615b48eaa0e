// src/exchange/binance.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::Candlestick;
use crate::exchange::client::HistoryProvider;
use crate::exchange::http::{HttpRequest, HttpTransport};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

const VALID_INTERVALS: [&str; 15] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Binance's per-request kline cap
const MAX_KLINES: u32 = 1000;

/// Public Binance klines, used as training history
pub struct BinanceHistory {
    base_url: String,
    transport: HttpTransport,
}

impl BinanceHistory {
    pub fn new(base_url: &str, max_retries: u32, backoff: Duration, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport: HttpTransport::new(max_retries, backoff, timeout),
        }
    }

    /// "BTC/USD" -> "BTCUSDT"; USD-quoted pairs are looked up against USDT
    pub fn market_symbol(pair: &str) -> String {
        match pair.split_once('/') {
            Some((base, "USD")) => format!("{}USDT", base),
            Some((base, quote)) => format!("{}{}", base, quote),
            None => pair.to_string(),
        }
    }

    /// Convert Binance kline to our candlestick format
    fn convert_kline_to_candlestick(
        symbol: &str,
        interval: &str,
        kline: &Value,
    ) -> ExchangeResult<Candlestick> {
        let arr = kline
            .as_array()
            .ok_or_else(|| ExchangeError::Malformed("Invalid kline format, expected array".to_string()))?;

        if arr.len() < 7 {
            return Err(ExchangeError::Malformed("Invalid kline format".to_string()));
        }

        let parse_decimal = |v: &Value, what: &str| -> ExchangeResult<Decimal> {
            v.as_str()
                .and_then(|s| Decimal::from_str(s).ok())
                .ok_or_else(|| ExchangeError::Malformed(format!("Invalid {} in kline", what)))
        };

        let open_time = arr[0]
            .as_i64()
            .ok_or_else(|| ExchangeError::Malformed("Invalid open time in kline".to_string()))?;
        let close_time = arr[6]
            .as_i64()
            .ok_or_else(|| ExchangeError::Malformed("Invalid close time in kline".to_string()))?;

        Ok(Candlestick {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            open_time,
            close_time,
            open: parse_decimal(&arr[1], "open price")?,
            high: parse_decimal(&arr[2], "high price")?,
            low: parse_decimal(&arr[3], "low price")?,
            close: parse_decimal(&arr[4], "close price")?,
            volume: parse_decimal(&arr[5], "volume")?,
        })
    }

    pub fn parse_klines(symbol: &str, interval: &str, text: &str) -> ExchangeResult<Vec<Candlestick>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ExchangeError::Malformed(format!("Failed to parse klines: {}", e)))?;

        if let Some(msg) = value["msg"].as_str() {
            return Err(ExchangeError::Api(msg.to_string()));
        }

        value
            .as_array()
            .ok_or_else(|| ExchangeError::Malformed("Klines response is not an array".to_string()))?
            .iter()
            .map(|kline| Self::convert_kline_to_candlestick(symbol, interval, kline))
            .collect()
    }
}

#[async_trait]
impl HistoryProvider for BinanceHistory {
    async fn get_klines(
        &self,
        pair: &str,
        interval: &str,
        limit: u32,
    ) -> ExchangeResult<Vec<Candlestick>> {
        if !VALID_INTERVALS.contains(&interval) {
            return Err(ExchangeError::Request(format!("Invalid interval: {}", interval)));
        }

        let symbol = Self::market_symbol(pair);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.clamp(1, MAX_KLINES)
        );

        let text = self.transport.send(&HttpRequest::get(url)).await?;
        let candles = Self::parse_klines(&symbol, interval, &text)?;
        log::debug!("Fetched {} {} klines for {}", candles.len(), interval, symbol);
        Ok(candles)
    }
}
