// src/exchange/roostoo.rs
use crate::config::ExchangeConfig;
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{Order, OrderFill, OrderStatus, Ticker};
use crate::exchange::client::{Balance, ExchangeClient, Wallet};
use crate::exchange::http::{HttpRequest, HttpTransport};
use crate::exchange::signing::{canonical_query, sign, Params};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const API_KEY_HEADER: &str = "RST-API-KEY";
const SIGNATURE_HEADER: &str = "MSG-SIGNATURE";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Signed REST client for the Roostoo mock exchange
pub struct RoostooClient {
    base_url: String,
    api_key: String,
    api_secret: String,
    transport: HttpTransport,
}

impl RoostooClient {
    pub fn new(config: &ExchangeConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            transport: HttpTransport::new(
                config.max_retries,
                Duration::from_millis(config.retry_backoff_ms),
                Duration::from_secs(config.timeout_secs),
            )
            .with_min_interval(Duration::from_millis(config.request_interval_ms)),
        }
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp_millis().to_string()
    }

    /// Unsigned GET with the parameters in the query string
    async fn public_get(&self, endpoint: &str, params: Params) -> ExchangeResult<Value> {
        let url = format!("{}{}?{}", self.base_url, endpoint, canonical_query(&params));
        let request = HttpRequest::get(url).header("Content-Type", FORM_CONTENT_TYPE);

        let text = self.transport.send(&request).await?;
        parse_envelope(&text)
    }

    /// Signed request: GET carries the payload as query, POST as form body
    async fn signed(&self, method: hyper::Method, endpoint: &str, params: Params) -> ExchangeResult<Value> {
        let payload = canonical_query(&params);
        let signature = sign(&self.api_secret, &payload)?;

        let request = if method == hyper::Method::POST {
            HttpRequest::post(format!("{}{}", self.base_url, endpoint), payload)
        } else {
            HttpRequest::get(format!("{}{}?{}", self.base_url, endpoint, payload))
        }
        .header("Content-Type", FORM_CONTENT_TYPE)
        .header(API_KEY_HEADER, self.api_key.clone())
        .header(SIGNATURE_HEADER, signature);

        let text = self.transport.send(&request).await?;
        parse_envelope(&text)
    }
}

#[async_trait]
impl ExchangeClient for RoostooClient {
    async fn get_ticker(&self, pair: &str) -> ExchangeResult<Ticker> {
        let mut params = Params::new();
        params.insert("pair".to_string(), pair.to_string());
        params.insert("timestamp".to_string(), Self::timestamp());

        let value = self.public_get("/v3/ticker", params).await?;
        parse_tickers(&value)?
            .remove(pair)
            .ok_or_else(|| ExchangeError::InvalidSymbol(format!("No ticker returned for {}", pair)))
    }

    async fn get_all_tickers(&self) -> ExchangeResult<HashMap<String, Ticker>> {
        let mut params = Params::new();
        params.insert("timestamp".to_string(), Self::timestamp());

        let value = self.public_get("/v3/ticker", params).await?;
        parse_tickers(&value)
    }

    async fn get_balance(&self) -> ExchangeResult<Wallet> {
        let mut params = Params::new();
        params.insert("timestamp".to_string(), Self::timestamp());

        let value = self.signed(hyper::Method::GET, "/v3/balance", params).await?;
        parse_wallet(&value)
    }

    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderFill> {
        let mut params = Params::new();
        params.insert("pair".to_string(), order.pair.clone());
        params.insert("side".to_string(), order.side.as_str().to_string());
        params.insert("type".to_string(), order.order_type.to_string());
        params.insert("quantity".to_string(), order.quantity_str());
        params.insert("timestamp".to_string(), Self::timestamp());

        log::debug!("Placing {} {} {}", order.side, order.quantity_str(), order.pair);
        let value = self.signed(hyper::Method::POST, "/v3/place_order", params).await?;
        parse_order_fill(&value, order)
    }
}

/// Parse JSON and turn `Success: false` into an error
pub fn parse_envelope(text: &str) -> ExchangeResult<Value> {
    if text.trim().is_empty() {
        return Err(ExchangeError::Malformed("Empty response".to_string()));
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| ExchangeError::Malformed(format!("Invalid JSON ({}): {}", e, text)))?;

    if value["Success"].as_bool() != Some(true) {
        let message = value["ErrMsg"]
            .as_str()
            .or_else(|| value["Error"].as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or("request unsuccessful");
        return Err(ExchangeError::Api(message.to_string()));
    }

    Ok(value)
}

/// Read a number that may arrive as a JSON number or a string
fn decimal_value(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn decimal_field(v: &Value, key: &str) -> ExchangeResult<Decimal> {
    decimal_value(&v[key])
        .ok_or_else(|| ExchangeError::Malformed(format!("Missing or invalid {}", key)))
}

pub fn parse_tickers(value: &Value) -> ExchangeResult<HashMap<String, Ticker>> {
    let data = value["Data"]
        .as_object()
        .ok_or_else(|| ExchangeError::Malformed("Missing ticker Data".to_string()))?;
    let server_time = value["ServerTime"].as_i64().unwrap_or_default();

    let mut tickers = HashMap::with_capacity(data.len());
    for (pair, entry) in data {
        let last_price = match decimal_field(entry, "LastPrice") {
            Ok(price) => price,
            Err(e) => {
                log::warn!("Skipping ticker for {}: {}", pair, e);
                continue;
            }
        };

        tickers.insert(
            pair.clone(),
            Ticker {
                pair: pair.clone(),
                last_price,
                bid_price: decimal_value(&entry["MaxBid"]),
                ask_price: decimal_value(&entry["MinAsk"]),
                timestamp: server_time,
            },
        );
    }

    Ok(tickers)
}

pub fn parse_wallet(value: &Value) -> ExchangeResult<Wallet> {
    let wallet = value
        .get("Wallet")
        .or_else(|| value.get("SpotWallet"))
        .and_then(Value::as_object)
        .ok_or_else(|| ExchangeError::Malformed("Missing Wallet".to_string()))?;

    let mut balances = Vec::with_capacity(wallet.len());
    for (asset, entry) in wallet {
        let free = decimal_field(entry, "Free")?;
        let locked = decimal_value(&entry["Lock"]).unwrap_or(Decimal::ZERO);
        balances.push(Balance::new(asset, free, locked));
    }

    Ok(Wallet::new(balances))
}

pub fn parse_order_fill(value: &Value, order: &Order) -> ExchangeResult<OrderFill> {
    let detail = &value["OrderDetail"];
    if !detail.is_object() {
        return Err(ExchangeError::Malformed("Missing OrderDetail".to_string()));
    }

    let status = detail["Status"]
        .as_str()
        .map(OrderStatus::parse)
        .unwrap_or(OrderStatus::Filled);

    Ok(OrderFill {
        order_id: match &detail["OrderID"] {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        },
        pair: order.pair.clone(),
        side: order.side,
        status,
        filled_price: decimal_field(detail, "FilledAverPrice")?,
        filled_quantity: decimal_field(detail, "FilledQuantity")?,
        timestamp: detail["FinishTimestamp"]
            .as_i64()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    })
}
