// src/exchange/signing.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Request parameters, kept sorted by key
pub type Params = BTreeMap<String, String>;

/// Sorted, form-url-encoded parameter string; this is both the payload that
/// gets signed and the query/body that goes on the wire.
pub fn canonical_query(params: &Params) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign(secret: &str, payload: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Authentication(format!("Invalid API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
