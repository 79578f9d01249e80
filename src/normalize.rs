use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{EventSource, PurchaseEvent};
use crate::tracker::ObservedPurchase;

pub const PURCHASE_CONFIRMED: &str = "purchase.confirmed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing orderId")]
    MissingOrderId,
    #[error("event argument `{name}` missing by name and at position {index}")]
    MissingArgument { name: &'static str, index: usize },
}

/// Inbound webhook payload. Amount and price fields accept both JSON strings
/// and numbers, the event source is not consistent about them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub buyer: String,
    #[serde(default)]
    pub token_symbol: String,
    pub token_decimals: Option<u32>,
    pub amount_token: Option<Value>,
    #[serde(rename = "pricePerTokenUSD")]
    pub price_per_token_usd: Option<Value>,
    pub paid_currency: Option<String>,
    pub paid_amount: Option<Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub explorer_tx_url: Option<String>,
}

impl WebhookPayload {
    pub fn is_purchase(&self) -> bool {
        self.event == PURCHASE_CONFIRMED
    }
}

/// Canonicalizes a validated webhook payload. The caller has already checked
/// the event type; a missing order id is rejected here.
pub fn from_webhook(
    payload: &WebhookPayload,
    now: DateTime<Utc>,
) -> Result<PurchaseEvent, NormalizeError> {
    if payload.order_id.is_empty() {
        return Err(NormalizeError::MissingOrderId);
    }
    Ok(PurchaseEvent {
        dedup_key: payload.order_id.clone(),
        buyer: payload.buyer.clone(),
        token_symbol: payload.token_symbol.clone(),
        token_decimals: payload.token_decimals.unwrap_or(18),
        amount_token_raw: value_to_string(payload.amount_token.as_ref())
            .unwrap_or_else(|| "0".to_string()),
        price_per_token_usd: value_to_decimal(payload.price_per_token_usd.as_ref()),
        paid_currency: payload.paid_currency.clone(),
        paid_amount: value_to_decimal(payload.paid_amount.as_ref()),
        timestamp: payload.timestamp.unwrap_or(now),
        explorer_tx_url: payload.explorer_tx_url.clone(),
        source: EventSource::Webhook,
    })
}

/// Decoded on-chain log arguments in declaration order, each with the name
/// the ABI gave it (possibly empty for unnamed parameters).
#[derive(Debug, Clone, Default)]
pub struct EventArgs {
    values: Vec<(String, String)>,
}

impl EventArgs {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.push((name.into(), value.into()));
    }

    /// Resolves an argument by name first, then by position. Event signatures
    /// in the wild rename and reorder arguments; an argument found by neither
    /// route is a parse error, not a silent default.
    pub fn resolve(&self, name: &'static str, index: usize) -> Result<&str, NormalizeError> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.values.get(index).map(|(_, v)| v.as_str()))
            .ok_or(NormalizeError::MissingArgument { name, index })
    }
}

/// Token metadata and link settings the log itself does not carry.
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub token_symbol: String,
    pub token_decimals: u32,
    pub explorer_base: Option<String>,
}

/// Canonicalizes a confirmed on-chain purchase. No price or fiat valuation is
/// available from the log alone, so USD/local totals stay unknown downstream.
pub fn from_chain_log(
    observed: &ObservedPurchase,
    ctx: &ChainContext,
    now: DateTime<Utc>,
) -> Result<PurchaseEvent, NormalizeError> {
    let buyer = observed.args.resolve("buyer", 0)?.to_string();
    let amount = observed.args.resolve("amountToken", 1)?.to_string();
    Ok(PurchaseEvent {
        dedup_key: observed.tx_hash.clone(),
        buyer,
        token_symbol: ctx.token_symbol.clone(),
        token_decimals: ctx.token_decimals,
        amount_token_raw: amount,
        price_per_token_usd: None,
        paid_currency: None,
        paid_amount: None,
        timestamp: now,
        explorer_tx_url: explorer_tx_url(ctx.explorer_base.as_deref(), &observed.tx_hash),
        source: EventSource::OnChain,
    })
}

pub fn explorer_tx_url(base: Option<&str>, tx_hash: &str) -> Option<String> {
    let base = base?;
    if base.is_empty() {
        return None;
    }
    let base = base.trim_end_matches('/');
    Some(format!("{base}/tx/{tx_hash}"))
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
