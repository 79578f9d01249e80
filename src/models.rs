use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    Webhook,
    OnChain,
}

/// Canonical purchase record produced by both ingestion paths and consumed
/// uniformly by the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    /// Order id for webhook events, transaction hash for on-chain events.
    /// Never empty.
    pub dedup_key: String,
    pub buyer: String,
    pub token_symbol: String,
    pub token_decimals: u32,
    /// Smallest-unit token amount as a decimal string.
    pub amount_token_raw: String,
    pub price_per_token_usd: Option<Decimal>,
    pub paid_currency: Option<String>,
    pub paid_amount: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub explorer_tx_url: Option<String>,
    pub source: EventSource,
}

impl PurchaseEvent {
    /// Human-readable token amount ("1.2345"), computed without floats.
    pub fn display_amount(&self) -> String {
        format::to_display_amount(&self.amount_token_raw, self.token_decimals)
    }

    /// Estimated USD value. Prefers `amount * price_per_token_usd`; falls
    /// back to a direct USD paid amount; otherwise unknown.
    pub fn usd_total(&self) -> Option<Decimal> {
        if let Some(price) = self.price_per_token_usd {
            let amount = Decimal::from_str(&self.display_amount()).ok()?;
            return amount.checked_mul(price);
        }
        if self.paid_currency.as_deref() == Some("USD") {
            return self.paid_amount;
        }
        None
    }

    /// USD total converted at the configured rate, rounded to a whole unit.
    pub fn local_total(&self, usd_to_local_rate: Decimal) -> Option<Decimal> {
        let usd = self.usd_total()?;
        let local = usd.checked_mul(usd_to_local_rate)?;
        Some(local.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn is_whale(&self, threshold: Decimal) -> bool {
        self.usd_total().map_or(false, |usd| usd >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> PurchaseEvent {
        PurchaseEvent {
            dedup_key: "ORDER-1".into(),
            buyer: "0xBEEFCAFE00112233".into(),
            token_symbol: "TOKEN".into(),
            token_decimals: 18,
            amount_token_raw: "1234500000000000000".into(),
            price_per_token_usd: None,
            paid_currency: None,
            paid_amount: None,
            timestamp: Utc::now(),
            explorer_tx_url: None,
            source: EventSource::Webhook,
        }
    }

    #[test]
    fn usd_total_from_price() {
        let mut e = event();
        e.price_per_token_usd = Some(Decimal::from_str("0.2").unwrap());
        assert_eq!(e.usd_total(), Some(Decimal::from_str("0.2469").unwrap()));
        assert!(!e.is_whale(Decimal::from(10_000)));
    }

    #[test]
    fn usd_total_falls_back_to_paid_usd() {
        let mut e = event();
        e.paid_currency = Some("USD".into());
        e.paid_amount = Some(Decimal::from(42));
        assert_eq!(e.usd_total(), Some(Decimal::from(42)));
    }

    #[test]
    fn usd_total_unknown_for_non_usd_fiat() {
        let mut e = event();
        e.paid_currency = Some("EUR".into());
        e.paid_amount = Some(Decimal::from(42));
        assert_eq!(e.usd_total(), None);
        assert!(!e.is_whale(Decimal::ZERO));
    }

    #[test]
    fn price_beats_paid_amount() {
        let mut e = event();
        e.price_per_token_usd = Some(Decimal::from(10_000));
        e.paid_currency = Some("USD".into());
        e.paid_amount = Some(Decimal::ONE);
        assert_eq!(e.usd_total(), Some(Decimal::from_str("12345").unwrap()));
        assert!(e.is_whale(Decimal::from(10_000)));
    }

    #[test]
    fn local_total_rounds_to_whole_units() {
        let mut e = event();
        e.price_per_token_usd = Some(Decimal::from_str("0.2").unwrap());
        // 0.2469 * 15500 = 3826.95 -> 3827
        assert_eq!(
            e.local_total(Decimal::from(15_500)),
            Some(Decimal::from(3827))
        );
    }
}
