//! Operator B fee lookup
//!
//! Operator B computes its own fees. The gateway asks with one remote call,
//! `GET {fee_url}?plate=<PLATE>`, answered with `{"amount": <n> | null}`.
//! A null or missing amount means nothing is due.

use crate::domain::types::Plate;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FeeLookupError {
    #[error("fee lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("fee lookup returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait OperatorFeeLookup: Send + Sync {
    /// Amount currently due for a plate in the partner's system
    async fn fee_due(&self, plate: &Plate) -> Result<u64, FeeLookupError>;
}

#[derive(Debug, Deserialize)]
struct FeeResponse {
    #[serde(default)]
    amount: Option<f64>,
}

impl FeeResponse {
    fn amount_due(&self) -> u64 {
        match self.amount {
            Some(amount) if amount.is_finite() && amount > 0.0 => amount.trunc() as u64,
            _ => 0,
        }
    }
}

pub struct HttpFeeLookup {
    url: String,
    http_client: reqwest::Client,
}

impl HttpFeeLookup {
    pub fn new(url: &str, timeout_ms: u64) -> reqwest::Result<Self> {
        let http_client =
            reqwest::Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
        Ok(Self { url: url.to_string(), http_client })
    }
}

#[async_trait]
impl OperatorFeeLookup for HttpFeeLookup {
    async fn fee_due(&self, plate: &Plate) -> Result<u64, FeeLookupError> {
        let response =
            self.http_client.get(&self.url).query(&[("plate", plate.as_str())]).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeeLookupError::Status(status.as_u16()));
        }
        let body: FeeResponse = response.json().await?;
        let amount = body.amount_due();
        debug!(plate = %plate, amount = %amount, "operator_b_fee_lookup");
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount_of(json: &str) -> u64 {
        serde_json::from_str::<FeeResponse>(json).unwrap().amount_due()
    }

    #[test]
    fn test_amount_defaults_to_zero() {
        assert_eq!(amount_of(r#"{"amount":150}"#), 150);
        assert_eq!(amount_of(r#"{"amount":99.0}"#), 99);
        assert_eq!(amount_of(r#"{"amount":null}"#), 0);
        assert_eq!(amount_of(r#"{}"#), 0);
        assert_eq!(amount_of(r#"{"amount":-5}"#), 0);
    }
}
