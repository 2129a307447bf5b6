//! M-Pesa push-payment client
//!
//! The payment API answers with a JSON body carrying a `code`. Only `200`
//! means the prompt went out; anything else, including a transport or decode
//! failure, is reported as code 500 and treated as "not sent".

use crate::domain::types::Plate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Code reported when the push API could not be reached or parsed
pub const PUSH_FAILED_CODE: i64 = 500;

/// Result of a push-payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushOutcome {
    #[serde(default = "failed_code")]
    pub code: i64,
}

fn failed_code() -> i64 {
    PUSH_FAILED_CODE
}

impl PushOutcome {
    pub fn failed() -> Self {
        Self { code: PUSH_FAILED_CODE }
    }

    pub fn is_sent(&self) -> bool {
        self.code == 200
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the payment provider to push a prompt to `phone` for `plate`
    async fn initiate_push(&self, plate: &Plate, phone: &str) -> PushOutcome;
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    carno: &'a str,
    phone: &'a str,
}

/// HTTP client for the push-payment endpoint
pub struct MpesaPushClient {
    url: String,
    http_client: reqwest::Client,
}

impl MpesaPushClient {
    pub fn new(url: &str, timeout_ms: u64) -> reqwest::Result<Self> {
        // Create HTTP client once for reuse (connection pooling)
        let http_client =
            reqwest::Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
        Ok(Self { url: url.to_string(), http_client })
    }
}

#[async_trait]
impl PaymentGateway for MpesaPushClient {
    async fn initiate_push(&self, plate: &Plate, phone: &str) -> PushOutcome {
        let start = Instant::now();
        let body = PushRequest { carno: plate.as_str(), phone };

        let response = match self.http_client.post(&self.url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(plate = %plate, error = %e, "payment_push_failed");
                return PushOutcome::failed();
            }
        };

        let status = response.status();
        match response.json::<PushOutcome>().await {
            Ok(outcome) => {
                info!(
                    plate = %plate,
                    phone = %phone,
                    http_status = %status.as_u16(),
                    code = %outcome.code,
                    latency_ms = %start.elapsed().as_millis(),
                    "payment_push_response"
                );
                outcome
            }
            Err(e) => {
                error!(plate = %plate, http_status = %status.as_u16(), error = %e, "payment_push_decode_failed");
                PushOutcome::failed()
            }
        }
    }
}
