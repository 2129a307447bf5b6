//! WhatsApp delivery through the Infobip API
//!
//! Replies to WhatsApp commands are not carried by the webhook response; they
//! go out here as separate messages. Sends are best-effort.

use crate::domain::types::Plate;
use crate::infra::config::WhatsAppConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification rejected with status {0}")]
    Status(u16),
}

/// Placeholders for the "payment prompt sent" template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPrompt {
    pub amount: u64,
    pub pay_phone: String,
    pub plate: Plate,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Free-form text reply
    async fn send_text(&self, to: &str, text: &str) -> Result<(), NotifyError>;

    /// Template confirming that a payment prompt was pushed
    async fn send_payment_prompt(&self, to: &str, prompt: &PaymentPrompt) -> Result<(), NotifyError>;
}

/// Notifier used when WhatsApp delivery is switched off
#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        debug!(to = %to, text = %text, "whatsapp_disabled_text_dropped");
        Ok(())
    }

    async fn send_payment_prompt(&self, to: &str, prompt: &PaymentPrompt) -> Result<(), NotifyError> {
        debug!(to = %to, plate = %prompt.plate, "whatsapp_disabled_template_dropped");
        Ok(())
    }
}

pub struct InfobipNotifier {
    base_url: String,
    api_key: String,
    sender: String,
    template_name: String,
    language: String,
    header_image_url: String,
    http_client: reqwest::Client,
}

impl InfobipNotifier {
    pub fn new(config: &WhatsAppConfig) -> reqwest::Result<Self> {
        let http_client =
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms)).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sender: config.sender.clone(),
            template_name: config.template_name.clone(),
            language: config.language.clone(),
            header_image_url: config.header_image_url.clone(),
            http_client,
        })
    }

    fn template_payload(&self, to: &str, prompt: &PaymentPrompt) -> serde_json::Value {
        json!({
            "messages": [{
                "from": self.sender,
                "to": to,
                "content": {
                    "templateName": self.template_name,
                    "templateData": {
                        "body": {
                            "placeholders": [
                                prompt.amount.to_string(),
                                prompt.pay_phone,
                                prompt.plate.as_str(),
                            ]
                        },
                        "header": { "type": "IMAGE", "mediaUrl": self.header_image_url }
                    },
                    "language": self.language
                }
            }]
        })
    }

    fn text_payload(&self, to: &str, text: &str) -> serde_json::Value {
        json!({
            "from": self.sender,
            "to": to,
            "content": { "text": text }
        })
    }

    async fn post(&self, path: &str, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("App {}", self.api_key))
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for InfobipNotifier {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        self.post("/whatsapp/1/message/text", &self.text_payload(to, text)).await?;
        info!(to = %to, "whatsapp_text_sent");
        Ok(())
    }

    async fn send_payment_prompt(&self, to: &str, prompt: &PaymentPrompt) -> Result<(), NotifyError> {
        self.post("/whatsapp/1/message/template", &self.template_payload(to, prompt)).await?;
        info!(to = %to, plate = %prompt.plate, template = %self.template_name, "whatsapp_template_sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> InfobipNotifier {
        let config = WhatsAppConfig {
            enabled: true,
            base_url: "https://example.api.infobip.com/".to_string(),
            api_key: "secret".to_string(),
            sender: "12039414790".to_string(),
            ..WhatsAppConfig::default()
        };
        InfobipNotifier::new(&config).unwrap()
    }

    #[test]
    fn test_template_payload_shape() {
        let n = notifier();
        let prompt = PaymentPrompt {
            amount: 50,
            pay_phone: "254712345678".to_string(),
            plate: Plate::parse("KCA123X").unwrap(),
        };
        let payload = n.template_payload("254700000001", &prompt);
        let message = &payload["messages"][0];
        assert_eq!(message["from"], "12039414790");
        assert_eq!(message["to"], "254700000001");
        assert_eq!(message["content"]["templateName"], "ridgewayspushpayment");
        assert_eq!(message["content"]["language"], "en_GB");
        assert_eq!(
            message["content"]["templateData"]["body"]["placeholders"],
            json!(["50", "254712345678", "KCA123X"])
        );
        assert_eq!(message["content"]["templateData"]["header"]["type"], "IMAGE");
        assert_eq!(n.base_url, "https://example.api.infobip.com");
    }

    #[test]
    fn test_text_payload_shape() {
        let payload = notifier().text_payload("254700000001", "Amount due: KES 100");
        assert_eq!(payload["content"]["text"], "Amount due: KES 100");
        assert_eq!(payload["to"], "254700000001");
    }
}
