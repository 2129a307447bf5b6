//! Shared types for the parking gateway

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Inbound channel a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ussd,
    WhatsApp,
    Ivr,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ussd => "ussd",
            Channel::WhatsApp => "whatsapp",
            Channel::Ivr => "ivr",
        }
    }
}

/// Parking operator that owns a vehicle record
///
/// `A` is the default store; `B` is the partner store that only answers fee lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    A,
    B,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::A => "operator_a",
            Operator::B => "operator_b",
        }
    }
}

/// Newtype wrapper for a normalized vehicle registration number
///
/// Normalized plates are upper-case with all whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Plate(String);

impl Plate {
    /// Normalize raw user text into a plate, `None` if nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        let plate: String =
            raw.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_uppercase).collect();
        if plate.is_empty() {
            None
        } else {
            Some(Self(plate))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Plate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for store transaction IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TransactionId(pub i64);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The slice of a store transaction the gateway reads
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTransaction {
    pub id: TransactionId,
    pub plate: Plate,
    /// Naive local time the vehicle entered
    pub entry_time: NaiveDateTime,
}

/// Per-request input, derived once from the channel payload and never persisted
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub channel: Channel,
    pub raw_text: String,
    /// Caller phone without a leading `+`
    pub phone: String,
}

impl SessionInput {
    pub fn new(channel: Channel, raw_text: impl Into<String>, phone: &str) -> Self {
        Self { channel, raw_text: raw_text.into(), phone: normalize_phone(phone) }
    }
}

/// Strip surrounding whitespace and a leading `+` from a phone number
pub fn normalize_phone(raw: &str) -> String {
    raw.trim().trim_start_matches('+').to_string()
}

/// What a payment request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentTarget {
    /// Plate typed by the caller (USSD, WhatsApp)
    Plate(Plate),
    /// 1-based choice from the caller's linked vehicles (IVR)
    Choice(u32),
}

/// Router output: where an input string lands in the menu tree or command grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ShowWelcomeMenu,
    ShowPayPrompt,
    InitiatePayment {
        target: PaymentTarget,
        /// Destination phone override for the push (WhatsApp `pay <plate> <phone>`)
        pay_to: Option<String>,
    },
    ShowAmountPrompt,
    ComputeAmount {
        plate: Plate,
        operator: Operator,
    },
    ShowDurationPrompt,
    ComputeDuration {
        plate: Plate,
    },
    ShowTerms,
    Invalid,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ShowWelcomeMenu => "show_welcome_menu",
            Intent::ShowPayPrompt => "show_pay_prompt",
            Intent::InitiatePayment { .. } => "initiate_payment",
            Intent::ShowAmountPrompt => "show_amount_prompt",
            Intent::ComputeAmount { .. } => "compute_amount",
            Intent::ShowDurationPrompt => "show_duration_prompt",
            Intent::ComputeDuration { .. } => "compute_duration",
            Intent::ShowTerms => "show_terms",
            Intent::Invalid => "invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_parse_normalizes() {
        assert_eq!(Plate::parse(" kca 123x ").unwrap().as_str(), "KCA123X");
        assert_eq!(Plate::parse("KBZ\t001A").unwrap().to_string(), "KBZ001A");
        assert!(Plate::parse("   ").is_none());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+254712345678"), "254712345678");
        assert_eq!(normalize_phone(" 0712345678 "), "0712345678");
    }

    #[test]
    fn test_session_input_strips_plus() {
        let input = SessionInput::new(Channel::Ussd, "98", "+254700000001");
        assert_eq!(input.phone, "254700000001");
        assert_eq!(input.channel.as_str(), "ussd");
    }
}
