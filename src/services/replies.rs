//! Caller-facing reply texts
//!
//! Texts are channel-neutral; USSD adds its `CON`/`END` prefix, WhatsApp sends
//! them as-is, IVR speaks them.

use crate::domain::error::{GuardedAction, ParkingError};
use crate::domain::format::{format_amount, humanize};
use crate::domain::types::Plate;
use crate::infra::config::Branding;

pub const ENTER_PLATE: &str = "Enter your Plate Number";
pub const VEHICLE_NOT_FOUND: &str = "Vehicle not found!";
pub const TRY_AGAIN: &str = "An error occurred. Please try again.";
pub const INVALID_CODE: &str = "Invalid code entered";
pub const IVR_NO_VEHICLES: &str = "No vehicles linked to your number. Use USSD to pay. Goodbye.";
pub const IVR_FREE_TIME: &str = "You are within free parking time. No payment needed.";
pub const IVR_INVALID_SELECTION: &str = "Invalid selection.";
pub const IVR_INVALID_INPUT: &str = "Invalid input.";

/// USSD reply: `CON` keeps the session open, `END` closes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UssdReply {
    Continue(String),
    End(String),
}

impl std::fmt::Display for UssdReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UssdReply::Continue(text) => write!(f, "CON {text}"),
            UssdReply::End(text) => write!(f, "END {text}"),
        }
    }
}

/// IVR turn: either a keypad menu or a final announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IvrReply {
    Menu { prompts: Vec<String> },
    Hangup(String),
}

pub fn welcome(branding: &Branding) -> String {
    format!(
        "Welcome to {} USSD!\n\
         By paying with USSD you agree with below terms\n\
         1. Pay for Parking\n\
         2. Check Amount Due\n\
         3. Check Time Stayed\n\
         4. Terms & Conditions\n\
         Note: Vehicles managed by {} (external) only support Amount checks via option 2.",
        branding.service_name, branding.operator_b_name
    )
}

pub fn payment_sent(branding: &Branding) -> String {
    format!(
        "Thank You for using {} parking. You will receive an M-Pesa prompt shortly.",
        branding.operator_a_possessive
    )
}

pub fn within_free_period(free_minutes: u64, remaining: u64) -> String {
    format!("You are within free {free_minutes} mins. {remaining} mins left to exit free.")
}

pub fn amount_due(currency: &str, amount: u64) -> String {
    if amount == 0 {
        "No charge. Within free time.".to_string()
    } else {
        format!("Amount due: {}", format_amount(currency, amount))
    }
}

/// Operator B amounts name the plate, since the caller did not see an entry time
pub fn partner_amount_due(currency: &str, plate: &Plate, amount: u64) -> String {
    if amount == 0 {
        format!("No charge for {plate}. Within free time.")
    } else {
        format!("Your amount due for {plate} is {}", format_amount(currency, amount))
    }
}

pub fn stayed_for(minutes: u64) -> String {
    format!("Stayed for: {}", humanize(minutes))
}

pub fn whatsapp_stayed_for(minutes: u64) -> String {
    format!("You have stayed for: {}", humanize(minutes))
}

pub fn refusal(branding: &Branding, action: GuardedAction) -> String {
    let b = &branding.operator_b_name;
    match action {
        GuardedAction::Payment => {
            format!("This vehicle is managed by {b}. Payments must be made via {b} services.")
        }
        GuardedAction::Duration => {
            format!("Time checks are not available for {b}-managed vehicles. Please contact {b}.")
        }
        GuardedAction::DualOwnership => format!(
            "This vehicle is registered with both {} and {b}. Please contact the parking office.",
            branding.operator_a_name
        ),
    }
}

/// Sanitized text for a failed request; upstream detail never reaches the caller
pub fn error_text(branding: &Branding, err: &ParkingError) -> String {
    match err {
        ParkingError::NotFound(_) => VEHICLE_NOT_FOUND.to_string(),
        ParkingError::CrossOperatorConflict { action, .. } => refusal(branding, *action),
        ParkingError::Upstream { .. } => TRY_AGAIN.to_string(),
        ParkingError::MalformedInput(_) => INVALID_CODE.to_string(),
    }
}

pub fn ivr_welcome(branding: &Branding) -> String {
    format!("Welcome to {} Parking Payment. Select your vehicle.", branding.operator_a_name)
}

pub fn ivr_option(plate: &Plate, digit: usize) -> String {
    format!("For {plate}, press {digit}.")
}

pub fn ivr_payment_sent(plate: &Plate) -> String {
    format!("Payment request sent for {plate}. Check your phone for M-Pesa prompt. Thank you!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ussd_prefixes() {
        assert_eq!(UssdReply::Continue(ENTER_PLATE.to_string()).to_string(), "CON Enter your Plate Number");
        assert_eq!(UssdReply::End(VEHICLE_NOT_FOUND.to_string()).to_string(), "END Vehicle not found!");
    }

    #[test]
    fn test_welcome_names_operators() {
        let text = welcome(&Branding::default());
        assert!(text.starts_with("Welcome to SyfePark USSD!\n"));
        assert!(text.ends_with("Note: Vehicles managed by RNG (external) only support Amount checks via option 2."));
    }

    #[test]
    fn test_amount_texts() {
        assert_eq!(amount_due("KES", 0), "No charge. Within free time.");
        assert_eq!(amount_due("KES", 150), "Amount due: KES 150");
        let plate = Plate::parse("KCA123X").unwrap();
        assert_eq!(partner_amount_due("KES", &plate, 0), "No charge for KCA123X. Within free time.");
        assert_eq!(partner_amount_due("KES", &plate, 200), "Your amount due for KCA123X is KES 200");
    }

    #[test]
    fn test_upstream_detail_is_hidden() {
        let err = ParkingError::upstream("operator_a_store", "password authentication failed");
        assert_eq!(error_text(&Branding::default(), &err), TRY_AGAIN);
    }

    #[test]
    fn test_refusals() {
        let branding = Branding::default();
        assert_eq!(
            refusal(&branding, GuardedAction::Payment),
            "This vehicle is managed by RNG. Payments must be made via RNG services."
        );
        assert_eq!(
            refusal(&branding, GuardedAction::Duration),
            "Time checks are not available for RNG-managed vehicles. Please contact RNG."
        );
    }
}
