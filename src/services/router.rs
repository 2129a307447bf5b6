//! Session-less menu/command router
//!
//! Maps a raw channel input to an [`Intent`]. Nothing is retained between
//! requests: a USSD gateway resends the whole path typed so far, WhatsApp
//! messages are parsed one at a time, and an IVR turn either has a digit or not.

use crate::domain::types::{normalize_phone, Channel, Intent, Operator, PaymentTarget, Plate};
use regex::Regex;

/// Shortest digit string accepted as a phone override in `pay <plate> <phone>`
const MIN_PHONE_DIGITS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Welcome,
    PayPrompt,
    Pay,
    AmountPrompt,
    Amount(Operator),
    DurationPrompt,
    Duration,
    Terms,
}

#[derive(Debug)]
struct Route {
    pattern: Regex,
    kind: RouteKind,
}

/// Ordered USSD pattern table, compiled once at startup
#[derive(Debug)]
pub struct RoutingTable {
    sentinel: String,
    routes: Vec<Route>,
}

impl RoutingTable {
    /// Build the table for a USSD service code such as `98`
    pub fn ussd(sentinel: &str) -> Result<Self, regex::Error> {
        let s = regex::escape(sentinel);
        let arg = r"([^*#]+)";
        let table = [
            (format!(r"^{s}$"), RouteKind::Welcome),
            (format!(r"^{s}\*1$"), RouteKind::PayPrompt),
            (format!(r"^{s}\*1\*{arg}$"), RouteKind::Pay),
            (format!(r"^{s}\*2$"), RouteKind::AmountPrompt),
            (format!(r"^{s}\*2\*{arg}$"), RouteKind::Amount(Operator::A)),
            (format!(r"^{s}\*3$"), RouteKind::DurationPrompt),
            (format!(r"^{s}\*3\*{arg}$"), RouteKind::Duration),
            (format!(r"^{s}\*4$"), RouteKind::Terms),
            (format!(r"^{s}\*9\*2\*{arg}$"), RouteKind::Amount(Operator::B)),
        ];

        let routes = table
            .into_iter()
            .map(|(pattern, kind)| Ok(Route { pattern: Regex::new(&pattern)?, kind }))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { sentinel: sentinel.to_string(), routes })
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Resolve an already-normalized USSD path
    fn resolve(&self, text: &str) -> Intent {
        for route in &self.routes {
            let Some(caps) = route.pattern.captures(text) else {
                continue;
            };
            let plate = caps.get(1).and_then(|m| Plate::parse(m.as_str()));
            return match (route.kind, plate) {
                (RouteKind::Welcome, _) => Intent::ShowWelcomeMenu,
                (RouteKind::PayPrompt, _) => Intent::ShowPayPrompt,
                (RouteKind::AmountPrompt, _) => Intent::ShowAmountPrompt,
                (RouteKind::DurationPrompt, _) => Intent::ShowDurationPrompt,
                (RouteKind::Terms, _) => Intent::ShowTerms,
                (RouteKind::Pay, Some(plate)) => {
                    Intent::InitiatePayment { target: PaymentTarget::Plate(plate), pay_to: None }
                }
                (RouteKind::Amount(operator), Some(plate)) => {
                    Intent::ComputeAmount { plate, operator }
                }
                (RouteKind::Duration, Some(plate)) => Intent::ComputeDuration { plate },
                (_, None) => Intent::Invalid,
            };
        }
        Intent::Invalid
    }
}

/// Normalize a USSD string: drop spaces, one trailing `#`, surrounding whitespace
pub fn normalize_ussd(raw: &str) -> String {
    let compact = raw.replace(' ', "");
    let compact = compact.strip_suffix('#').unwrap_or(&compact);
    compact.trim().to_string()
}

/// Stateless resolver shared by all request handlers
#[derive(Debug)]
pub struct Router {
    ussd: RoutingTable,
}

impl Router {
    pub fn new(table: RoutingTable) -> Self {
        Self { ussd: table }
    }

    pub fn ussd_table(&self) -> &RoutingTable {
        &self.ussd
    }

    /// Classify `raw_text` received on `channel`
    pub fn resolve(&self, channel: Channel, raw_text: &str) -> Intent {
        match channel {
            Channel::Ussd => self.ussd.resolve(&normalize_ussd(raw_text)),
            Channel::WhatsApp => resolve_whatsapp(raw_text),
            Channel::Ivr => resolve_ivr(raw_text),
        }
    }
}

/// `time <plate>`, `amount <plate>`, `pay <plate> [phone]`
fn resolve_whatsapp(text: &str) -> Intent {
    let words: Vec<&str> = text.split_whitespace().collect();
    let [command, rest @ ..] = words.as_slice() else {
        return Intent::Invalid;
    };
    if rest.is_empty() {
        return Intent::Invalid;
    }

    match command.to_lowercase().as_str() {
        "time" => match Plate::parse(&rest.concat()) {
            Some(plate) => Intent::ComputeDuration { plate },
            None => Intent::Invalid,
        },
        "amount" => match Plate::parse(&rest.concat()) {
            Some(plate) => Intent::ComputeAmount { plate, operator: Operator::A },
            None => Intent::Invalid,
        },
        "pay" => {
            let (plate_words, pay_to) = match rest.split_last() {
                Some((last, head)) if !head.is_empty() && is_phone_shaped(last) => {
                    (head, Some(normalize_phone(last)))
                }
                _ => (rest, None),
            };
            match Plate::parse(&plate_words.concat()) {
                Some(plate) => {
                    Intent::InitiatePayment { target: PaymentTarget::Plate(plate), pay_to }
                }
                None => Intent::Invalid,
            }
        }
        _ => Intent::Invalid,
    }
}

fn is_phone_shaped(word: &str) -> bool {
    let digits = word.strip_prefix('+').unwrap_or(word);
    digits.len() >= MIN_PHONE_DIGITS && digits.bytes().all(|b| b.is_ascii_digit())
}

/// No digit: list vehicles. A digit: pick the vehicle at that 1-based position.
fn resolve_ivr(digits: &str) -> Intent {
    let digits = digits.trim();
    if digits.is_empty() {
        return Intent::ShowPayPrompt;
    }
    match digits.parse::<u32>() {
        Ok(choice) => Intent::InitiatePayment { target: PaymentTarget::Choice(choice), pay_to: None },
        Err(_) => Intent::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(RoutingTable::ussd("98").unwrap())
    }

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    #[test]
    fn test_ussd_menu_paths() {
        let r = router();
        assert_eq!(r.resolve(Channel::Ussd, "98"), Intent::ShowWelcomeMenu);
        assert_eq!(r.resolve(Channel::Ussd, "98*1"), Intent::ShowPayPrompt);
        assert_eq!(r.resolve(Channel::Ussd, "98*2"), Intent::ShowAmountPrompt);
        assert_eq!(r.resolve(Channel::Ussd, "98*3"), Intent::ShowDurationPrompt);
        assert_eq!(r.resolve(Channel::Ussd, "98*4"), Intent::ShowTerms);
    }

    #[test]
    fn test_ussd_captures_plate() {
        let r = router();
        assert_eq!(
            r.resolve(Channel::Ussd, "98*1*kca 123x#"),
            Intent::InitiatePayment { target: PaymentTarget::Plate(plate("KCA123X")), pay_to: None }
        );
        assert_eq!(
            r.resolve(Channel::Ussd, "98*2*kbz001a"),
            Intent::ComputeAmount { plate: plate("KBZ001A"), operator: Operator::A }
        );
        assert_eq!(
            r.resolve(Channel::Ussd, " 98*3*KDA 555B "),
            Intent::ComputeDuration { plate: plate("KDA555B") }
        );
        assert_eq!(
            r.resolve(Channel::Ussd, "98*9*2*kca123x"),
            Intent::ComputeAmount { plate: plate("KCA123X"), operator: Operator::B }
        );
    }

    #[test]
    fn test_ussd_invalid_paths() {
        let r = router();
        for input in ["98*5", "", "99", "98*", "98*1*", "98*9", "98*9*2", "98*9*1*KCA123X", "98*1*A*B", "98**1", "98*4*x"] {
            assert_eq!(r.resolve(Channel::Ussd, input), Intent::Invalid, "input {input:?}");
        }
    }

    #[test]
    fn test_ussd_strips_single_trailing_hash() {
        let r = router();
        assert_eq!(r.resolve(Channel::Ussd, "98#"), Intent::ShowWelcomeMenu);
        assert_eq!(r.resolve(Channel::Ussd, "98##"), Intent::Invalid);
        assert_eq!(normalize_ussd(" 98 * 1 * kca 1#"), "98*1*kca1");
    }

    #[test]
    fn test_custom_sentinel_is_escaped() {
        let r = Router::new(RoutingTable::ussd("384*7").unwrap());
        assert_eq!(r.resolve(Channel::Ussd, "384*7"), Intent::ShowWelcomeMenu);
        assert_eq!(r.resolve(Channel::Ussd, "384*7*4"), Intent::ShowTerms);
        assert_eq!(r.resolve(Channel::Ussd, "98"), Intent::Invalid);
        assert_eq!(r.ussd_table().sentinel(), "384*7");
    }

    #[test]
    fn test_whatsapp_commands() {
        let r = router();
        assert_eq!(
            r.resolve(Channel::WhatsApp, "Time kca 123x"),
            Intent::ComputeDuration { plate: plate("KCA123X") }
        );
        assert_eq!(
            r.resolve(Channel::WhatsApp, "AMOUNT KCA123X"),
            Intent::ComputeAmount { plate: plate("KCA123X"), operator: Operator::A }
        );
        assert_eq!(
            r.resolve(Channel::WhatsApp, "pay KCA123X"),
            Intent::InitiatePayment { target: PaymentTarget::Plate(plate("KCA123X")), pay_to: None }
        );
    }

    #[test]
    fn test_whatsapp_pay_phone_override() {
        let r = router();
        assert_eq!(
            r.resolve(Channel::WhatsApp, "pay KCA123X +254712345678"),
            Intent::InitiatePayment {
                target: PaymentTarget::Plate(plate("KCA123X")),
                pay_to: Some("254712345678".to_string()),
            }
        );
        // A spaced plate is not mistaken for a phone number
        assert_eq!(
            r.resolve(Channel::WhatsApp, "pay kca 123x"),
            Intent::InitiatePayment { target: PaymentTarget::Plate(plate("KCA123X")), pay_to: None }
        );
        assert_eq!(
            r.resolve(Channel::WhatsApp, "pay kca 123x 0712345678"),
            Intent::InitiatePayment {
                target: PaymentTarget::Plate(plate("KCA123X")),
                pay_to: Some("0712345678".to_string()),
            }
        );
        // Fewer than MIN_PHONE_DIGITS digits stays part of the plate
        assert_eq!(
            r.resolve(Channel::WhatsApp, "pay KCA123X 12345"),
            Intent::InitiatePayment { target: PaymentTarget::Plate(plate("KCA123X12345")), pay_to: None }
        );
    }

    #[test]
    fn test_whatsapp_ignored_inputs() {
        let r = router();
        assert_eq!(r.resolve(Channel::WhatsApp, "hello"), Intent::Invalid);
        assert_eq!(r.resolve(Channel::WhatsApp, "   "), Intent::Invalid);
        assert_eq!(r.resolve(Channel::WhatsApp, "balance KCA123X"), Intent::Invalid);
    }

    #[test]
    fn test_ivr_turns() {
        let r = router();
        assert_eq!(r.resolve(Channel::Ivr, ""), Intent::ShowPayPrompt);
        assert_eq!(
            r.resolve(Channel::Ivr, "3"),
            Intent::InitiatePayment { target: PaymentTarget::Choice(3), pay_to: None }
        );
        assert_eq!(r.resolve(Channel::Ivr, "*"), Intent::Invalid);
    }
}
