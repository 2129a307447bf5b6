//! Services - business logic
//!
//! - `router` - Session-less menu/command router
//! - `parking` - Per-channel request orchestration
//! - `replies` - Caller-facing reply texts

pub mod parking;
pub mod replies;
pub mod router;

// Re-export commonly used types
pub use parking::{AmountDue, Collaborators, ParkingService, PaymentOutcome};
pub use replies::{IvrReply, UssdReply};
pub use router::{Router, RoutingTable};
