//! Domain models - core business types, the fee engine and error taxonomy
//!
//! - `types` - plates, operators, channels, intents, session input
//! - `tariff` - day/night fee engine
//! - `format` - duration and currency rendering
//! - `error` - `ParkingError` and the `BestEffort` side-effect outcome

pub mod error;
pub mod format;
pub mod tariff;
pub mod types;

pub use error::{BestEffort, GuardedAction, ParkingError};
pub use tariff::{stay_minutes, TariffRule, TariffWindow};
pub use types::{Channel, Intent, Operator, PaymentTarget, Plate, SessionInput, TransactionId, VehicleTransaction};
