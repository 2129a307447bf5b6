//! Error taxonomy for request handling
//!
//! Only `NotFound`, `CrossOperatorConflict` and `MalformedInput` are shown to a
//! caller as-is. `Upstream` is rendered as a generic retry message. Failures of
//! best-effort side effects never become a `ParkingError`; they are carried by
//! [`BestEffort`] and must be acknowledged.

use crate::domain::types::Plate;
use thiserror::Error;
use tracing::warn;

/// What a cross-operator refusal was protecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedAction {
    Payment,
    Duration,
    /// Plate is present in both stores and policy says to refuse
    DualOwnership,
}

#[derive(Debug, Error)]
pub enum ParkingError {
    #[error("vehicle {0} not found")]
    NotFound(Plate),
    #[error("vehicle {plate} belongs to the other operator ({action:?} refused)")]
    CrossOperatorConflict { plate: Plate, action: GuardedAction },
    #[error("upstream failure during {context}: {detail}")]
    Upstream { context: &'static str, detail: String },
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl ParkingError {
    pub fn upstream(context: &'static str, err: impl std::fmt::Display) -> Self {
        ParkingError::Upstream { context, detail: err.to_string() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParkingError::NotFound(_) => "not_found",
            ParkingError::CrossOperatorConflict { .. } => "cross_operator_conflict",
            ParkingError::Upstream { .. } => "upstream_failure",
            ParkingError::MalformedInput(_) => "malformed_input",
        }
    }
}

/// A side effect whose failure must not reach the caller.
///
/// Call [`BestEffort::acknowledge`] to log and drop it.
#[must_use = "best-effort outcomes must be acknowledged"]
#[derive(Debug)]
pub struct BestEffort {
    operation: &'static str,
    failure: Option<String>,
}

impl BestEffort {
    pub fn from_result<E: std::fmt::Display>(operation: &'static str, result: Result<(), E>) -> Self {
        Self { operation, failure: result.err().map(|e| e.to_string()) }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Log a failure (if any) and discard it. Returns whether it failed.
    pub fn acknowledge(self) -> bool {
        match self.failure {
            Some(error) => {
                warn!(operation = %self.operation, error = %error, "best_effort_failed");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort_acknowledge() {
        let ok = BestEffort::from_result::<String>("link_phone", Ok(()));
        assert!(!ok.is_failure());
        assert!(!ok.acknowledge());

        let failed = BestEffort::from_result("link_phone", Err("connection reset"));
        assert!(failed.is_failure());
        assert!(failed.acknowledge());
    }

    #[test]
    fn test_error_kinds() {
        let plate = Plate::parse("KCA123X").unwrap();
        assert_eq!(ParkingError::NotFound(plate.clone()).kind(), "not_found");
        assert_eq!(
            ParkingError::CrossOperatorConflict { plate, action: GuardedAction::Payment }.kind(),
            "cross_operator_conflict"
        );
        assert_eq!(ParkingError::upstream("store", "timeout").kind(), "upstream_failure");
    }
}
