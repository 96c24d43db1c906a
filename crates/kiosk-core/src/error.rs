//! # Error Types
//!
//! Domain-specific error types for kiosk-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kiosk-core (this file)                                                │
//! │  ├── ErrorKind        - Fault taxonomy shown on the display & logged   │
//! │  ├── CoreError        - Domain construction failures                   │
//! │  └── ValidationError  - Keypad / display input failures                │
//! │                                                                         │
//! │  kiosk-bus            └── BusError     → ErrorKind via kind()          │
//! │  kiosk-ledger         └── LedgerError  → ErrorKind::LedgerSyncFailed   │
//! │  kiosk-controller     └── ControllerError (config, startup)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ErrorKind` is not an error type itself: it is the classification every
//! fault is reduced to before it reaches the registry's error log or the
//! FSM's `Error` state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsm::{Event, State};

// =============================================================================
// Fault Taxonomy
// =============================================================================

/// Classification of every fault the kiosk can report.
///
/// The numeric code is what the character display shows as `ERROR:<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Product module not responding.
    ModuleOffline,
    /// Bus transmission failure.
    BusCommFailure,
    /// Module reported a dispense mechanism fault.
    DispenseFailed,
    /// Module at a known address reports a different UID.
    ModuleUidMismatch,
    /// Module-reported stock disagrees with the authoritative count.
    StockMismatch,
    /// Ledger call failed.
    LedgerSyncFailed,
    /// Module was online and has stopped answering.
    ModuleDisconnected,
    /// Product code entered on the keypad is not known.
    InvalidProduct,
    /// A bus operation ran out of time waiting for its response.
    OperationTimeout,
}

impl ErrorKind {
    /// Every kind, in display-code order.
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::ModuleOffline,
        ErrorKind::BusCommFailure,
        ErrorKind::DispenseFailed,
        ErrorKind::ModuleUidMismatch,
        ErrorKind::StockMismatch,
        ErrorKind::LedgerSyncFailed,
        ErrorKind::ModuleDisconnected,
        ErrorKind::InvalidProduct,
        ErrorKind::OperationTimeout,
    ];

    /// Numeric code shown on the display.
    pub const fn code(&self) -> u8 {
        match self {
            ErrorKind::ModuleOffline => 1,
            ErrorKind::BusCommFailure => 2,
            ErrorKind::DispenseFailed => 3,
            ErrorKind::ModuleUidMismatch => 4,
            ErrorKind::StockMismatch => 5,
            ErrorKind::LedgerSyncFailed => 6,
            ErrorKind::ModuleDisconnected => 7,
            ErrorKind::InvalidProduct => 8,
            ErrorKind::OperationTimeout => 9,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ModuleOffline => "module_offline",
            ErrorKind::BusCommFailure => "bus_comm_failure",
            ErrorKind::DispenseFailed => "dispense_failed",
            ErrorKind::ModuleUidMismatch => "module_uid_mismatch",
            ErrorKind::StockMismatch => "stock_mismatch",
            ErrorKind::LedgerSyncFailed => "ledger_sync_failed",
            ErrorKind::ModuleDisconnected => "module_disconnected",
            ErrorKind::InvalidProduct => "invalid_product",
            ErrorKind::OperationTimeout => "operation_timeout",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A custom transition table is missing a (state, event) pair.
    ///
    /// ## When This Occurs
    /// - `TransitionTable::from_entries` was given a partial entry list
    #[error("Transition table has no entry for ({state:?}, {event:?})")]
    IncompleteTransitionTable { state: State, event: Event },

    /// A custom transition table lists the same pair twice.
    #[error("Transition table has duplicate entries for ({state:?}, {event:?})")]
    DuplicateTransition { state: State, event: Event },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. a character the keypad cannot produce).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes_are_stable() {
        let codes: Vec<u8> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::InvalidProduct.to_string(), "invalid_product");
        assert_eq!(ErrorKind::OperationTimeout.to_string(), "operation_timeout");
    }

    #[test]
    fn test_error_messages() {
        let err = CoreError::IncompleteTransitionTable {
            state: State::Idle,
            event: Event::Submit,
        };
        assert_eq!(
            err.to_string(),
            "Transition table has no entry for (Idle, Submit)"
        );

        let err = ValidationError::TooLong {
            field: "code".to_string(),
            max: 20,
        };
        assert_eq!(err.to_string(), "code must be at most 20 characters");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
