//! # Controller Error Types
//!
//! Failures that reach the caller of the controller: configuration and
//! startup problems, and operations refused because of FSM state.
//!
//! Faults that happen *during* a transaction never surface here; they are
//! logged to the registry and routed through the FSM's `Error` state.

use kiosk_bus::BusError;
use kiosk_core::CoreError;
use kiosk_ledger::LedgerError;
use thiserror::Error;

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A configuration value is out of range.
    #[error("Invalid kiosk configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // State Errors
    // =========================================================================
    /// A full-registry operation was requested outside `Idle`.
    #[error("Operation refused: a transaction is in progress ({state})")]
    TransactionInFlight { state: String },
}

impl From<toml::de::Error> for ControllerError {
    fn from(err: toml::de::Error) -> Self {
        ControllerError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ControllerError {
    fn from(err: toml::ser::Error) -> Self {
        ControllerError::ConfigSaveFailed(err.to_string())
    }
}
