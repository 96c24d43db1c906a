//! # Bus Error Types
//!
//! ## Failure Classes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bus Failure Classes                              │
//! │                                                                         │
//! │  Variant          Retried?   ErrorKind           Remediation            │
//! │  ───────────────  ─────────  ──────────────────  ─────────────────────  │
//! │  CommFailure      yes        BusCommFailure      check wiring           │
//! │  Timeout          yes        OperationTimeout    reset the module       │
//! │  ModuleRejected   NO         DispenseFailed      inspect the mechanism  │
//! │  InvalidRequest   no         BusCommFailure      caller bug             │
//! │                                                                         │
//! │  An explicit 0xEE is authoritative: it is never retried as though it   │
//! │  were a lost response.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kiosk_core::ErrorKind;
use thiserror::Error;

use crate::protocol::Command;

/// Result type alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Final outcome of a failed bus operation, after retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// The transport refused or garbled every attempt.
    #[error("{op} to {address:#04x} failed after {attempts} attempt(s): {reason}")]
    CommFailure {
        address: u8,
        op: Command,
        attempts: u32,
        reason: String,
    },

    /// The module never answered within the response timeout.
    #[error("{op} to {address:#04x} timed out after {attempts} attempt(s)")]
    Timeout {
        address: u8,
        op: Command,
        attempts: u32,
    },

    /// The module answered with an error ACK.
    #[error("Module {address:#04x} rejected {op}")]
    ModuleRejected { address: u8, op: Command },

    /// The request could not be sent at all.
    #[error("Invalid bus request: {0}")]
    InvalidRequest(String),
}

impl BusError {
    /// Taxonomy code this failure is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BusError::CommFailure { .. } => ErrorKind::BusCommFailure,
            BusError::Timeout { .. } => ErrorKind::OperationTimeout,
            BusError::ModuleRejected { .. } => ErrorKind::DispenseFailed,
            BusError::InvalidRequest(_) => ErrorKind::BusCommFailure,
        }
    }

    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::CommFailure { .. } | BusError::Timeout { .. })
    }

    /// Target address, when the failure concerns one module.
    pub fn address(&self) -> Option<u8> {
        match self {
            BusError::CommFailure { address, .. }
            | BusError::Timeout { address, .. }
            | BusError::ModuleRejected { address, .. } => Some(*address),
            BusError::InvalidRequest(_) => None,
        }
    }
}

/// Failure of a single byte-level transfer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing acknowledged the address.
    #[error("No device acknowledged address {0:#04x}")]
    Nack(u8),

    /// Bus-level fault (arbitration lost, line stuck, ...).
    #[error("Bus fault: {0}")]
    Fault(String),
}
