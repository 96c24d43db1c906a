//! # Domain Types
//!
//! Core domain types used throughout the kiosk controller.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Product      │   │     Module      │   │  ErrorLogEntry      │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  code (key)     │◄──│  assigned_code  │   │  kind               │   │
//! │  │  name           │   │  address (key)  │   │  message            │   │
//! │  │  stock          │   │  uid            │   │  affected           │   │
//! │  │  available      │   │  cached_stock   │   │  timestamp          │   │
//! │  └─────────────────┘   │  healthy/online │   └─────────────────────┘   │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────────┐                                               │
//! │  │ TransactionRecord   │  forwarded to the ledger, never kept locally  │
//! │  └─────────────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! A module has two identities:
//! - `address`: where it answers on the bus right now (may change on re-enumeration)
//! - `uid`: what it says it is (stable, used when matching against the ledger)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

// =============================================================================
// Product
// =============================================================================

/// A product the kiosk can sell.
///
/// Products are only ever upserted (by ledger sync), never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Keypad code, unique within the registry.
    pub code: String,

    /// Display name.
    pub name: String,

    /// Authoritative stock count.
    pub stock: u32,

    /// Whether the ledger lists the product as purchasable.
    pub available: bool,
}

impl Product {
    /// Creates a product.
    pub fn new(code: impl Into<String>, name: impl Into<String>, stock: u32, available: bool) -> Self {
        Product {
            code: code.into(),
            name: name.into(),
            stock,
            available,
        }
    }
}

// =============================================================================
// Module
// =============================================================================

/// A physically addressable dispensing module on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Current bus address, unique within the registry.
    pub address: u8,

    /// Self-reported identity (empty until WHOAMI succeeds).
    pub uid: String,

    /// Product code this module dispenses; `None` for an unassigned placeholder.
    pub assigned_code: Option<String>,

    /// Name pushed to the module's own display.
    pub display_name: String,

    /// Cached copy of the stock count.
    pub cached_stock: u32,

    /// Result of the most recent bus operation.
    pub healthy: bool,

    /// Reachable on the bus.
    pub online: bool,

    /// Last time the module answered.
    pub last_seen_at: DateTime<Utc>,

    /// Answered on the bus at least once. False for placeholders built
    /// from ledger rows.
    #[serde(default)]
    pub seen_on_bus: bool,
}

impl Module {
    /// Returns true if the module has a product assigned.
    pub fn is_assigned(&self) -> bool {
        self.assigned_code.is_some()
    }

    /// Returns the assigned product code, if any.
    pub fn code(&self) -> Option<&str> {
        self.assigned_code.as_deref()
    }

    /// Address formatted the way it is tagged in logs (`0x10`).
    pub fn address_tag(&self) -> String {
        address_tag(self.address)
    }
}

/// Formats a bus address for error logs and tracing fields.
pub fn address_tag(address: u8) -> String {
    format!("0x{:02X}", address)
}

// =============================================================================
// Error Log Entry
// =============================================================================

/// One entry of the registry's bounded error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub kind: ErrorKind,
    pub message: String,
    /// Address tag or product code the fault concerns (may be empty).
    pub affected: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Transaction Record
// =============================================================================

/// Outcome of one dispense, forwarded to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub code: String,
    pub amount_dispensed: u32,
    pub timestamp: DateTime<Utc>,
    pub successful: bool,
}

impl TransactionRecord {
    /// Record of a successful single-item dispense, stamped now.
    pub fn dispensed(code: impl Into<String>, amount: u32) -> Self {
        TransactionRecord {
            code: code.into(),
            amount_dispensed: amount,
            timestamp: Utc::now(),
            successful: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_tag_is_uppercase_hex() {
        assert_eq!(address_tag(0x10), "0x10");
        assert_eq!(address_tag(0x0a), "0x0A");
    }

    #[test]
    fn test_transaction_record_dispensed() {
        let record = TransactionRecord::dispensed("A1", 1);
        assert_eq!(record.code, "A1");
        assert_eq!(record.amount_dispensed, 1);
        assert!(record.successful);
    }

    #[test]
    fn test_product_serializes_with_field_names() {
        let product = Product::new("A1", "Soda", 5, true);
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("\"code\":\"A1\""));
        assert!(json.contains("\"stock\":5"));
    }
}
