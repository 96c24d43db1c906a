//! # Ledger Document
//!
//! The whole ledger as one serde value. Both local implementations keep
//! one of these; the file ledger additionally persists it.
//!
//! ## JSON Shape
//! ```json
//! {
//!   "products":     [{ "code": "A1", "name": "Soda", "stock": 5, "available": true }],
//!   "modules":      [{ "uid": "PRD_MOD_01", "address": 16, "code": "A1" }],
//!   "transactions": [{ "id": "…", "code": "A1", "amount": 1, "successful": true, "timestamp": "…" }],
//!   "errors":       [{ "id": "…", "message": "…", "details": "…", "timestamp": "…" }]
//! }
//! ```

use chrono::{DateTime, Utc};
use kiosk_core::TransactionRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{LedgerProduct, ModuleAssignment};

/// One journaled dispense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub id: Uuid,
    pub code: String,
    pub amount: u32,
    pub successful: bool,
    pub timestamp: DateTime<Utc>,
}

/// One journaled fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub id: Uuid,
    pub message: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub products: Vec<LedgerProduct>,
    #[serde(default)]
    pub modules: Vec<ModuleAssignment>,
    #[serde(default)]
    pub transactions: Vec<TransactionEntry>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

impl LedgerDocument {
    pub fn set_stock(&mut self, code: &str, new_stock: u32) -> LedgerResult<()> {
        let product = self
            .products
            .iter_mut()
            .find(|p| p.code == code)
            .ok_or_else(|| LedgerError::NotFound {
                entity: "product",
                id: code.to_string(),
            })?;
        product.stock = new_stock;
        Ok(())
    }

    pub fn push_transaction(&mut self, record: &TransactionRecord) {
        self.transactions.push(TransactionEntry {
            id: Uuid::new_v4(),
            code: record.code.clone(),
            amount: record.amount_dispensed,
            successful: record.successful,
            timestamp: record.timestamp,
        });
    }

    pub fn push_error(&mut self, message: &str, details: &str) {
        self.errors.push(ErrorEntry {
            id: Uuid::new_v4(),
            message: message.to_string(),
            details: details.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Adds an unassigned row for `uid`, or refreshes the address of an
    /// existing one. Never duplicates a UID.
    pub fn register(&mut self, uid: &str, address: u8) {
        match self.modules.iter_mut().find(|m| m.uid == uid) {
            Some(row) => row.address = Some(address),
            None => self.modules.push(ModuleAssignment {
                uid: uid.to_string(),
                address: Some(address),
                code: None,
            }),
        }
    }

    pub fn lookup(&self, uid: &str) -> Option<ModuleAssignment> {
        self.modules.iter().find(|m| m.uid == uid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_does_not_duplicate() {
        let mut doc = LedgerDocument::default();
        doc.register("PRD_MOD_01", 0x10);
        doc.register("PRD_MOD_01", 0x12);

        assert_eq!(doc.modules.len(), 1);
        assert_eq!(doc.lookup("PRD_MOD_01").unwrap().address, Some(0x12));
    }

    #[test]
    fn test_set_stock_unknown_code() {
        let mut doc = LedgerDocument::default();
        assert!(matches!(
            doc.set_stock("ZZ", 1),
            Err(LedgerError::NotFound { entity: "product", .. })
        ));
    }

    #[test]
    fn test_transactions_get_distinct_ids() {
        let mut doc = LedgerDocument::default();
        let record = TransactionRecord::dispensed("A1", 1);
        doc.push_transaction(&record);
        doc.push_transaction(&record);

        assert_eq!(doc.transactions.len(), 2);
        assert_ne!(doc.transactions[0].id, doc.transactions[1].id);
    }
}
