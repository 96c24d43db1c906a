//! # In-Memory Ledger
//!
//! A ledger that lives in the process. The app uses it when no ledger file
//! is configured; tests use it to seed catalog data and to assert on every
//! call the controller made.
//!
//! Clones share state, so a test can hand one handle to the engine and
//! keep another for assertions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiosk_core::TransactionRecord;
use tracing::debug;

use crate::document::LedgerDocument;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Ledger, LedgerProduct, ModuleAssignment};

#[derive(Debug, Default)]
struct MemoryState {
    document: LedgerDocument,
    failing: bool,
    transactions: Vec<TransactionRecord>,
    stock_updates: Vec<(String, u32)>,
    errors: Vec<(String, String)>,
    registrations: Vec<(String, u8)>,
}

/// Shared-state in-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, call: &str) -> LedgerResult<MutexGuard<'_, MemoryState>> {
        let state = self.state();
        if state.failing {
            debug!(call, "Memory ledger failing on purpose");
            return Err(LedgerError::Unavailable(format!("{} refused", call)));
        }
        Ok(state)
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Upserts a catalog row.
    pub fn add_product(&self, product: LedgerProduct) {
        let mut state = self.state();
        let products = &mut state.document.products;
        match products.iter_mut().find(|p| p.code == product.code) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
    }

    /// Upserts a module assignment by UID.
    pub fn assign(&self, uid: &str, address: Option<u8>, code: Option<&str>) {
        let mut state = self.state();
        let row = ModuleAssignment {
            uid: uid.to_string(),
            address,
            code: code.map(str::to_string),
        };
        let modules = &mut state.document.modules;
        match modules.iter_mut().find(|m| m.uid == uid) {
            Some(existing) => *existing = row,
            None => modules.push(row),
        }
    }

    /// Makes every subsequent call fail with `Unavailable` (or recover).
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    // =========================================================================
    // Recorded Calls
    // =========================================================================

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.state().transactions.clone()
    }

    pub fn stock_updates(&self) -> Vec<(String, u32)> {
        self.state().stock_updates.clone()
    }

    /// Appended errors as `(message, details)`.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.state().errors.clone()
    }

    /// `register_new_module` calls as `(uid, address)`.
    pub fn registrations(&self) -> Vec<(String, u8)> {
        self.state().registrations.clone()
    }

    /// Current stock the ledger holds for `code`.
    pub fn stock_of(&self, code: &str) -> Option<u32> {
        self.state()
            .document
            .products
            .iter()
            .find(|p| p.code == code)
            .map(|p| p.stock)
    }
}

impl Ledger for MemoryLedger {
    fn fetch_all_products(&self) -> LedgerResult<Vec<LedgerProduct>> {
        Ok(self.check("fetch_all_products")?.document.products.clone())
    }

    fn fetch_module_assignments(&self) -> LedgerResult<Vec<ModuleAssignment>> {
        Ok(self.check("fetch_module_assignments")?.document.modules.clone())
    }

    fn update_stock(&self, code: &str, new_stock: u32) -> LedgerResult<()> {
        let mut state = self.check("update_stock")?;
        state.stock_updates.push((code.to_string(), new_stock));
        state.document.set_stock(code, new_stock)
    }

    fn append_transaction(&self, record: &TransactionRecord) -> LedgerResult<()> {
        let mut state = self.check("append_transaction")?;
        state.transactions.push(record.clone());
        state.document.push_transaction(record);
        Ok(())
    }

    fn append_error(&self, message: &str, details: &str) -> LedgerResult<()> {
        let mut state = self.check("append_error")?;
        state.errors.push((message.to_string(), details.to_string()));
        state.document.push_error(message, details);
        Ok(())
    }

    fn register_new_module(&self, uid: &str, address: u8) -> LedgerResult<()> {
        let mut state = self.check("register_new_module")?;
        state.registrations.push((uid.to_string(), address));
        state.document.register(uid, address);
        Ok(())
    }

    fn is_module_registered(&self, uid: &str) -> LedgerResult<Option<ModuleAssignment>> {
        Ok(self.check("is_module_registered")?.document.lookup(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let ledger = MemoryLedger::new();
        let handle = ledger.clone();
        ledger.add_product(LedgerProduct::new("A1", "Soda", 5));

        handle.update_stock("A1", 4).unwrap();

        assert_eq!(ledger.stock_of("A1"), Some(4));
        assert_eq!(ledger.stock_updates(), vec![("A1".to_string(), 4)]);
    }

    #[test]
    fn test_registration_makes_uid_known() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.is_module_registered("PRD_MOD_09").unwrap(), None);

        ledger.register_new_module("PRD_MOD_09", 0x12).unwrap();

        let row = ledger.is_module_registered("PRD_MOD_09").unwrap().unwrap();
        assert_eq!(row.address, Some(0x12));
        assert_eq!(row.code, None);
        assert_eq!(ledger.registrations().len(), 1);
    }

    #[test]
    fn test_failing_mode_rejects_every_call() {
        let ledger = MemoryLedger::new();
        ledger.add_product(LedgerProduct::new("A1", "Soda", 5));
        ledger.set_failing(true);

        assert!(ledger.fetch_all_products().is_err());
        assert!(ledger.append_error("x", "y").is_err());
        assert!(ledger.errors().is_empty());

        ledger.set_failing(false);
        assert_eq!(ledger.fetch_all_products().unwrap().len(), 1);
    }

    #[test]
    fn test_assign_upserts_by_uid() {
        let ledger = MemoryLedger::new();
        ledger.assign("PRD_MOD_01", Some(0x10), None);
        ledger.assign("PRD_MOD_01", Some(0x10), Some("A1"));

        let rows = ledger.fetch_module_assignments().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code.as_deref(), Some("A1"));
    }
}
