//! # Registry
//!
//! Authoritative in-process store of products, modules and recent faults.
//!
//! ## Three Sources of Truth
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    What the Registry Reconciles                         │
//! │                                                                         │
//! │   Physical module          Registry (this)            Remote ledger     │
//! │   ───────────────          ───────────────            ─────────────     │
//! │   WHOAMI → uid      ──►    Module.uid                                   │
//! │   GET_STOCK         ──►    Module.cached_stock  ◄──   (mirror)          │
//! │                            Product.stock        ◄──   fetchAllProducts  │
//! │                            Module.assigned_code ◄──   assignments (uid) │
//! │   DISPENSE ack      ──►    Product.stock - 1    ──►   updateStock       │
//! │                                                                         │
//! │   Product.stock is authoritative once a dispense completes.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - `Product.code` and `Module.address` are unique.
//! - Stock never goes negative; decrements clamp at zero.
//! - The error log never holds more than [`ERROR_LOG_CAPACITY`] entries.
//!
//! Lookups are linear scans: a kiosk has a handful of modules, not thousands.

use std::collections::VecDeque;

use chrono::Utc;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::types::{ErrorLogEntry, Module, Product};
use crate::ERROR_LOG_CAPACITY;

/// In-memory cache of products, modules and errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    products: Vec<Product>,
    modules: Vec<Module>,
    errors: VecDeque<ErrorLogEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Upserts a product by code.
    ///
    /// An existing entry is overwritten in place, so repeated calls with the
    /// same code never grow the registry.
    pub fn add_product(&mut self, code: &str, name: &str, stock: u32, available: bool) {
        if let Some(product) = self.products.iter_mut().find(|p| p.code == code) {
            product.name = name.to_string();
            product.stock = stock;
            product.available = available;
            return;
        }

        self.products.push(Product::new(code, name, stock, available));
    }

    /// Looks up a product by exact code.
    pub fn find_product(&self, code: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.code == code)
    }

    /// Returns true if a product with this code exists.
    pub fn validate_product_exists(&self, code: &str) -> bool {
        self.find_product(code).is_some()
    }

    /// Decrements a product's authoritative stock by one, clamped at zero.
    ///
    /// Returns the new stock, or `None` if the code is unknown.
    pub fn decrement_stock(&mut self, code: &str) -> Option<u32> {
        let product = self.products.iter_mut().find(|p| p.code == code)?;
        product.stock = product.stock.saturating_sub(1);
        Some(product.stock)
    }

    /// Overwrites a product's stock. Returns false if the code is unknown.
    pub fn set_product_stock(&mut self, code: &str, stock: u32) -> bool {
        match self.products.iter_mut().find(|p| p.code == code) {
            Some(product) => {
                product.stock = stock;
                true
            }
            None => false,
        }
    }

    /// All products in insertion order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Upserts a module by address.
    ///
    /// ## Behavior
    /// - Existing address: uid/code/name/stock are replaced, the module is
    ///   marked online and `last_seen_at` is refreshed.
    /// - New address: appended as healthy and online.
    ///
    /// An empty `code` is stored as "no assignment".
    pub fn add_module(&mut self, address: u8, uid: &str, code: Option<&str>, name: &str, stock: u32) {
        let code = code.filter(|c| !c.is_empty()).map(str::to_string);
        let now = Utc::now();

        if let Some(module) = self.modules.iter_mut().find(|m| m.address == address) {
            module.uid = uid.to_string();
            module.assigned_code = code;
            module.display_name = name.to_string();
            module.cached_stock = stock;
            module.online = true;
            module.seen_on_bus = true;
            module.last_seen_at = now;
            return;
        }

        self.modules.push(Module {
            address,
            uid: uid.to_string(),
            assigned_code: code,
            display_name: name.to_string(),
            cached_stock: stock,
            healthy: true,
            online: true,
            last_seen_at: now,
            seen_on_bus: true,
        });
    }

    /// Adds an offline entry for a module known only from the ledger.
    ///
    /// Returns false, changing nothing, if the address is already taken.
    pub fn add_placeholder(&mut self, address: u8, uid: &str, code: Option<&str>, name: &str, stock: u32) -> bool {
        if self.find_module_by_address(address).is_some() {
            return false;
        }

        self.modules.push(Module {
            address,
            uid: uid.to_string(),
            assigned_code: code.filter(|c| !c.is_empty()).map(str::to_string),
            display_name: name.to_string(),
            cached_stock: stock,
            healthy: false,
            online: false,
            last_seen_at: Utc::now(),
            seen_on_bus: false,
        });
        true
    }

    /// Sets a module's cached stock. Unknown addresses are ignored.
    pub fn update_module_stock(&mut self, address: u8, stock: u32) {
        if let Some(module) = self.module_mut(address) {
            module.cached_stock = stock;
        }
    }

    /// Records the outcome of the most recent bus operation with a module.
    ///
    /// Unknown addresses are ignored: health pings for a module removed
    /// mid-poll are expected.
    pub fn update_module_health(&mut self, address: u8, online: bool) {
        if let Some(module) = self.module_mut(address) {
            module.online = online;
            module.healthy = online;
            if online {
                module.last_seen_at = Utc::now();
            }
        }
    }

    /// Sets the product assignment of the module with this UID.
    ///
    /// Returns false if no module carries the UID.
    pub fn assign_module(&mut self, uid: &str, code: Option<&str>, name: &str) -> bool {
        match self.modules.iter_mut().find(|m| !uid.is_empty() && m.uid == uid) {
            Some(module) => {
                module.assigned_code = code.filter(|c| !c.is_empty()).map(str::to_string);
                module.display_name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Moves the module with this UID to a new bus address.
    ///
    /// Any other entry already registered at `new_address` is stale (its
    /// module re-enumerated elsewhere or vanished) and is dropped so that
    /// addresses stay unique. Returns false if the UID is unknown.
    pub fn relocate_module(&mut self, uid: &str, new_address: u8) -> bool {
        if self.find_module_by_uid(uid).is_none() {
            return false;
        }

        self.modules
            .retain(|m| m.address != new_address || m.uid == uid);

        if let Some(module) = self.modules.iter_mut().find(|m| m.uid == uid) {
            module.address = new_address;
        }
        true
    }

    /// Mutable access to one module, for reconciliation.
    pub fn module_mut(&mut self, address: u8) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.address == address)
    }

    /// Mutable access to every module, for reconciliation passes.
    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.iter_mut()
    }

    pub fn find_module_by_address(&self, address: u8) -> Option<&Module> {
        self.modules.iter().find(|m| m.address == address)
    }

    pub fn find_module_by_code(&self, code: &str) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.assigned_code.as_deref() == Some(code))
    }

    /// Looks up a module by UID. An empty UID never matches.
    pub fn find_module_by_uid(&self, uid: &str) -> Option<&Module> {
        if uid.is_empty() {
            return None;
        }
        self.modules.iter().find(|m| m.uid == uid)
    }

    /// All modules in discovery order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    // =========================================================================
    // Error Log
    // =========================================================================

    /// Appends a fault, evicting the oldest entry once the log is full.
    pub fn log_error(&mut self, kind: ErrorKind, message: impl Into<String>, affected: impl Into<String>) {
        self.errors.push_back(ErrorLogEntry {
            kind,
            message: message.into(),
            affected: affected.into(),
            timestamp: Utc::now(),
        });

        while self.errors.len() > ERROR_LOG_CAPACITY {
            self.errors.pop_front();
        }
    }

    /// Error log, oldest first.
    pub fn errors(&self) -> impl ExactSizeIterator<Item = &ErrorLogEntry> {
        self.errors.iter()
    }

    /// Most recent fault, if any.
    pub fn last_error(&self) -> Option<&ErrorLogEntry> {
        self.errors.back()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drops all products and modules. The error log is kept.
    ///
    /// Must not be called while a transaction is in flight.
    pub fn clear(&mut self) {
        self.products.clear();
        self.modules.clear();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find_product() {
        let mut registry = Registry::new();
        registry.add_product("A1", "Soda", 5, true);

        let product = registry.find_product("A1").unwrap();
        assert_eq!(product.stock, 5);
        assert!(product.available);
        assert!(registry.find_product("a1").is_none());
    }

    #[test]
    fn test_add_product_upserts_in_place() {
        let mut registry = Registry::new();
        registry.add_product("A1", "Soda", 5, true);
        registry.add_product("B2", "Chips", 2, true);
        registry.add_product("A1", "Cola", 7, false);

        assert_eq!(registry.products().len(), 2);
        assert_eq!(registry.products()[0].code, "A1");
        assert_eq!(registry.products()[0].name, "Cola");
        assert_eq!(registry.products()[0].stock, 7);
        assert!(!registry.products()[0].available);
    }

    #[test]
    fn test_add_module_is_idempotent() {
        let mut registry = Registry::new();
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);

        assert_eq!(registry.modules().len(), 1);
        let module = registry.find_module_by_address(0x10).unwrap();
        assert_eq!(module.uid, "UID-1");
        assert_eq!(module.code(), Some("A1"));
        assert!(module.online && module.healthy);
    }

    #[test]
    fn test_add_module_replaces_fields_and_marks_online() {
        let mut registry = Registry::new();
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);
        registry.update_module_health(0x10, false);

        registry.add_module(0x10, "UID-2", None, "New Module", 0);

        let module = registry.find_module_by_address(0x10).unwrap();
        assert_eq!(module.uid, "UID-2");
        assert!(!module.is_assigned());
        assert!(module.online);
    }

    #[test]
    fn test_empty_code_means_unassigned() {
        let mut registry = Registry::new();
        registry.add_module(0x11, "UID-1", Some(""), "New Module", 0);
        assert!(registry.find_module_by_address(0x11).unwrap().assigned_code.is_none());
    }

    #[test]
    fn test_updates_on_unknown_address_are_noops() {
        let mut registry = Registry::new();
        registry.update_module_stock(0x42, 3);
        registry.update_module_health(0x42, false);
        assert!(registry.modules().is_empty());
    }

    #[test]
    fn test_health_update_marks_both_flags() {
        let mut registry = Registry::new();
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);

        registry.update_module_health(0x10, false);
        let module = registry.find_module_by_address(0x10).unwrap();
        assert!(!module.online);
        assert!(!module.healthy);
    }

    #[test]
    fn test_lookups_by_code_and_uid() {
        let mut registry = Registry::new();
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);
        registry.add_module(0x11, "UID-2", None, "New Module", 0);

        assert_eq!(registry.find_module_by_code("A1").unwrap().address, 0x10);
        assert_eq!(registry.find_module_by_uid("UID-2").unwrap().address, 0x11);
        assert!(registry.find_module_by_uid("").is_none());
        assert!(registry.find_module_by_code("ZZ").is_none());
    }

    #[test]
    fn test_decrement_stock_clamps_at_zero() {
        let mut registry = Registry::new();
        registry.add_product("A1", "Soda", 1, true);

        assert_eq!(registry.decrement_stock("A1"), Some(0));
        assert_eq!(registry.decrement_stock("A1"), Some(0));
        assert_eq!(registry.decrement_stock("ZZ"), None);
    }

    #[test]
    fn test_relocate_module_drops_stale_entry() {
        let mut registry = Registry::new();
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);
        registry.add_module(0x12, "UID-OLD", None, "New Module", 0);

        assert!(registry.relocate_module("UID-1", 0x12));

        assert_eq!(registry.modules().len(), 1);
        let module = registry.find_module_by_uid("UID-1").unwrap();
        assert_eq!(module.address, 0x12);
        assert!(registry.find_module_by_address(0x10).is_none());
        assert!(!registry.relocate_module("UID-MISSING", 0x13));
    }

    #[test]
    fn test_assign_module_by_uid() {
        let mut registry = Registry::new();
        registry.add_module(0x10, "UID-1", None, "New Module", 0);

        assert!(registry.assign_module("UID-1", Some("A1"), "Soda"));
        assert_eq!(registry.find_module_by_code("A1").unwrap().display_name, "Soda");
        assert!(!registry.assign_module("UID-9", Some("B2"), "Chips"));
    }

    #[test]
    fn test_set_product_stock() {
        let mut registry = Registry::new();
        registry.add_product("A1", "Soda", 5, true);

        assert!(registry.set_product_stock("A1", 4));
        assert_eq!(registry.find_product("A1").unwrap().stock, 4);
        assert!(!registry.set_product_stock("ZZ", 1));
    }

    #[test]
    fn test_placeholder_is_offline_and_unseen() {
        let mut registry = Registry::new();
        assert!(registry.add_placeholder(0x15, "UID-5", Some("A1"), "Soda", 2));

        let module = registry.find_module_by_address(0x15).unwrap();
        assert!(!module.online && !module.healthy && !module.seen_on_bus);
        assert_eq!(module.code(), Some("A1"));

        // An address already in use is left alone.
        assert!(!registry.add_placeholder(0x15, "UID-6", None, "New Module", 0));
        assert_eq!(registry.find_module_by_address(0x15).unwrap().uid, "UID-5");

        registry.add_module(0x15, "UID-5", Some("A1"), "Soda", 2);
        assert!(registry.find_module_by_address(0x15).unwrap().seen_on_bus);
    }

    #[test]
    fn test_error_log_is_bounded_fifo() {
        let mut registry = Registry::new();
        for i in 0..51 {
            registry.log_error(ErrorKind::BusCommFailure, format!("failure {}", i), "0x10");
        }

        assert_eq!(registry.errors().len(), ERROR_LOG_CAPACITY);
        assert!(registry.errors().all(|e| e.message != "failure 0"));
        assert_eq!(registry.errors().next().unwrap().message, "failure 1");
        assert_eq!(registry.last_error().unwrap().message, "failure 50");
    }

    #[test]
    fn test_clear_keeps_error_log() {
        let mut registry = Registry::new();
        registry.add_product("A1", "Soda", 5, true);
        registry.add_module(0x10, "UID-1", Some("A1"), "Soda", 5);
        registry.log_error(ErrorKind::ModuleOffline, "gone", "0x10");

        registry.clear();

        assert!(registry.products().is_empty());
        assert!(registry.modules().is_empty());
        assert_eq!(registry.errors().len(), 1);
    }
}
