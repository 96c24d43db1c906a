//! # Discovery & Reconciliation
//!
//! Keeps the registry consistent with the live module set and the ledger.
//!
//! ## Identity Resolution During a Sweep
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  probe(addr) ──no──► skip                                               │
//! │      │yes                                                               │
//! │  WHOAMI ──fails──► mark addr offline (entry kept)                       │
//! │      │uid                                                               │
//! │  registry has another uid at addr? ──► log ModuleUidMismatch            │
//! │      │                                                                  │
//! │  ledger.is_module_registered(uid)                                       │
//! │      ├── Some(row) ──► relocate uid → addr, adopt row.code              │
//! │      └── None      ──► placeholder entry + register_new_module          │
//! │                                                                         │
//! │  After the sweep: known modules that did not answer → offline           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Assignment is keyed by UID. The bus address is only where a module
//! answers today.

use std::collections::BTreeSet;

use kiosk_bus::{BusError, BusMaster};
use kiosk_core::{address_tag, ErrorKind, Registry};
use kiosk_ledger::{Ledger, LedgerError, LedgerResult};
use tracing::{debug, info, warn};

/// Display name of a module nobody has assigned yet.
pub const UNASSIGNED_NAME: &str = "New Module";

/// Display name of a registered module whose product is not in the catalog.
pub const REGISTERED_NAME: &str = "Registered Module";

/// Outcome of one discovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Addresses that acknowledged a probe and answered WHOAMI.
    pub identified: Vec<u8>,

    /// Addresses that acknowledged a probe but never said who they are.
    pub unresponsive: Vec<u8>,

    /// UIDs seen for the first time and registered with the ledger.
    pub registered: Vec<String>,

    /// Known modules that did not show up.
    pub missing: Vec<u8>,
}

/// Appends a final bus failure to the registry's error log.
pub fn record_bus_failure(registry: &mut Registry, err: &BusError) {
    let affected = err.address().map(address_tag).unwrap_or_default();
    registry.log_error(err.kind(), err.to_string(), affected);
}

/// Appends a ledger failure to the registry's error log.
pub fn record_ledger_failure(registry: &mut Registry, call: &str, err: &LedgerError) {
    warn!(call, error = %err, "Ledger call failed");
    registry.log_error(err.kind(), format!("{} failed: {}", call, err), call);
}

// =============================================================================
// Reconciler
// =============================================================================

/// Borrows the registry, bus and ledger for one reconciliation pass.
pub struct Reconciler<'a> {
    registry: &'a mut Registry,
    bus: &'a mut BusMaster,
    ledger: &'a dyn Ledger,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a mut Registry, bus: &'a mut BusMaster, ledger: &'a dyn Ledger) -> Self {
        Reconciler {
            registry,
            bus,
            ledger,
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Sweeps `addresses` and resolves every module that answers.
    pub fn discover(&mut self, addresses: impl IntoIterator<Item = u8>) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut answered = BTreeSet::new();

        for address in addresses {
            if !self.bus.probe(address) {
                continue;
            }
            answered.insert(address);

            match self.bus.whoami(address) {
                Ok(uid) => {
                    if self.adopt(address, &uid) {
                        report.registered.push(uid);
                    }
                    report.identified.push(address);
                }
                Err(err) => {
                    warn!(address = %address_tag(address), error = %err, "Device did not identify itself");
                    record_bus_failure(self.registry, &err);
                    self.registry.update_module_health(address, false);
                    report.unresponsive.push(address);
                }
            }
        }

        for module in self.registry.modules_mut() {
            if !answered.contains(&module.address) && module.online {
                info!(address = %module.address_tag(), uid = %module.uid, "Known module missing from sweep");
                module.online = false;
                module.healthy = false;
                report.missing.push(module.address);
            }
        }

        info!(
            identified = report.identified.len(),
            unresponsive = report.unresponsive.len(),
            registered = report.registered.len(),
            missing = report.missing.len(),
            "Discovery sweep complete"
        );
        report
    }

    /// Resolves one identified module. Returns true if it was registered
    /// with the ledger as new.
    fn adopt(&mut self, address: u8, uid: &str) -> bool {
        let tag = address_tag(address);

        if let Some(existing) = self.registry.find_module_by_address(address) {
            // A ledger placeholder never answered here, so a stranger at
            // its hinted address is not a swap.
            if existing.seen_on_bus && !existing.uid.is_empty() && existing.uid != uid {
                let message = format!("Expected {}, found {}", existing.uid, uid);
                warn!(address = %tag, %message, "Module UID mismatch");
                self.registry.log_error(ErrorKind::ModuleUidMismatch, message, tag.clone());
            }
        }

        let moved_from = self
            .registry
            .find_module_by_uid(uid)
            .map(|m| m.address)
            .filter(|&old| old != address);
        if let Some(old) = moved_from {
            info!(uid, from = %address_tag(old), to = %tag, "Module re-enumerated");
            self.registry.relocate_module(uid, address);
        }

        match self.ledger.is_module_registered(uid) {
            Ok(Some(row)) => {
                let (name, stock) = self.catalog_entry(row.code.as_deref());
                debug!(address = %tag, uid, code = ?row.code, "Known module");
                self.registry
                    .add_module(address, uid, row.code.as_deref(), &name, stock);
                false
            }
            Ok(None) => {
                info!(address = %tag, uid, "New module, registering with ledger");
                self.registry.add_module(address, uid, None, UNASSIGNED_NAME, 0);
                if let Err(err) = self.ledger.register_new_module(uid, address) {
                    record_ledger_failure(self.registry, "register_new_module", &err);
                }
                true
            }
            Err(err) => {
                // Ledger unreachable: keep what the registry already knows
                // about this UID rather than wiping its assignment.
                record_ledger_failure(self.registry, "is_module_registered", &err);
                let known = self
                    .registry
                    .find_module_by_uid(uid)
                    .map(|m| (m.assigned_code.clone(), m.display_name.clone(), m.cached_stock));
                match known {
                    Some((code, name, stock)) => {
                        self.registry.add_module(address, uid, code.as_deref(), &name, stock)
                    }
                    None => self.registry.add_module(address, uid, None, UNASSIGNED_NAME, 0),
                }
                false
            }
        }
    }

    /// Name and stock for an assignment, falling back to a placeholder.
    fn catalog_entry(&self, code: Option<&str>) -> (String, u32) {
        match code.and_then(|c| self.registry.find_product(c)) {
            Some(product) => (product.name.clone(), product.stock),
            None if code.is_some() => (REGISTERED_NAME.to_string(), 0),
            None => (UNASSIGNED_NAME.to_string(), 0),
        }
    }

    // =========================================================================
    // Ledger Sync
    // =========================================================================

    /// Pulls the catalog and UID assignments from the ledger.
    ///
    /// A failure is logged as `LedgerSyncFailed` and returned; the registry
    /// keeps whatever it had.
    pub fn sync_from_ledger(&mut self) -> LedgerResult<()> {
        let products = match self.ledger.fetch_all_products() {
            Ok(products) => products,
            Err(err) => {
                record_ledger_failure(self.registry, "fetch_all_products", &err);
                return Err(err);
            }
        };
        for product in &products {
            self.registry
                .add_product(&product.code, &product.name, product.stock, product.available);
        }

        let assignments = match self.ledger.fetch_module_assignments() {
            Ok(rows) => rows,
            Err(err) => {
                record_ledger_failure(self.registry, "fetch_module_assignments", &err);
                return Err(err);
            }
        };

        for row in &assignments {
            let code = row.code.as_deref().filter(|c| !c.is_empty());

            if let Some(code) = code {
                if !self.registry.validate_product_exists(code) {
                    warn!(uid = %row.uid, code, "Assignment references unknown product");
                    self.registry.log_error(
                        ErrorKind::InvalidProduct,
                        format!("Dangling assignment to {}", code),
                        row.uid.clone(),
                    );
                }
            }

            let (name, stock) = self.catalog_entry(code);

            if self.registry.find_module_by_uid(&row.uid).is_some() {
                self.registry.assign_module(&row.uid, code, &name);
                continue;
            }

            // Not on the bus (yet): keep an offline placeholder at its last
            // known address so selecting its code reports ModuleOffline.
            if let Some(address) = row.address {
                self.registry.add_placeholder(address, &row.uid, code, &name, stock);
            }
        }

        info!(
            products = products.len(),
            assignments = assignments.len(),
            "Ledger sync complete"
        );
        Ok(())
    }

    // =========================================================================
    // Cache Maintenance
    // =========================================================================

    /// Mirrors product name and stock into every assigned module's cache.
    pub fn reconcile(&mut self) {
        let updates: Vec<(u8, String, u32)> = self
            .registry
            .modules()
            .iter()
            .filter_map(|m| {
                let product = self.registry.find_product(m.code()?)?;
                Some((m.address, product.name.clone(), product.stock))
            })
            .collect();

        for (address, name, stock) in updates {
            if let Some(module) = self.registry.module_mut(address) {
                module.display_name = name;
                module.cached_stock = stock;
            }
        }
    }

    /// Pushes name and stock to every online, assigned module.
    pub fn sync_displays(&mut self) {
        let targets: Vec<(u8, String, u32)> = self
            .registry
            .modules()
            .iter()
            .filter(|m| m.online && m.is_assigned())
            .map(|m| (m.address, m.display_name.clone(), m.cached_stock))
            .collect();

        for (address, name, stock) in targets {
            match self.bus.update_display(address, &name, stock) {
                Ok(()) => self.registry.update_module_health(address, true),
                Err(err) => {
                    warn!(address = %address_tag(address), error = %err, "Display update failed");
                    record_bus_failure(self.registry, &err);
                    self.registry.update_module_health(address, false);
                }
            }
        }
    }

    /// Polls every known module's stock counter.
    pub fn check_health(&mut self) {
        let modules: Vec<(u8, bool, Option<String>)> = self
            .registry
            .modules()
            .iter()
            .map(|m| (m.address, m.online, m.assigned_code.clone()))
            .collect();

        for (address, was_online, code) in modules {
            let tag = address_tag(address);

            match self.bus.get_stock(address) {
                Ok(reported) => {
                    self.registry.update_module_health(address, true);
                    self.registry.update_module_stock(address, reported);

                    let expected = code
                        .as_deref()
                        .and_then(|c| self.registry.find_product(c))
                        .map(|p| p.stock);
                    if let Some(expected) = expected.filter(|&e| e != reported) {
                        let message = format!("Module reports {}, ledger has {}", reported, expected);
                        warn!(address = %tag, %message, "Stock mismatch");
                        self.registry.log_error(ErrorKind::StockMismatch, message, tag);
                    }
                }
                Err(err) => {
                    if was_online {
                        warn!(address = %tag, error = %err, "Module stopped answering");
                        self.registry.log_error(
                            ErrorKind::ModuleDisconnected,
                            err.to_string(),
                            tag,
                        );
                    } else {
                        debug!(address = %tag, "Module still offline");
                        record_bus_failure(self.registry, &err);
                    }
                    self.registry.update_module_health(address, false);
                }
            }
        }
    }
}
