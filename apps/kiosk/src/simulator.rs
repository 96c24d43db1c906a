//! # Simulated Hardware
//!
//! The `[simulator]` table of `kiosk.toml` describes the modules plugged
//! into the simulated bus, and seeds a fresh ledger with matching rows.
//!
//! ```toml
//! [[simulator.modules]]
//! address = 0x10
//! uid = "PRD_MOD_01"
//! name = "Soda"
//! stock = 5
//! code = "A1"
//! ```
//!
//! A module without `code` is plugged in but unknown to the ledger, so
//! discovery registers it as new.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use kiosk_bus::{Clock, SimulatedBus, SimulatedModule, DISPLAY_ADDRESS};
use kiosk_ledger::document::LedgerDocument;
use kiosk_ledger::{LedgerProduct, MemoryLedger, ModuleAssignment};
use serde::Deserialize;
use tracing::{debug, info};

/// One simulated module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleSpec {
    pub address: u8,
    pub uid: String,
    pub name: String,
    pub stock: u32,

    /// Product the ledger assigns to this module. `None` leaves the module
    /// out of the seeded ledger.
    #[serde(default)]
    pub code: Option<String>,
}

impl ModuleSpec {
    fn new(address: u8, uid: &str, name: &str, stock: u32, code: Option<&str>) -> Self {
        ModuleSpec {
            address,
            uid: uid.to_string(),
            name: name.to_string(),
            stock,
            code: code.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "demo_modules")]
    pub modules: Vec<ModuleSpec>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            modules: demo_modules(),
        }
    }
}

fn demo_modules() -> Vec<ModuleSpec> {
    vec![
        ModuleSpec::new(0x10, "PRD_MOD_01", "Soda", 5, Some("A1")),
        ModuleSpec::new(0x11, "PRD_MOD_02", "Chips", 3, Some("B2")),
        ModuleSpec::new(0x12, "PRD_MOD_03", "Candy Bar", 0, Some("C3")),
    ]
}

/// Only the table this binary owns; the rest of the file is `KioskConfig`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    simulator: SimulatorConfig,
}

impl SimulatorConfig {
    /// Reads `[simulator]` from the kiosk config file, falling back to the
    /// demo modules when the file or the table is absent.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            debug!("No config file, using demo modules");
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing [simulator] in {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(file.simulator)
    }

    /// Builds the bus: every module plus the customer display peripheral.
    pub fn build_bus(&self, clock: Arc<dyn Clock>) -> SimulatedBus {
        let bus = SimulatedBus::new(clock);
        bus.add_peripheral(DISPLAY_ADDRESS);

        for spec in &self.modules {
            bus.attach(spec.address, SimulatedModule::new(&spec.uid, &spec.name, spec.stock));
        }

        info!(modules = self.modules.len(), "Simulated bus ready");
        bus
    }

    /// Catalog and assignments for every module that has a code.
    pub fn seed_document(&self) -> LedgerDocument {
        let mut document = LedgerDocument::default();

        for spec in &self.modules {
            let Some(code) = &spec.code else { continue };

            let mut product = LedgerProduct::new(code, &spec.name, spec.stock);
            product.module_address_hint = Some(spec.address);
            document.products.push(product);
            document.modules.push(ModuleAssignment {
                uid: spec.uid.clone(),
                address: Some(spec.address),
                code: Some(code.clone()),
            });
        }

        document
    }

    pub fn seed_memory(&self) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        let document = self.seed_document();

        for product in document.products {
            ledger.add_product(product);
        }
        for row in document.modules {
            ledger.assign(&row.uid, row.address, row.code.as_deref());
        }

        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_bus::ManualClock;
    use kiosk_ledger::Ledger;

    #[test]
    fn test_missing_table_uses_demo_modules() {
        let config = SimulatorConfig::parse("[device]\nname = \"Lobby\"\n").unwrap();
        assert_eq!(config, SimulatorConfig::default());
    }

    #[test]
    fn test_parse_modules() {
        let config = SimulatorConfig::parse(
            r#"
            [[simulator.modules]]
            address = 0x20
            uid = "PRD_MOD_20"
            name = "Water"
            stock = 7
            code = "D4"

            [[simulator.modules]]
            address = 0x21
            uid = "PRD_MOD_21"
            name = "Spare"
            stock = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[0].code.as_deref(), Some("D4"));
        assert_eq!(config.modules[1].code, None);

        let document = config.seed_document();
        assert_eq!(document.products.len(), 1);
        assert_eq!(document.modules[0].uid, "PRD_MOD_20");
    }

    #[test]
    fn test_bus_and_ledger_agree() {
        let config = SimulatorConfig::default();
        let bus = config.build_bus(Arc::new(ManualClock::new()));
        let ledger = config.seed_memory();

        assert_eq!(bus.module(0x10).unwrap().uid, "PRD_MOD_01");
        let row = ledger.is_module_registered("PRD_MOD_01").unwrap().unwrap();
        assert_eq!(row.code.as_deref(), Some("A1"));
        assert_eq!(ledger.stock_of("C3"), Some(0));
    }
}
