//! # Ledger Interface

use kiosk_core::TransactionRecord;
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

/// A catalog row as the ledger stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProduct {
    pub code: String,
    pub name: String,
    pub stock: u32,

    #[serde(default = "default_true")]
    pub available: bool,

    /// Where the operator last saw this product on the bus. Informational:
    /// assignments are resolved by UID.
    #[serde(default)]
    pub module_address_hint: Option<u8>,
}

fn default_true() -> bool {
    true
}

impl LedgerProduct {
    pub fn new(code: impl Into<String>, name: impl Into<String>, stock: u32) -> Self {
        LedgerProduct {
            code: code.into(),
            name: name.into(),
            stock,
            available: true,
            module_address_hint: None,
        }
    }
}

/// Which product a physical module (by UID) dispenses.
///
/// `code: None` is a registered module waiting for an operator to assign a
/// product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAssignment {
    pub uid: String,

    #[serde(default)]
    pub address: Option<u8>,

    #[serde(default)]
    pub code: Option<String>,
}

/// The remote system of record.
///
/// All methods take `&self`: implementations own their synchronization so
/// a handle can be shared behind `Arc<dyn Ledger>`.
pub trait Ledger: Send + Sync {
    /// Entire product catalog.
    fn fetch_all_products(&self) -> LedgerResult<Vec<LedgerProduct>>;

    /// Every known module, assigned or not.
    fn fetch_module_assignments(&self) -> LedgerResult<Vec<ModuleAssignment>>;

    /// Overwrites the stock count of one product.
    fn update_stock(&self, code: &str, new_stock: u32) -> LedgerResult<()>;

    /// Journals one dispense.
    fn append_transaction(&self, record: &TransactionRecord) -> LedgerResult<()>;

    /// Journals one fault.
    fn append_error(&self, message: &str, details: &str) -> LedgerResult<()>;

    /// Records a UID seen on the bus for the first time.
    fn register_new_module(&self, uid: &str, address: u8) -> LedgerResult<()>;

    /// Looks a UID up. `Some` means registered, with its last known address
    /// and assignment.
    fn is_module_registered(&self, uid: &str) -> LedgerResult<Option<ModuleAssignment>>;
}
