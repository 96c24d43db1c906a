//! # File Ledger
//!
//! A ledger persisted as one JSON document on local disk. Useful for a
//! kiosk that runs without connectivity and for operators who want to
//! edit the catalog and module assignments by hand.
//!
//! ## Write Path
//! ```text
//! mutate in memory ──► serialize ──► <path>.tmp ──► rename(<path>.tmp, <path>)
//! ```
//! A crash mid-write leaves either the old or the new document, never a
//! truncated one. If persisting fails, the in-memory copy is rolled back
//! so memory and disk agree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kiosk_core::TransactionRecord;
use tracing::{debug, info};

use crate::document::LedgerDocument;
use crate::error::LedgerResult;
use crate::ledger::{Ledger, LedgerProduct, ModuleAssignment};

/// JSON-file-backed ledger.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    document: Mutex<LedgerDocument>,
}

impl FileLedger {
    /// Opens the ledger at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();

        let document = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let document: LedgerDocument = serde_json::from_str(&contents)?;
            info!(
                ?path,
                products = document.products.len(),
                modules = document.modules.len(),
                "Ledger file loaded"
            );
            document
        } else {
            info!(?path, "Ledger file not found, starting empty");
            LedgerDocument::default()
        };

        Ok(FileLedger {
            path,
            document: Mutex::new(document),
        })
    }

    /// Creates a ledger file holding `document`, replacing any existing one.
    pub fn create(path: impl Into<PathBuf>, document: LedgerDocument) -> LedgerResult<Self> {
        let ledger = FileLedger {
            path: path.into(),
            document: Mutex::new(document),
        };
        ledger.persist(&ledger.lock())?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current document.
    pub fn snapshot(&self) -> LedgerDocument {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, document: &LedgerDocument) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = ?self.path, "Ledger file written");
        Ok(())
    }

    /// Applies `change` and persists; on any failure the document is left
    /// as it was.
    fn mutate(&self, change: impl FnOnce(&mut LedgerDocument) -> LedgerResult<()>) -> LedgerResult<()> {
        let mut document = self.lock();
        let mut updated = document.clone();
        change(&mut updated)?;
        self.persist(&updated)?;
        *document = updated;
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn fetch_all_products(&self) -> LedgerResult<Vec<LedgerProduct>> {
        Ok(self.lock().products.clone())
    }

    fn fetch_module_assignments(&self) -> LedgerResult<Vec<ModuleAssignment>> {
        Ok(self.lock().modules.clone())
    }

    fn update_stock(&self, code: &str, new_stock: u32) -> LedgerResult<()> {
        self.mutate(|doc| doc.set_stock(code, new_stock))
    }

    fn append_transaction(&self, record: &TransactionRecord) -> LedgerResult<()> {
        self.mutate(|doc| {
            doc.push_transaction(record);
            Ok(())
        })
    }

    fn append_error(&self, message: &str, details: &str) -> LedgerResult<()> {
        self.mutate(|doc| {
            doc.push_error(message, details);
            Ok(())
        })
    }

    fn register_new_module(&self, uid: &str, address: u8) -> LedgerResult<()> {
        info!(uid, address = %format!("{:#04x}", address), "Registering new module");
        self.mutate(|doc| {
            doc.register(uid, address);
            Ok(())
        })
    }

    fn is_module_registered(&self, uid: &str) -> LedgerResult<Option<ModuleAssignment>> {
        Ok(self.lock().lookup(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use tempfile::TempDir;

    fn seeded(dir: &TempDir) -> FileLedger {
        let document = LedgerDocument {
            products: vec![LedgerProduct::new("A1", "Soda", 5)],
            modules: vec![ModuleAssignment {
                uid: "PRD_MOD_01".into(),
                address: Some(0x10),
                code: Some("A1".into()),
            }],
            ..Default::default()
        };
        FileLedger::create(dir.path().join("ledger.json"), document).unwrap()
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = FileLedger::open(dir.path().join("absent.json")).unwrap();
        assert!(ledger.fetch_all_products().unwrap().is_empty());
    }

    #[test]
    fn test_changes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let ledger = seeded(&dir);

        ledger.update_stock("A1", 4).unwrap();
        ledger
            .append_transaction(&TransactionRecord::dispensed("A1", 1))
            .unwrap();
        ledger.register_new_module("PRD_MOD_02", 0x11).unwrap();

        let reopened = FileLedger::open(ledger.path()).unwrap();
        let doc = reopened.snapshot();
        assert_eq!(doc.products[0].stock, 4);
        assert_eq!(doc.transactions.len(), 1);
        assert_eq!(doc.transactions[0].code, "A1");

        let row = reopened.is_module_registered("PRD_MOD_02").unwrap().unwrap();
        assert_eq!(row.address, Some(0x11));
        assert_eq!(row.code, None);
    }

    #[test]
    fn test_failed_update_leaves_document_unchanged() {
        let dir = TempDir::new().unwrap();
        let ledger = seeded(&dir);
        let before = ledger.snapshot();

        let err = ledger.update_stock("ZZ", 1).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let ledger = seeded(&dir);
        ledger.append_error("ERROR:3", "0x10").unwrap();

        assert!(!dir.path().join("ledger.json.tmp").exists());
        assert!(dir.path().join("ledger.json").exists());
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            FileLedger::open(&path),
            Err(LedgerError::Serialization(_))
        ));
    }
}
