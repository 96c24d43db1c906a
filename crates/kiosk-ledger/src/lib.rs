//! # kiosk-ledger: Remote Ledger Collaborator
//!
//! Typed interface to the remote system of record, plus two local
//! implementations.
//!
//! ## Call Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Queries (result matters)          Fire-and-forget (logged only)       │
//! │   ────────────────────────          ─────────────────────────────       │
//! │   fetch_all_products                append_transaction                  │
//! │   fetch_module_assignments          append_error                        │
//! │   is_module_registered              register_new_module                 │
//! │   update_stock                                                          │
//! │                                                                         │
//! │   A failed ledger call never rolls back a dispense that already        │
//! │   happened: the physical action wins, the ledger is an audit trail.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`ledger`] - The [`Ledger`] trait and its record types
//! - [`memory`] - In-memory ledger with call recording
//! - [`file`] - JSON-file-backed ledger
//! - [`document`] - The serialized ledger document shared by both
//! - [`error`] - Ledger error types

pub mod document;
pub mod error;
pub mod file;
pub mod ledger;
pub mod memory;

pub use error::{LedgerError, LedgerResult};
pub use file::FileLedger;
pub use ledger::{Ledger, LedgerProduct, ModuleAssignment};
pub use memory::MemoryLedger;
