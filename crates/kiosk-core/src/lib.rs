//! # kiosk-core: Pure Domain Logic for the Vending Kiosk
//!
//! This crate is the **heart** of the kiosk controller. It contains the
//! data model, the in-memory registry and the static FSM transition table
//! as pure code with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kiosk Controller Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Keypad / Timer (external event source)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Input                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        kiosk-controller (FSM Engine, Discovery)                 │   │
//! │  └──────────┬──────────────────┬──────────────────────┬────────────┘   │
//! │             │                  │                      │                │
//! │  ┌──────────▼─────────┐ ┌──────▼───────────┐ ┌────────▼───────────┐    │
//! │  │ ★ kiosk-core ★     │ │ kiosk-bus        │ │ kiosk-ledger       │    │
//! │  │ Registry, FSM table│ │ module commands  │ │ remote books       │    │
//! │  │ NO I/O             │ │ retries, ACKs    │ │ stock, journal     │    │
//! │  └────────────────────┘ └──────────────────┘ └────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Module, ErrorLogEntry, ...)
//! - [`registry`] - Authoritative in-process store with bounded error log
//! - [`fsm`] - States, events and the total transition table
//! - [`error`] - Domain error types and the fault taxonomy
//! - [`validation`] - Keypad code and display name rules
//!
//! ## Example Usage
//!
//! ```rust
//! use kiosk_core::registry::Registry;
//!
//! let mut registry = Registry::new();
//! registry.add_product("A1", "Soda", 5, true);
//!
//! let product = registry.find_product("A1").unwrap();
//! assert_eq!(product.stock, 5);
//! assert!(product.available);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fsm;
pub mod registry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use fsm::{Event, State, TransitionTable};
pub use registry::Registry;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Capacity of the registry's error ring buffer.
///
/// Once full, every new entry evicts the oldest one.
pub const ERROR_LOG_CAPACITY: usize = 50;

/// Maximum number of characters a customer can type as a product code.
///
/// Matches the width of one line of the 20x4 character display.
pub const MAX_CODE_LEN: usize = 20;

/// Maximum number of name bytes carried by an UPDATE_DISPLAY command.
pub const MAX_DISPLAY_NAME_LEN: usize = 20;

/// Maximum length of a module UID reported by WHOAMI (excluding the NUL).
pub const MAX_UID_LEN: usize = 31;
