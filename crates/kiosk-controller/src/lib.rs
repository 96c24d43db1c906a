//! # kiosk-controller: Discovery, Reconciliation and the FSM Engine
//!
//! Wires the pure core to the bus and the ledger.
//!
//! ## Loop Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Single Logical Thread                               │
//! │                                                                         │
//! │   loop {                                                                │
//! │     input = keypad.poll()          at most one per tick                 │
//! │     engine.step(input)             guard → transition → entry action    │
//! │                                    (blocking bus waits happen here)     │
//! │                                    then time checks: dwell, deadline,   │
//! │                                    periodic ledger sync                 │
//! │   }                                                                     │
//! │                                                                         │
//! │   Registry, FSM state and bus are touched only from this loop.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - FSM engine with guards, entry/exit actions and timers
//! - [`discovery`] - Bus sweep, UID resolution, ledger sync, health polls
//! - [`config`] - TOML/env configuration
//! - [`display`] - Screens and display sinks
//! - [`keypad`] - Raw key mapping
//! - [`error`] - Controller error types

pub mod config;
pub mod discovery;
pub mod display;
pub mod engine;
pub mod error;
pub mod keypad;

pub use config::KioskConfig;
pub use discovery::{DiscoveryReport, Reconciler};
pub use display::{DisplaySink, MemoryDisplay, NoOpDisplay, Screen};
pub use engine::{Engine, TransactionContext};
pub use error::{ControllerError, ControllerResult};
pub use keypad::{Input, Keymap};
