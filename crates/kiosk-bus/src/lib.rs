//! # kiosk-bus: Module Bus Master
//!
//! Master-side driver for the addressed command/response bus shared by all
//! dispensing modules.
//!
//! ## Command Set
//! ```text
//! ┌──────────────────┬────────┬──────────────────────────┬────────────────────┐
//! │ Command          │ Opcode │ Request payload          │ Response           │
//! ├──────────────────┼────────┼──────────────────────────┼────────────────────┤
//! │ WHOAMI           │ 0x01   │ -                        │ UID, NUL-terminated│
//! │ GET_STOCK        │ 0x02   │ -                        │ u16 LE             │
//! │ UPDATE_DISPLAY   │ 0x03   │ len, name (≤20), u16 LE  │ ACK                │
//! │ DISPENSE         │ 0x10   │ -                        │ ACK                │
//! └──────────────────┴────────┴──────────────────────────┴────────────────────┘
//!   ACK: 0x55 success, 0xEE error. A zero-length write is a presence probe.
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Opcodes, ACK bytes and payload codecs
//! - [`transport`] - Byte-level transport trait
//! - [`master`] - Retrying command driver ([`BusMaster`])
//! - [`clock`] - Injectable time source
//! - [`sim`] - In-process simulated module bus
//! - [`error`] - Bus error types

pub mod clock;
pub mod error;
pub mod master;
pub mod protocol;
pub mod sim;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BusError, BusResult, TransportError};
pub use master::{BusMaster, BusTimings};
pub use protocol::{Ack, Command};
pub use sim::{SimulatedBus, SimulatedModule};
pub use transport::BusTransport;

/// Lowest address a module may occupy (0x00..0x07 are reserved by the bus).
pub const MIN_MODULE_ADDRESS: u8 = 0x08;

/// Highest address a module may occupy (0x78..0x7F are reserved by the bus).
pub const MAX_MODULE_ADDRESS: u8 = 0x77;

/// Address of the character display sharing the bus.
pub const DISPLAY_ADDRESS: u8 = 0x27;
