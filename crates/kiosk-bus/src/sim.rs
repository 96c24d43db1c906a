//! # Simulated Module Bus
//!
//! In-process stand-in for the physical bus, used by the kiosk app when no
//! hardware is attached and by every test that needs modules.
//!
//! Each [`SimulatedModule`] answers the command set the way the module
//! firmware does: WHOAMI returns the NUL-terminated UID, GET_STOCK the
//! little-endian count, UPDATE_DISPLAY stores name and stock then ACKs,
//! DISPENSE decrements and ACKs `0x55` or answers `0xEE` when empty.
//!
//! ## Fault Injection
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────────────┐
//! │ offline          │ address NACKs (probe fails, every write fails)       │
//! │ silent           │ address ACKs, no response ever arrives               │
//! │ failing_writes   │ next N writes fail with a bus fault                  │
//! │ reject_dispense  │ DISPENSE answers 0xEE regardless of stock            │
//! │ latency          │ response becomes readable only after this long       │
//! │ add_peripheral   │ non-module device: ACKs probes, never answers        │
//! └──────────────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Handles are cheap clones over shared state, so a test keeps one handle
//! for assertions while the [`BusMaster`](crate::BusMaster) owns another.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::TransportError;
use crate::protocol::{self, Ack, Command};
use crate::transport::BusTransport;

// =============================================================================
// Simulated Module
// =============================================================================

/// Firmware-level state of one simulated module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedModule {
    pub uid: String,
    pub display_name: String,
    pub stock: u32,
    pub offline: bool,
    pub silent: bool,
    pub failing_writes: u32,
    pub reject_dispense: bool,
    pub latency: Duration,
}

impl SimulatedModule {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>, stock: u32) -> Self {
        SimulatedModule {
            uid: uid.into(),
            display_name: display_name.into(),
            stock,
            offline: false,
            silent: false,
            failing_writes: 0,
            reject_dispense: false,
            latency: Duration::ZERO,
        }
    }

    /// Executes one request frame, returning the response to queue.
    fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let (&opcode, payload) = frame.split_first()?;

        match Command::from_opcode(opcode)? {
            Command::Whoami => Some(protocol::encode_uid(&self.uid)),
            Command::GetStock => Some(protocol::encode_stock(self.stock)),
            Command::UpdateDisplay => {
                let ack = match protocol::decode_update_display(payload) {
                    Some((name, stock)) => {
                        self.display_name = name;
                        self.stock = u32::from(stock);
                        Ack::Success
                    }
                    None => Ack::Error,
                };
                Some(vec![ack.byte()])
            }
            Command::Dispense => {
                let ack = if self.reject_dispense || self.stock == 0 {
                    Ack::Error
                } else {
                    self.stock -= 1;
                    Ack::Success
                };
                Some(vec![ack.byte()])
            }
        }
    }
}

/// A frame the bus delivered to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFrame {
    pub address: u8,
    pub bytes: Vec<u8>,
}

impl BusFrame {
    /// The command this frame carried; `None` for probes.
    pub fn command(&self) -> Option<Command> {
        self.bytes.first().and_then(|&op| Command::from_opcode(op))
    }
}

// =============================================================================
// Simulated Bus
// =============================================================================

#[derive(Default)]
struct SimState {
    modules: BTreeMap<u8, SimulatedModule>,
    peripherals: BTreeSet<u8>,
    pending: HashMap<u8, (Duration, Vec<u8>)>,
    frames: Vec<BusFrame>,
}

/// Shared handle to a simulated bus.
#[derive(Clone)]
pub struct SimulatedBus {
    inner: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        SimulatedBus {
            inner: Arc::new(Mutex::new(SimState::default())),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plugs a module in at `address`, replacing whatever was there.
    pub fn attach(&self, address: u8, module: SimulatedModule) {
        let mut state = self.state();
        state.pending.remove(&address);
        state.modules.insert(address, module);
    }

    /// Unplugs the module at `address`.
    pub fn detach(&self, address: u8) -> Option<SimulatedModule> {
        let mut state = self.state();
        state.pending.remove(&address);
        state.modules.remove(&address)
    }

    /// Adds a non-module device that only acknowledges its address.
    pub fn add_peripheral(&self, address: u8) {
        self.state().peripherals.insert(address);
    }

    /// Mutates a module in place. Returns false if nothing is attached.
    pub fn update(&self, address: u8, f: impl FnOnce(&mut SimulatedModule)) -> bool {
        match self.state().modules.get_mut(&address) {
            Some(module) => {
                f(module);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the module at `address`.
    pub fn module(&self, address: u8) -> Option<SimulatedModule> {
        self.state().modules.get(&address).cloned()
    }

    /// Every frame delivered so far, oldest first.
    pub fn frames(&self) -> Vec<BusFrame> {
        self.state().frames.clone()
    }

    /// Number of delivered frames carrying `command` to `address`.
    pub fn count(&self, address: u8, command: Command) -> usize {
        self.state()
            .frames
            .iter()
            .filter(|f| f.address == address && f.command() == Some(command))
            .count()
    }

    pub fn clear_frames(&self) {
        self.state().frames.clear();
    }
}

impl BusTransport for SimulatedBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let now = self.clock.now();
        let mut guard = self.state();
        let state = &mut *guard;

        if state.peripherals.contains(&address) {
            state.frames.push(BusFrame {
                address,
                bytes: bytes.to_vec(),
            });
            return Ok(());
        }

        let module = match state.modules.get_mut(&address) {
            Some(module) if !module.offline => module,
            _ => return Err(TransportError::Nack(address)),
        };

        if module.failing_writes > 0 {
            module.failing_writes -= 1;
            return Err(TransportError::Fault("injected write failure".into()));
        }

        state.frames.push(BusFrame {
            address,
            bytes: bytes.to_vec(),
        });

        // A new request discards any unread answer to the previous one.
        state.pending.remove(&address);

        if bytes.is_empty() || module.silent {
            return Ok(());
        }

        if let Some(response) = module.handle(bytes) {
            state.pending.insert(address, (now + module.latency, response));
        }
        Ok(())
    }

    fn read(&mut self, address: u8, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let now = self.clock.now();
        let mut state = self.state();

        let reachable = state.peripherals.contains(&address)
            || state.modules.get(&address).is_some_and(|m| !m.offline);
        if !reachable {
            return Err(TransportError::Nack(address));
        }

        let ready = matches!(state.pending.get(&address), Some((ready_at, _)) if *ready_at <= now);
        if !ready {
            return Ok(Vec::new());
        }

        let mut response = state
            .pending
            .remove(&address)
            .map(|(_, bytes)| bytes)
            .unwrap_or_default();
        response.truncate(max_len);
        Ok(response)
    }
}
