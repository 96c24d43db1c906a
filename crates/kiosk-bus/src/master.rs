//! # Bus Master
//!
//! Issues commands to modules and turns raw transfers into typed outcomes.
//!
//! ## Attempt Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     One Operation (e.g. DISPENSE)                       │
//! │                                                                         │
//! │   attempt 1..=N                                                         │
//! │   ┌──────────┐  fail  ┌──────────────┐                                 │
//! │   │  write   │ ─────► │ comm failure │ ──┐                             │
//! │   └────┬─────┘        └──────────────┘   │                             │
//! │        │ ok                              │  wait retry_delay           │
//! │   ┌────▼─────────────┐ nothing in time   │  (constant backoff)         │
//! │   │ poll for response│ ───► no response ─┤                             │
//! │   └────┬─────────────┘                   │                             │
//! │        │ bytes                           ▼                             │
//! │   ┌────▼─────┐  0xEE  ┌───────────────┐  next attempt                  │
//! │   │  decode  │ ─────► │ ModuleRejected│  (terminal, not retried)       │
//! │   └────┬─────┘        └───────────────┘                                │
//! │        │ ok                                                             │
//! │        ▼                                                                │
//! │      result                                                             │
//! │                                                                         │
//! │   Exhausted: last failure was silence → Timeout, else CommFailure.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All waiting goes through the injected [`Clock`]. The master never
//! touches the registry: callers log the final failure against the
//! address they were talking to.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::error::{BusError, BusResult};
use crate::protocol::{self, Ack, Command};
use crate::transport::BusTransport;
use crate::MAX_MODULE_ADDRESS;

// =============================================================================
// Timings
// =============================================================================

/// Response windows and retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusTimings {
    /// Response window for WHOAMI, GET_STOCK and UPDATE_DISPLAY.
    pub query_timeout: Duration,

    /// Response window for DISPENSE (the motor has to run).
    pub dispense_timeout: Duration,

    /// Attempts per operation, including the first.
    pub attempts: u32,

    /// Fixed wait between attempts.
    pub retry_delay: Duration,

    /// Wait between reads while polling for a response.
    pub poll_interval: Duration,
}

impl Default for BusTimings {
    fn default() -> Self {
        BusTimings {
            query_timeout: Duration::from_millis(250),
            dispense_timeout: Duration::from_millis(5000),
            attempts: 3,
            retry_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl BusTimings {
    fn timeout_for(&self, command: Command) -> Duration {
        match command {
            Command::Dispense => self.dispense_timeout,
            _ => self.query_timeout,
        }
    }
}

/// Why one attempt did not produce a result.
#[derive(Debug)]
enum AttemptFailure {
    Comm(String),
    NoResponse,
    Rejected,
}

// =============================================================================
// Bus Master
// =============================================================================

/// Master-side command driver.
///
/// ## Usage
/// ```rust
/// use std::sync::Arc;
/// use kiosk_bus::{BusMaster, BusTimings, ManualClock, SimulatedBus, SimulatedModule};
///
/// let clock = Arc::new(ManualClock::new());
/// let bus = SimulatedBus::new(clock.clone());
/// bus.attach(0x10, SimulatedModule::new("PRD_MOD_01", "Soda", 5));
///
/// let mut master = BusMaster::new(Box::new(bus), clock, BusTimings::default());
/// assert_eq!(master.whoami(0x10).unwrap(), "PRD_MOD_01");
/// master.dispense(0x10).unwrap();
/// assert_eq!(master.get_stock(0x10).unwrap(), 4);
/// ```
pub struct BusMaster {
    transport: Box<dyn BusTransport>,
    clock: Arc<dyn Clock>,
    timings: BusTimings,
}

impl BusMaster {
    pub fn new(transport: Box<dyn BusTransport>, clock: Arc<dyn Clock>, timings: BusTimings) -> Self {
        BusMaster {
            transport,
            clock,
            timings,
        }
    }

    pub fn timings(&self) -> &BusTimings {
        &self.timings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Zero-payload presence probe. Single attempt: a sweep touches every
    /// address and most of them are empty.
    pub fn probe(&mut self, address: u8) -> bool {
        if address > MAX_MODULE_ADDRESS {
            return false;
        }
        let present = self.transport.write(address, &[]).is_ok();
        trace!(address = %format!("{:#04x}", address), present, "Probe");
        present
    }

    /// Asks a module for its UID.
    pub fn whoami(&mut self, address: u8) -> BusResult<String> {
        self.execute(address, Command::Whoami, &[Command::Whoami.opcode()], |bytes| {
            protocol::decode_uid(bytes).ok_or_else(|| AttemptFailure::Comm("empty UID".into()))
        })
    }

    /// Reads the module's own stock counter.
    pub fn get_stock(&mut self, address: u8) -> BusResult<u32> {
        self.execute(address, Command::GetStock, &[Command::GetStock.opcode()], |bytes| {
            protocol::decode_stock(bytes)
                .ok_or_else(|| AttemptFailure::Comm(format!("short stock response ({} bytes)", bytes.len())))
        })
    }

    /// Pushes a name and stock count to the module's display.
    pub fn update_display(&mut self, address: u8, name: &str, stock: u32) -> BusResult<()> {
        let frame = protocol::encode_update_display(name, stock);
        self.execute(address, Command::UpdateDisplay, &frame, decode_ack)
    }

    /// Runs the dispense mechanism once.
    ///
    /// `Ok(())` means the module acknowledged a completed dispense. An error
    /// ACK comes back as [`BusError::ModuleRejected`] after a single attempt.
    pub fn dispense(&mut self, address: u8) -> BusResult<()> {
        self.execute(
            address,
            Command::Dispense,
            &protocol::encode_command(Command::Dispense),
            decode_ack,
        )
    }

    // =========================================================================
    // Attempt Loop
    // =========================================================================

    fn execute<T>(
        &mut self,
        address: u8,
        command: Command,
        frame: &[u8],
        decode: impl Fn(&[u8]) -> Result<T, AttemptFailure>,
    ) -> BusResult<T> {
        if address > MAX_MODULE_ADDRESS {
            return Err(BusError::InvalidRequest(format!(
                "address {:#04x} is outside the module range",
                address
            )));
        }

        let attempts = self.timings.attempts.max(1);
        let mut delay = Constant::new(self.timings.retry_delay);
        let mut last = AttemptFailure::NoResponse;
        let tag = format!("{:#04x}", address);

        for attempt in 1..=attempts {
            let outcome = self
                .attempt(address, command, frame)
                .and_then(|bytes| decode(&bytes));

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(address = %tag, op = %command, attempt, "Bus operation recovered");
                    }
                    return Ok(value);
                }
                Err(AttemptFailure::Rejected) => {
                    warn!(address = %tag, op = %command, "Module answered with error ACK");
                    return Err(BusError::ModuleRejected { address, op: command });
                }
                Err(failure) => {
                    debug!(address = %tag, op = %command, attempt, ?failure, "Bus attempt failed");
                    last = failure;
                }
            }

            if attempt < attempts {
                if let Some(wait) = delay.next_backoff() {
                    self.clock.sleep(wait);
                }
            }
        }

        warn!(address = %tag, op = %command, attempts, "Bus operation failed after retries");
        Err(match last {
            AttemptFailure::Comm(reason) => BusError::CommFailure {
                address,
                op: command,
                attempts,
                reason,
            },
            AttemptFailure::NoResponse | AttemptFailure::Rejected => BusError::Timeout {
                address,
                op: command,
                attempts,
            },
        })
    }

    /// One write followed by polling until bytes arrive or the window closes.
    fn attempt(&mut self, address: u8, command: Command, frame: &[u8]) -> Result<Vec<u8>, AttemptFailure> {
        self.transport
            .write(address, frame)
            .map_err(|e| AttemptFailure::Comm(e.to_string()))?;

        let deadline = self.clock.now() + self.timings.timeout_for(command);
        let poll = self.timings.poll_interval.max(Duration::from_millis(1));

        loop {
            let bytes = self
                .transport
                .read(address, command.response_len())
                .map_err(|e| AttemptFailure::Comm(e.to_string()))?;

            if !bytes.is_empty() {
                return Ok(bytes);
            }
            if self.clock.now() >= deadline {
                return Err(AttemptFailure::NoResponse);
            }
            self.clock.sleep(poll);
        }
    }
}

fn decode_ack(bytes: &[u8]) -> Result<(), AttemptFailure> {
    match Ack::parse(bytes) {
        Some(Ack::Success) => Ok(()),
        Some(Ack::Error) => Err(AttemptFailure::Rejected),
        None => Err(AttemptFailure::Comm(format!("unexpected ACK byte {:?}", bytes.first()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::{SimulatedBus, SimulatedModule};

    fn setup() -> (Arc<ManualClock>, SimulatedBus, BusMaster) {
        let clock = Arc::new(ManualClock::new());
        let bus = SimulatedBus::new(clock.clone());
        bus.attach(0x10, SimulatedModule::new("PRD_MOD_01", "Soda", 5));
        let master = BusMaster::new(Box::new(bus.clone()), clock.clone(), BusTimings::default());
        (clock, bus, master)
    }

    #[test]
    fn test_probe() {
        let (_, bus, mut master) = setup();
        bus.add_peripheral(0x27);

        assert!(master.probe(0x10));
        assert!(master.probe(0x27));
        assert!(!master.probe(0x11));
        assert!(!master.probe(0x80));
    }

    #[test]
    fn test_whoami_and_stock() {
        let (_, _, mut master) = setup();
        assert_eq!(master.whoami(0x10).unwrap(), "PRD_MOD_01");
        assert_eq!(master.get_stock(0x10).unwrap(), 5);
    }

    #[test]
    fn test_update_display_reaches_module() {
        let (_, bus, mut master) = setup();
        master.update_display(0x10, "Cola", 9).unwrap();

        let module = bus.module(0x10).unwrap();
        assert_eq!(module.display_name, "Cola");
        assert_eq!(module.stock, 9);
    }

    #[test]
    fn test_dispense_success_sends_one_frame() {
        let (_, bus, mut master) = setup();
        master.dispense(0x10).unwrap();

        assert_eq!(bus.count(0x10, Command::Dispense), 1);
        assert_eq!(bus.module(0x10).unwrap().stock, 4);
    }

    #[test]
    fn test_error_ack_is_not_retried() {
        let (_, bus, mut master) = setup();
        bus.update(0x10, |m| m.stock = 0);

        let err = master.dispense(0x10).unwrap_err();
        assert_eq!(
            err,
            BusError::ModuleRejected {
                address: 0x10,
                op: Command::Dispense
            }
        );
        assert_eq!(bus.count(0x10, Command::Dispense), 1);
    }

    #[test]
    fn test_silent_module_times_out_after_all_attempts() {
        let (clock, bus, mut master) = setup();
        bus.update(0x10, |m| m.silent = true);

        let err = master.get_stock(0x10).unwrap_err();
        assert!(matches!(err, BusError::Timeout { attempts: 3, .. }));
        assert_eq!(bus.count(0x10, Command::GetStock), 3);

        // Three 250ms windows plus two 100ms gaps, no wall-clock time spent.
        assert!(clock.now() >= Duration::from_millis(3 * 250 + 2 * 100));
    }

    #[test]
    fn test_dispense_uses_long_window() {
        let (clock, bus, mut master) = setup();
        bus.update(0x10, |m| m.latency = Duration::from_millis(1200));

        master.dispense(0x10).unwrap();
        assert_eq!(bus.count(0x10, Command::Dispense), 1);
        assert!(clock.now() >= Duration::from_millis(1200));
    }

    #[test]
    fn test_slow_query_times_out() {
        let (_, bus, mut master) = setup();
        bus.update(0x10, |m| m.latency = Duration::from_millis(1200));

        let err = master.whoami(0x10).unwrap_err();
        assert_eq!(err.kind(), kiosk_core::ErrorKind::OperationTimeout);
    }

    #[test]
    fn test_transient_write_failures_recover() {
        let (_, bus, mut master) = setup();
        bus.update(0x10, |m| m.failing_writes = 2);

        assert_eq!(master.get_stock(0x10).unwrap(), 5);
    }

    #[test]
    fn test_persistent_write_failures_are_comm_failures() {
        let (_, bus, mut master) = setup();
        bus.update(0x10, |m| m.failing_writes = 3);

        let err = master.dispense(0x10).unwrap_err();
        assert!(matches!(err, BusError::CommFailure { attempts: 3, .. }));
        assert_eq!(err.kind(), kiosk_core::ErrorKind::BusCommFailure);
        assert_eq!(bus.module(0x10).unwrap().stock, 5);
    }

    #[test]
    fn test_absent_address_is_comm_failure() {
        let (_, _, mut master) = setup();
        let err = master.whoami(0x11).unwrap_err();
        assert!(matches!(err, BusError::CommFailure { address: 0x11, .. }));
    }

    #[test]
    fn test_out_of_range_address_is_invalid() {
        let (_, _, mut master) = setup();
        assert!(matches!(master.dispense(0x7F), Err(BusError::InvalidRequest(_))));
    }
}
