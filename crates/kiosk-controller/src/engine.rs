//! # FSM Engine
//!
//! Event-driven controller over the customer transaction.
//!
//! ## Dispatch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         dispatch(event)                                 │
//! │                                                                         │
//! │   target = table.next(state, event)        (pure data)                  │
//! │        │                                                                │
//! │   guard(state, event)                      (only place with I/O)        │
//! │        ├── Proceed  ──► exit(state) ─► enter(target)                    │
//! │        ├── Stay     ──► nothing                                         │
//! │        └── Handled  ──► guard already drove nested transitions          │
//! │                                                                         │
//! │   tick()                                                                │
//! │        ├── Idle:                 now - last_sync ≥ interval → SyncTimeout│
//! │        ├── AwaitingConfirmation: now > deadline           → Timeout     │
//! │        └── dwell states:         now > entered + dwell    → Timeout     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the caller's thread. A guard that talks to the bus
//! blocks until the bus operation finishes, so no input is sampled while a
//! dispense is in flight.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kiosk_bus::{BusError, BusMaster, Clock};
use kiosk_core::{address_tag, ErrorKind, Event, Registry, State, TransactionRecord, TransitionTable};
use kiosk_ledger::{Ledger, LedgerError};
use tracing::{debug, error, info, warn};

use crate::config::KioskConfig;
use crate::discovery::{record_bus_failure, record_ledger_failure, DiscoveryReport, Reconciler};
use crate::display::{DisplaySink, Screen};
use crate::error::{ControllerError, ControllerResult};
use crate::keypad::Input;

// =============================================================================
// Transaction Context
// =============================================================================

/// Per-transaction state owned by the engine.
///
/// Reset on every entry into `Idle` or `SelectingItem`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionContext {
    /// Characters typed so far.
    pub input: String,

    /// Product code resolved on submit.
    pub selected_code: Option<String>,

    /// Address of the module that will dispense.
    pub selected_module: Option<u8>,

    /// Confirmation deadline, set while in `AwaitingConfirmation`.
    pub confirm_deadline: Option<Duration>,

    /// Fault to show when `Error` is entered.
    pub fault: Option<(ErrorKind, String)>,
}

/// Result of a state's guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Proceed,
    Stay,
    Handled,
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    config: KioskConfig,
    table: TransitionTable,
    registry: Registry,
    bus: BusMaster,
    ledger: Arc<dyn Ledger>,
    display: Arc<dyn DisplaySink>,
    clock: Arc<dyn Clock>,

    state: State,
    entered_at: Duration,
    last_sync: Duration,
    context: TransactionContext,
    screen: Screen,

    /// Stock writes the ledger refused, by product code. Retried on every
    /// sync and held over the ledger's stale value until they land.
    pending_stock: BTreeMap<String, u32>,
}

impl Engine {
    /// Creates an engine in `Idle` with an empty registry. Call
    /// [`boot`](Self::boot) before feeding input.
    pub fn new(
        config: KioskConfig,
        bus: BusMaster,
        ledger: Arc<dyn Ledger>,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        let clock = bus.clock().clone();
        let now = clock.now();

        Engine {
            config,
            table: TransitionTable::standard(),
            registry: Registry::new(),
            bus,
            ledger,
            display,
            clock,
            state: State::Idle,
            entered_at: now,
            last_sync: now,
            context: TransactionContext::default(),
            screen: Screen::welcome(),
            pending_stock: BTreeMap::new(),
        }
    }

    /// Replaces the transition table.
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> State {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable registry access for seeding and maintenance. Not for use
    /// while a transaction is in flight.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    /// What the display currently shows.
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Discovers modules, syncs the ledger, refreshes caches and displays,
    /// then enters `Idle`.
    pub fn boot(&mut self) -> DiscoveryReport {
        info!(device = %self.config.device.name, "Booting kiosk controller");
        let report = self.full_sync();
        self.enter(State::Idle);
        report
    }

    /// Clears the registry and repeats the boot sweep.
    ///
    /// ## Errors
    /// - `TransactionInFlight` unless the engine is `Idle`
    pub fn rescan(&mut self) -> ControllerResult<DiscoveryReport> {
        if self.state != State::Idle {
            return Err(ControllerError::TransactionInFlight {
                state: format!("{:?}", self.state),
            });
        }

        info!("Full rescan requested");
        self.registry.clear();
        Ok(self.full_sync())
    }

    fn full_sync(&mut self) -> DiscoveryReport {
        let addresses = self.config.bus.scan_addresses();
        self.flush_pending_stock();

        // Catalog first so discovery can name what it finds.
        let synced = Reconciler::new(&mut self.registry, &mut self.bus, self.ledger.as_ref())
            .sync_from_ledger();
        if let Err(err) = synced {
            warn!(error = %err, "Starting without ledger data");
        }
        self.hold_pending_stock();

        let mut reconciler = Reconciler::new(&mut self.registry, &mut self.bus, self.ledger.as_ref());
        let report = reconciler.discover(addresses);
        reconciler.reconcile();
        reconciler.sync_displays();

        self.last_sync = self.clock.now();
        report
    }

    // =========================================================================
    // Loop Interface
    // =========================================================================

    /// One loop iteration: apply at most one input, then run the current
    /// state's time check.
    pub fn step(&mut self, input: Option<Input>) {
        if let Some(input) = input {
            self.handle_input(input);
        }
        self.tick();
    }

    pub fn handle_input(&mut self, input: Input) {
        match input {
            Input::Char(c) => self.on_char(c),
            Input::Submit => self.dispatch(Event::Submit),
            Input::Cancel => self.dispatch(Event::Cancel),
        }
    }

    /// Time-based transitions. Evaluated once per loop tick.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        match self.state {
            State::Idle => {
                if now.saturating_sub(self.last_sync) >= self.config.timing.sync_interval() {
                    self.dispatch(Event::SyncTimeout);
                }
            }
            State::AwaitingConfirmation => {
                if self.context.confirm_deadline.is_some_and(|deadline| now > deadline) {
                    info!(code = ?self.context.selected_code, "Confirmation window expired");
                    self.dispatch(Event::Timeout);
                }
            }
            state => {
                if let Some(dwell) = self.config.timing.dwell(state) {
                    if now > self.entered_at + dwell {
                        self.dispatch(Event::Timeout);
                    }
                }
            }
        }
    }

    /// Feeds one event through guard and table.
    pub fn dispatch(&mut self, event: Event) {
        let target = self.table.next(self.state, event);

        match self.guard(event) {
            Guard::Proceed => {
                if target != self.state {
                    self.enter(target);
                }
            }
            Guard::Stay => debug!(state = ?self.state, ?event, "Transition vetoed"),
            Guard::Handled => {}
        }
    }

    fn on_char(&mut self, c: char) {
        match self.state {
            State::Idle => {
                self.dispatch(Event::Char);
                if self.state == State::SelectingItem {
                    self.push_char(c);
                }
            }
            State::SelectingItem => self.push_char(c),
            _ => self.dispatch(Event::Char),
        }
    }

    fn push_char(&mut self, c: char) {
        if self.context.input.chars().count() >= self.config.keypad.max_code_len {
            return;
        }
        self.context.input.push(c);
        let screen = Screen::code_entry(&self.context.input);
        self.show(screen);
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn guard(&mut self, event: Event) -> Guard {
        match (self.state, event) {
            (State::Idle, Event::SyncTimeout) => {
                self.periodic_sync();
                Guard::Handled
            }
            (State::SelectingItem, Event::Submit) => self.resolve_selection(),
            (State::AwaitingConfirmation, Event::Submit) => self.confirm_dispense(),
            // The dispense has been sent; nothing can call it back.
            (State::Dispensing, Event::Cancel) => Guard::Stay,
            _ => Guard::Proceed,
        }
    }

    /// Ledger resync, health poll, cache refresh and display push.
    fn periodic_sync(&mut self) {
        debug!("Periodic sync");
        self.flush_pending_stock();

        let synced = Reconciler::new(&mut self.registry, &mut self.bus, self.ledger.as_ref())
            .sync_from_ledger();
        if let Err(err) = synced {
            debug!(error = %err, "Periodic sync kept cached catalog");
        }
        self.hold_pending_stock();

        let mut reconciler = Reconciler::new(&mut self.registry, &mut self.bus, self.ledger.as_ref());
        reconciler.check_health();
        reconciler.reconcile();
        reconciler.sync_displays();
        self.last_sync = self.clock.now();
    }

    /// Retries stock writes the ledger refused earlier.
    fn flush_pending_stock(&mut self) {
        let pending = std::mem::take(&mut self.pending_stock);

        for (code, stock) in pending {
            match self.ledger.update_stock(&code, stock) {
                Ok(()) => info!(code = %code, stock, "Deferred stock update written"),
                Err(err @ LedgerError::NotFound { .. }) => {
                    warn!(code = %code, error = %err, "Dropping deferred stock update");
                }
                Err(err) => {
                    debug!(code = %code, error = %err, "Deferred stock update still pending");
                    self.pending_stock.insert(code, stock);
                }
            }
        }
    }

    /// Keeps locally committed stock over what a resync just read.
    fn hold_pending_stock(&mut self) {
        for (code, &stock) in &self.pending_stock {
            self.registry.set_product_stock(code, stock);
        }
    }

    /// `SelectingItem` + submit: resolve the typed code against the registry
    /// and drive the availability check.
    fn resolve_selection(&mut self) -> Guard {
        let code = self.context.input.clone();
        if code.is_empty() {
            return Guard::Stay;
        }

        let module = self
            .registry
            .find_module_by_code(&code)
            .map(|m| (m.address, m.online, m.cached_stock));
        let available = self.registry.find_product(&code).map_or(true, |p| p.available);

        match module {
            None => {
                self.note_fault(ErrorKind::InvalidProduct, "Code not found", &code);
                self.dispatch(Event::ProductNotFound);
            }
            Some(_) if !available => {
                self.note_fault(ErrorKind::InvalidProduct, "Not available", &code);
                self.dispatch(Event::ProductNotFound);
            }
            Some((address, false, _)) => {
                self.note_fault(ErrorKind::ModuleOffline, "Module offline", &address_tag(address));
                self.dispatch(Event::ErrorOccurred);
            }
            Some((address, true, stock)) => {
                info!(code = %code, address = %address_tag(address), stock, "Product selected");
                self.context.selected_code = Some(code);
                self.context.selected_module = Some(address);

                self.dispatch(Event::ProductFound);
                if self.state == State::CheckingAvailability {
                    let event = if stock > 0 {
                        Event::StockAvailable
                    } else {
                        Event::StockEmpty
                    };
                    self.dispatch(event);
                }
            }
        }

        Guard::Handled
    }

    /// `AwaitingConfirmation` + submit: run the dispense and commit it.
    fn confirm_dispense(&mut self) -> Guard {
        let (Some(code), Some(address)) =
            (self.context.selected_code.clone(), self.context.selected_module)
        else {
            self.note_fault(ErrorKind::InvalidProduct, "No product selected", "");
            self.dispatch(Event::ErrorOccurred);
            return Guard::Handled;
        };

        let target = self.table.next(self.state, Event::Submit);
        if target != State::Dispensing {
            return Guard::Proceed;
        }

        self.enter(target);
        let tag = address_tag(address);

        match self.bus.dispense(address) {
            Ok(()) => {
                info!(code = %code, address = %tag, "Dispense acknowledged");
                self.commit_dispense(&code, address);
                self.dispatch(Event::DispenseAck);
            }
            Err(err @ BusError::ModuleRejected { .. }) => {
                warn!(code = %code, address = %tag, "Module declined dispense");
                record_bus_failure(&mut self.registry, &err);
                self.registry.update_module_health(address, true);
                self.dispatch(Event::DispenseError);
            }
            Err(err) => {
                error!(code = %code, address = %tag, error = %err, "Dispense failed");
                self.registry.update_module_health(address, false);
                self.note_fault(err.kind(), &err.to_string(), &tag);
                self.dispatch(Event::ErrorOccurred);
            }
        }

        Guard::Handled
    }

    /// Applies a completed dispense to the registry and the ledger.
    ///
    /// The physical dispense already happened: ledger and display failures
    /// are logged and never undo it.
    fn commit_dispense(&mut self, code: &str, address: u8) {
        let remaining = match self.registry.decrement_stock(code) {
            Some(stock) => stock,
            None => {
                let cached = self
                    .registry
                    .find_module_by_address(address)
                    .map_or(0, |m| m.cached_stock);
                self.registry.log_error(
                    ErrorKind::StockMismatch,
                    format!("No product record for dispensed code {}", code),
                    address_tag(address),
                );
                cached.saturating_sub(1)
            }
        };

        self.registry.update_module_stock(address, remaining);
        self.registry.update_module_health(address, true);

        let record = TransactionRecord::dispensed(code, 1);
        if let Err(err) = self.ledger.append_transaction(&record) {
            record_ledger_failure(&mut self.registry, "append_transaction", &err);
        }
        match self.ledger.update_stock(code, remaining) {
            Ok(()) => {
                self.pending_stock.remove(code);
            }
            Err(err) => {
                record_ledger_failure(&mut self.registry, "update_stock", &err);
                self.pending_stock.insert(code.to_string(), remaining);
            }
        }

        let name = self
            .registry
            .find_product(code)
            .map(|p| p.name.clone())
            .or_else(|| {
                self.registry
                    .find_module_by_address(address)
                    .map(|m| m.display_name.clone())
            })
            .unwrap_or_default();

        if let Err(err) = self.bus.update_display(address, &name, remaining) {
            warn!(address = %address_tag(address), error = %err, "Display refresh after dispense failed");
            record_bus_failure(&mut self.registry, &err);
            self.registry.update_module_health(address, false);
        }
    }

    /// Logs a fault and keeps it for the `Error` screen.
    fn note_fault(&mut self, kind: ErrorKind, message: &str, affected: &str) {
        warn!(kind = %kind, message, affected, "Fault");
        self.registry.log_error(kind, message, affected);
        self.context.fault = Some((kind, message.to_string()));
    }

    // =========================================================================
    // Entry / Exit Actions
    // =========================================================================

    fn enter(&mut self, target: State) {
        let from = self.state;

        if from == State::AwaitingConfirmation {
            self.context.confirm_deadline = None;
        }

        self.state = target;
        self.entered_at = self.clock.now();
        info!(from = ?from, to = ?target, "State transition");

        let screen = match target {
            State::Idle => {
                self.context = TransactionContext::default();
                Screen::welcome()
            }
            State::SelectingItem => {
                self.context = TransactionContext::default();
                Screen::code_entry("")
            }
            State::CheckingAvailability => Screen::checking(),
            State::AwaitingConfirmation => {
                self.context.confirm_deadline =
                    Some(self.entered_at + self.config.timing.payment_timeout());
                Screen::ready(&self.selected_name())
            }
            State::Dispensing => Screen::dispensing(),
            State::ThankYou => Screen::thank_you(),
            State::OutOfStock => Screen::out_of_stock(),
            State::Cancelled => Screen::cancelled(),
            State::Error => self.enter_error(),
        };

        self.show(screen);
    }

    fn enter_error(&mut self) -> Screen {
        let (kind, message) = self.context.fault.clone().unwrap_or_else(|| {
            self.registry
                .last_error()
                .map(|e| (e.kind, e.message.clone()))
                .unwrap_or((ErrorKind::OperationTimeout, "Unknown fault".to_string()))
        });

        let title = format!("ERROR:{} {}", kind.code(), kind);
        if let Err(err) = self.ledger.append_error(&title, &message) {
            record_ledger_failure(&mut self.registry, "append_error", &err);
        }

        Screen::error(kind, &message)
    }

    fn selected_name(&self) -> String {
        let code = self.context.selected_code.as_deref().unwrap_or_default();
        self.registry
            .find_product(code)
            .map(|p| p.name.clone())
            .or_else(|| {
                self.context
                    .selected_module
                    .and_then(|a| self.registry.find_module_by_address(a))
                    .map(|m| m.display_name.clone())
            })
            .unwrap_or_else(|| code.to_string())
    }

    fn show(&mut self, screen: Screen) {
        self.display.show(&screen);
        self.screen = screen;
    }
}
