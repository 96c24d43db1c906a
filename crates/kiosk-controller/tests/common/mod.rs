//! Shared fixture: a booted engine over a simulated bus, an in-memory
//! ledger and a recording display, all on virtual time.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kiosk_bus::{BusMaster, ManualClock, SimulatedBus, SimulatedModule};
use kiosk_controller::{Engine, Input, KioskConfig, MemoryDisplay};
use kiosk_ledger::{LedgerProduct, MemoryLedger};

pub struct Kiosk {
    pub clock: Arc<ManualClock>,
    pub bus: SimulatedBus,
    pub ledger: MemoryLedger,
    pub display: MemoryDisplay,
    pub engine: Engine,
}

/// Module 0x10 ("PRD_MOD_01") sells A1 "Soda" with `stock` items.
pub fn kiosk(stock: u32) -> Kiosk {
    kiosk_with(stock, KioskConfig::default(), |_, _| {})
}

pub fn kiosk_with(
    stock: u32,
    config: KioskConfig,
    setup: impl FnOnce(&SimulatedBus, &MemoryLedger),
) -> Kiosk {
    let clock = Arc::new(ManualClock::new());
    let bus = SimulatedBus::new(clock.clone());
    bus.attach(0x10, SimulatedModule::new("PRD_MOD_01", "Soda", stock));
    bus.add_peripheral(0x27);

    let ledger = MemoryLedger::new();
    ledger.add_product(LedgerProduct::new("A1", "Soda", stock));
    ledger.assign("PRD_MOD_01", Some(0x10), Some("A1"));

    setup(&bus, &ledger);

    let display = MemoryDisplay::new();
    let master = BusMaster::new(Box::new(bus.clone()), clock.clone(), config.bus.timings());
    let mut engine = Engine::new(
        config,
        master,
        Arc::new(ledger.clone()),
        Arc::new(display.clone()),
    );
    engine.boot();

    Kiosk {
        clock,
        bus,
        ledger,
        display,
        engine,
    }
}

impl Kiosk {
    pub fn press(&mut self, keys: &str) {
        for key in keys.chars() {
            let input = match key {
                '#' => Input::Submit,
                '*' => Input::Cancel,
                c => Input::Char(c),
            };
            self.engine.step(Some(input));
        }
    }

    /// Advances virtual time, then runs one idle tick.
    pub fn wait(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.engine.step(None);
    }

    pub fn product_stock(&self, code: &str) -> u32 {
        self.engine.registry().find_product(code).unwrap().stock
    }

    pub fn cached_stock(&self, address: u8) -> u32 {
        self.engine
            .registry()
            .find_module_by_address(address)
            .unwrap()
            .cached_stock
    }
}
