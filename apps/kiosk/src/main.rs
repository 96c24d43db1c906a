//! # Vending Kiosk
//!
//! Runs the kiosk controller against simulated modules.
//!
//! ## Usage
//! ```text
//! kiosk [CONFIG]
//!
//!   CONFIG   kiosk.toml path (default: platform config dir)
//!
//!   Type product codes on stdin: 0-9 and A-D, '#' to submit or
//!   confirm, '*' to cancel. One key is applied per tick.
//! ```
//!
//! ## Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stdin task ──keys──► mpsc ──try_recv (≤1 per tick)──► Engine::step    │
//! │                                                                         │
//! │  select! {                                                              │
//! │      interval.tick() => step                                            │
//! │      ctrl_c / SIGTERM => stop                                           │
//! │  }                                                                      │
//! │                                                                         │
//! │  stdin EOF: keep ticking until the engine is back in Idle, then stop    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod console;
mod simulator;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kiosk_bus::{BusMaster, Clock, SystemClock};
use kiosk_controller::{Engine, KioskConfig, Keymap};
use kiosk_core::State;
use kiosk_ledger::{FileLedger, Ledger};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleDisplay;
use crate::simulator::SimulatorConfig;

/// Loop period.
const TICK: Duration = Duration::from_millis(50);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(KioskConfig::default_config_path);

    let config = KioskConfig::load(config_path.clone()).context("loading kiosk config")?;
    let simulator = SimulatorConfig::load(config_path.as_deref())?;

    info!(
        device = %config.device.name,
        id = %config.device.id,
        modules = simulator.modules.len(),
        "Starting kiosk"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let bus = simulator.build_bus(clock.clone());
    let ledger = open_ledger(&config, &simulator)?;
    let master = BusMaster::new(Box::new(bus), clock, config.bus.timings());

    let mut engine = Engine::new(config.clone(), master, ledger, Arc::new(ConsoleDisplay));
    let report = engine.boot();
    info!(
        identified = report.identified.len(),
        registered = report.registered.len(),
        "Kiosk ready"
    );

    run(&mut engine, Keymap::new(&config.keypad)).await;

    info!("Kiosk stopped");
    Ok(())
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kiosk=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// JSON file ledger when `ledger.path` is set, seeded on first run;
/// otherwise an in-memory ledger seeded from the simulator table.
fn open_ledger(config: &KioskConfig, simulator: &SimulatorConfig) -> anyhow::Result<Arc<dyn Ledger>> {
    let Some(path) = &config.ledger.path else {
        info!("Using in-memory ledger");
        return Ok(Arc::new(simulator.seed_memory()));
    };

    let ledger = if path.exists() {
        FileLedger::open(path)
    } else {
        info!(?path, "Seeding new ledger file");
        FileLedger::create(path, simulator.seed_document())
    }
    .with_context(|| format!("opening ledger {}", path.display()))?;

    info!(path = ?ledger.path(), "Using file ledger");
    Ok(Arc::new(ledger))
}

async fn run(engine: &mut Engine, keymap: Keymap) {
    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(read_keys(tx));

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut keypad_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(state = ?engine.state(), "Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let key = if keypad_open {
                    match rx.try_recv() {
                        Ok(key) => Some(key),
                        Err(TryRecvError::Empty) => None,
                        Err(TryRecvError::Disconnected) => {
                            info!("Keypad input closed");
                            keypad_open = false;
                            None
                        }
                    }
                } else {
                    None
                };

                engine.step(key.and_then(|k| keymap.map(k)));

                if !keypad_open && engine.state() == State::Idle {
                    break;
                }
            }
        }
    }
}

/// Forwards stdin characters to the loop until EOF.
async fn read_keys(tx: mpsc::Sender<char>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                for key in line.chars() {
                    if tx.send(key).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "Keypad read failed");
                return;
            }
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
