//! # Kiosk Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KIOSK_DEVICE_ID, KIOSK_DEVICE_NAME, KIOSK_LEDGER_PATH,             │
//! │     KIOSK_PAYMENT_TIMEOUT_MS, KIOSK_SYNC_INTERVAL_MS, KIOSK_BUS_RETRIES│
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, else ~/.config/kiosk-controller/kiosk.toml (Linux)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     250ms queries, 5s dispense, 3 attempts, 30s payment window         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # kiosk.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Lobby Kiosk"
//!
//! [bus]
//! min_address = 8
//! max_address = 119
//! reserved_addresses = [39]   # 0x27, the character display
//! response_timeout_ms = 250
//! dispense_timeout_ms = 5000
//! retries = 3
//! retry_delay_ms = 100
//! poll_interval_ms = 10
//!
//! [timing]
//! payment_timeout_ms = 30000
//! thank_you_ms = 3000
//! out_of_stock_ms = 3000
//! cancelled_ms = 3000
//! error_ms = 5000
//! sync_interval_ms = 30000
//!
//! [keypad]
//! submit_key = "#"
//! cancel_key = "*"
//! max_code_len = 20
//!
//! [ledger]
//! path = "/var/lib/kiosk/ledger.json"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use kiosk_bus::{BusTimings, DISPLAY_ADDRESS, MAX_MODULE_ADDRESS, MIN_MODULE_ADDRESS};
use kiosk_core::{State, MAX_CODE_LEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ControllerError, ControllerResult};

// =============================================================================
// Device
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4, generated on first run).
    #[serde(default = "generate_device_id")]
    pub id: String,

    /// Human-readable name for logs and the ledger.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Vending Kiosk".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: generate_device_id(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Bus
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSettings {
    /// First address swept during discovery.
    #[serde(default = "default_min_address")]
    pub min_address: u8,

    /// Last address swept during discovery (inclusive).
    #[serde(default = "default_max_address")]
    pub max_address: u8,

    /// Addresses occupied by non-module peripherals; never swept.
    #[serde(default = "default_reserved")]
    pub reserved_addresses: Vec<u8>,

    /// Response window for queries and display updates.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,

    /// Response window for DISPENSE.
    #[serde(default = "default_dispense_timeout")]
    pub dispense_timeout_ms: u64,

    /// Attempts per operation, including the first.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_min_address() -> u8 {
    MIN_MODULE_ADDRESS
}
fn default_max_address() -> u8 {
    MAX_MODULE_ADDRESS
}
fn default_reserved() -> Vec<u8> {
    vec![DISPLAY_ADDRESS]
}
fn default_response_timeout() -> u64 {
    250
}
fn default_dispense_timeout() -> u64 {
    5000
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    100
}
fn default_poll_interval() -> u64 {
    10
}

impl Default for BusSettings {
    fn default() -> Self {
        BusSettings {
            min_address: default_min_address(),
            max_address: default_max_address(),
            reserved_addresses: default_reserved(),
            response_timeout_ms: default_response_timeout(),
            dispense_timeout_ms: default_dispense_timeout(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl BusSettings {
    pub fn timings(&self) -> BusTimings {
        BusTimings {
            query_timeout: Duration::from_millis(self.response_timeout_ms),
            dispense_timeout: Duration::from_millis(self.dispense_timeout_ms),
            attempts: self.retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Addresses a discovery sweep visits, in order.
    pub fn scan_addresses(&self) -> Vec<u8> {
        (self.min_address..=self.max_address)
            .filter(|a| !self.reserved_addresses.contains(a))
            .collect()
    }
}

// =============================================================================
// Timing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Confirmation window once a product is ready.
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_ms: u64,

    #[serde(default = "default_short_dwell")]
    pub thank_you_ms: u64,

    #[serde(default = "default_short_dwell")]
    pub out_of_stock_ms: u64,

    #[serde(default = "default_short_dwell")]
    pub cancelled_ms: u64,

    #[serde(default = "default_error_dwell")]
    pub error_ms: u64,

    /// Ledger resync period while idle.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,
}

fn default_payment_timeout() -> u64 {
    30_000
}
fn default_short_dwell() -> u64 {
    3_000
}
fn default_error_dwell() -> u64 {
    5_000
}
fn default_sync_interval() -> u64 {
    30_000
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            payment_timeout_ms: default_payment_timeout(),
            thank_you_ms: default_short_dwell(),
            out_of_stock_ms: default_short_dwell(),
            cancelled_ms: default_short_dwell(),
            error_ms: default_error_dwell(),
            sync_interval_ms: default_sync_interval(),
        }
    }
}

impl TimingSettings {
    pub fn payment_timeout(&self) -> Duration {
        Duration::from_millis(self.payment_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// How long a terminal screen stays up before returning to `Idle`.
    pub fn dwell(&self, state: State) -> Option<Duration> {
        let ms = match state {
            State::ThankYou => self.thank_you_ms,
            State::OutOfStock => self.out_of_stock_ms,
            State::Cancelled => self.cancelled_ms,
            State::Error => self.error_ms,
            _ => return None,
        };
        Some(Duration::from_millis(ms))
    }
}

// =============================================================================
// Keypad
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypadSettings {
    #[serde(default = "default_submit_key")]
    pub submit_key: char,

    #[serde(default = "default_cancel_key")]
    pub cancel_key: char,

    /// Characters accepted before further input is ignored.
    #[serde(default = "default_max_code_len")]
    pub max_code_len: usize,
}

fn default_submit_key() -> char {
    '#'
}
fn default_cancel_key() -> char {
    '*'
}
fn default_max_code_len() -> usize {
    MAX_CODE_LEN
}

impl Default for KeypadSettings {
    fn default() -> Self {
        KeypadSettings {
            submit_key: default_submit_key(),
            cancel_key: default_cancel_key(),
            max_code_len: default_max_code_len(),
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// JSON ledger file. Unset means an in-memory ledger.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Kiosk Configuration
// =============================================================================

/// Complete kiosk configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub bus: BusSettings,

    #[serde(default)]
    pub timing: TimingSettings,

    #[serde(default)]
    pub keypad: KeypadSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl KioskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kiosk.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ControllerResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading kiosk config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration as pretty TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> ControllerResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ControllerError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Kiosk config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ControllerResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(ControllerError::InvalidConfig("device.id must not be empty".into()));
        }

        if self.bus.min_address > self.bus.max_address {
            return Err(ControllerError::InvalidConfig(format!(
                "bus address range is inverted: {:#04x} > {:#04x}",
                self.bus.min_address, self.bus.max_address
            )));
        }

        if self.bus.max_address > MAX_MODULE_ADDRESS {
            return Err(ControllerError::InvalidConfig(format!(
                "bus.max_address must be at most {:#04x}",
                MAX_MODULE_ADDRESS
            )));
        }

        if self.bus.scan_addresses().is_empty() {
            return Err(ControllerError::InvalidConfig(
                "bus address range contains only reserved addresses".into(),
            ));
        }

        if self.bus.retries == 0 {
            return Err(ControllerError::InvalidConfig("bus.retries must be at least 1".into()));
        }

        let timeouts = [
            ("bus.response_timeout_ms", self.bus.response_timeout_ms),
            ("bus.dispense_timeout_ms", self.bus.dispense_timeout_ms),
            ("bus.poll_interval_ms", self.bus.poll_interval_ms),
            ("timing.payment_timeout_ms", self.timing.payment_timeout_ms),
            ("timing.sync_interval_ms", self.timing.sync_interval_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(ControllerError::InvalidConfig(format!("{} must be greater than 0", name)));
        }

        if self.keypad.submit_key == self.keypad.cancel_key {
            return Err(ControllerError::InvalidConfig(
                "keypad submit and cancel keys must differ".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides from a key lookup (the process environment in
    /// production). Unparseable numbers are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("KIOSK_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("KIOSK_DEVICE_NAME") {
            debug!(device_name = %name, "Overriding device name from environment");
            self.device.name = name;
        }

        if let Some(path) = lookup("KIOSK_LEDGER_PATH") {
            debug!(ledger_path = %path, "Overriding ledger path from environment");
            self.ledger.path = Some(PathBuf::from(path));
        }

        if let Some(ms) = parse_override::<u64>(&lookup, "KIOSK_PAYMENT_TIMEOUT_MS") {
            self.timing.payment_timeout_ms = ms;
        }

        if let Some(ms) = parse_override::<u64>(&lookup, "KIOSK_SYNC_INTERVAL_MS") {
            self.timing.sync_interval_ms = ms;
        }

        if let Some(retries) = parse_override::<u32>(&lookup, "KIOSK_BUS_RETRIES") {
            self.bus.retries = retries;
        }
    }

    /// Platform config location, e.g. `~/.config/kiosk-controller/kiosk.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "kiosk", "kiosk-controller")
            .map(|dirs| dirs.config_dir().join("kiosk.toml"))
    }
}

fn parse_override<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            debug!(key, value = %raw, "Overriding setting from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = KioskConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.bus.retries, 3);
        assert_eq!(config.bus.reserved_addresses, vec![0x27]);
        assert_eq!(config.timing.dwell(State::Error), Some(Duration::from_secs(5)));
        assert_eq!(config.timing.dwell(State::ThankYou), Some(Duration::from_secs(3)));
        assert_eq!(config.timing.dwell(State::Idle), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_skips_reserved() {
        let bus = BusSettings::default();
        let addresses = bus.scan_addresses();
        assert_eq!(addresses.first(), Some(&0x08));
        assert_eq!(addresses.last(), Some(&0x77));
        assert!(!addresses.contains(&0x27));
        assert_eq!(addresses.len(), 0x77 - 0x08 + 1 - 1);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: KioskConfig = toml::from_str(
            r#"
            [device]
            name = "Lobby"

            [timing]
            payment_timeout_ms = 10000
            "#,
        )
        .unwrap();

        assert_eq!(config.device.name, "Lobby");
        assert!(!config.device.id.is_empty());
        assert_eq!(config.timing.payment_timeout_ms, 10_000);
        assert_eq!(config.timing.error_ms, 5_000);
        assert_eq!(config.keypad.submit_key, '#');
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("KIOSK_DEVICE_NAME", "Station 7"),
            ("KIOSK_PAYMENT_TIMEOUT_MS", "15000"),
            ("KIOSK_BUS_RETRIES", "five"),
        ]
        .into_iter()
        .collect();

        let mut config = KioskConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.device.name, "Station 7");
        assert_eq!(config.timing.payment_timeout_ms, 15_000);
        assert_eq!(config.bus.retries, 3);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = KioskConfig::default();
        config.bus.retries = 0;
        assert!(matches!(config.validate(), Err(ControllerError::InvalidConfig(_))));

        let mut config = KioskConfig::default();
        config.bus.min_address = 0x50;
        config.bus.max_address = 0x10;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.timing.payment_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = KioskConfig::default();
        config.device.id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("kiosk.toml");

        let mut config = KioskConfig::default();
        config.device.name = "Lobby".into();
        config.ledger.path = Some(PathBuf::from("/tmp/ledger.json"));
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: KioskConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }
}
