//! Configuration file loaded once at startup
//!
//! Every section has working defaults, so an empty or missing file yields a
//! configuration for the factory device on `/dev/ttyUSB0`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::names::{NameEntry, NameTable};
use super::paths::{default_lock_path, DEFAULT_DEVICE};
use crate::error::{Result, TbanError};

/// Serial flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Serial line settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial device path
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub flow_control: FlowControl,
    /// Receive timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DEVICE.to_string(),
            baud_rate: 19200,
            data_bits: 8,
            stop_bits: 1,
            flow_control: FlowControl::Hardware,
            timeout_ms: 10_000,
        }
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject line settings the controller cannot speak
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(TbanError::Config("Device path is empty".to_string()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(TbanError::Config(format!(
                "Invalid data bits: {} (must be 5-8)",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(TbanError::Config(format!(
                "Invalid stop bits: {} (must be 1 or 2)",
                self.stop_bits
            )));
        }
        if self.baud_rate == 0 {
            return Err(TbanError::Config("Baud rate must be positive".to_string()));
        }
        Ok(())
    }
}

/// Exclusive access lock settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub path: PathBuf,
    /// How long to wait for another process to release the device
    pub timeout_secs: u64,
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
            timeout_secs: 10,
            retry_interval_ms: 1000,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Protocol pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay after every frame sent to the controller
    pub settle_ms: u64,
    /// Additional delay after frames addressed to the mini add-on
    pub mini_settle_ms: u64,
    /// Sleep between empty reads while receiving
    pub receive_backoff_ms: u64,
    /// Status polls allowed while waiting for the mini pass-through buffer to drain
    pub pass_through_polls: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 25,
            mini_settle_ms: 250,
            receive_backoff_ms: 10,
            pass_through_polls: 40,
        }
    }
}

/// How often a failed device operation is retried by tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it succeeds, fails with a non-transient error or the
    /// attempts are used up. `on_retry` sees each error that is about to be
    /// retried.
    pub fn run<T, F, R>(&self, mut op: F, mut on_retry: R) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        R: FnMut(u32, &TbanError),
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_transient() => {
                    on_retry(attempt, &e);
                    std::thread::sleep(self.delay());
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Complete configuration file.
///
/// Located at `~/.config/tban/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TbanConfig {
    pub device: DeviceConfig,
    pub lock: LockConfig,
    pub timing: TimingConfig,
    pub retry: RetryPolicy,
    /// Name overrides for sensors and channels
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<NameEntry>,
}

impl TbanConfig {
    /// Parse TbanConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.device.validate()?;
        Ok(config)
    }

    /// Serialize TbanConfig to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| match e {
                TbanError::Config(msg) => {
                    TbanError::Config(format!("{}: {}", path.display(), msg))
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Name table with the configured overrides applied on top of the defaults
    pub fn name_table(&self) -> Result<NameTable> {
        let mut table = NameTable::default();
        for entry in &self.names {
            table.set_name(entry.category, entry.index, &entry.short, &entry.long)?;
        }
        Ok(table)
    }
}
