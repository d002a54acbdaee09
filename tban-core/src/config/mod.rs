//! Configuration types for the T-Balancer tools
//!
//! # Architecture
//!
//! Configuration is split into:
//! - [`TbanConfig`] - Serial, lock, timing and retry settings, loaded once at startup
//! - [`NameTable`] - Sensor and channel names, overridable from the config file

mod names;
mod paths;
mod settings;

pub use names::{Name, NameCategory, NameEntry, NameTable};
pub use paths::{default_config_path, default_lock_path, DEFAULT_DEVICE, DEFAULT_LOCK_FILE};
pub use settings::{DeviceConfig, FlowControl, LockConfig, RetryPolicy, TbanConfig, TimingConfig};
