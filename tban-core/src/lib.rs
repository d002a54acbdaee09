//! T-Balancer Core Library
//!
//! Protocol model shared by the hardware layer and the command-line tool:
//! device variants, validated status snapshots, the register table,
//! error codes and configuration. Nothing in this crate performs I/O on the
//! serial port.

pub mod config;
pub mod error;
pub mod registers;
pub mod status;
pub mod variant;
pub mod warning;

// Re-export commonly used types
pub use config::{
    default_config_path, default_lock_path, DeviceConfig, FlowControl, LockConfig, NameCategory,
    NameTable, RetryPolicy, TbanConfig, TimingConfig,
};
pub use error::{ErrorCode, Result, TbanError};
pub use registers::{hardware_info, CurvePoint, HardwareInfo, Register};
pub use status::{StatusBuffer, StatusSource};
pub use variant::{
    check_firmware_at_least, detect_variant, firmware_version, AppKind, DeviceKind,
    FirmwareVersion, Variant,
};
pub use warning::{mini_status_text, warning_text};
