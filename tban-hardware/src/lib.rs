//! tban-hardware
//!
//! Hardware crate that contains the serial transport, the exclusive-access
//! lock, the status cache and the device handle built on top of them.
//
//! Public API:
//! - `device::Tban` - handle on one controller: open/close, queries, register reads, setters
//! - `transport::SerialPortLink` - real serial port link
//! - `replay::ReplayLink` - in-memory link answering from captured status vectors
//! - `lock::ExclusiveLock` - pid-file lock shared by every tool using the device

pub mod cache;
pub mod commands;
pub mod device;
pub mod lock;
pub mod replay;
pub mod transport;

pub use cache::StatusCache;
pub use commands::CommandFrame;
pub use device::{Presence, Tban};
pub use lock::ExclusiveLock;
pub use replay::{read_capture, ReplayLink};
pub use transport::{is_disconnect_error, DataReady, SerialLink, SerialPortLink, Transport};
