//! T-Balancer CLI Library
//!
//! Building blocks of the `tbanctl` tool: configuration layering, the device
//! session with retries, status reports and their table/JSON rendering.

// Internal CLI implementation - not part of public API
#[doc(hidden)]
pub mod cli;

/// Configuration types for the CLI tool.
pub mod config;

// Internal formatting functions - not part of public API
#[doc(hidden)]
pub mod format;

pub mod report;

/// Device session shared by the device commands.
pub mod session;

pub mod shutdown;
