//! Ctrl-C and termination handling
//!
//! The handler only raises a flag. Long-running commands poll it and return,
//! so the session still closes the device and releases the lock.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared shutdown request flag
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag on SIGINT, SIGTERM or SIGHUP
    pub fn install() -> Result<Self> {
        let shutdown = Self::new();
        let flag = shutdown.0.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested, closing the device");
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to set signal handler")?;
        Ok(shutdown)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Flag handed to the device handle
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }

    /// Sleep for `duration`, returning early when shutdown is requested.
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
