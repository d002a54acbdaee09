//! Device session for one CLI invocation
//!
//! Opens the controller (or a replay of captured status buffers), takes the
//! lock, and retries transient failures the way the configuration asks.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use tban_core::{RetryPolicy, TbanConfig, TbanError, Variant};
use tban_hardware::{
    is_disconnect_error, read_capture, Presence, ReplayLink, SerialLink, SerialPortLink, Tban,
};

use crate::shutdown::Shutdown;

/// Captured buffers to replay instead of opening a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDevice {
    pub base: PathBuf,
    pub mini: Option<PathBuf>,
}

impl FakeDevice {
    /// Build from the `--fake-dev` and `--fake-mini` values
    pub fn from_args(base: Option<&Path>, mini: Option<&Path>) -> Result<Option<Self>> {
        match (base, mini) {
            (Some(base), mini) => Ok(Some(Self {
                base: base.to_path_buf(),
                mini: mini.map(Path::to_path_buf),
            })),
            (None, None) => Ok(None),
            (None, Some(_)) => Err(anyhow::anyhow!(
                "--fake-mini needs a base capture from --fake-dev"
            )),
        }
    }

    fn link(&self) -> Result<ReplayLink> {
        let base = load_capture(&self.base)?;
        let mini = self.mini.as_deref().map(load_capture).transpose()?;
        Ok(ReplayLink::from_captures(base, mini))
    }
}

fn load_capture(path: &Path) -> Result<Vec<u8>> {
    read_capture(path).with_context(|| format!("Cannot read capture {}", path.display()))
}

/// Open handle plus the retry policy used for every operation
pub struct Session {
    tban: Tban<Box<dyn SerialLink>>,
    retry: RetryPolicy,
    presence: Option<Presence>,
    shutdown: Shutdown,
}

impl Session {
    /// Open the configured device, or the replay when `fake` is set
    pub fn open(config: &TbanConfig, fake: Option<&FakeDevice>) -> Result<Self> {
        Self::open_with_shutdown(config, fake, Shutdown::new())
    }

    /// Like [`Session::open`], giving up lock waits and multi-frame writes
    /// once `shutdown` is requested
    pub fn open_with_shutdown(
        config: &TbanConfig,
        fake: Option<&FakeDevice>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let mut tban = match fake {
            Some(fake) => {
                let link = fake.link()?;
                debug!("Replaying captures from {}", fake.base.display());
                Tban::with_connector(config, move |_| {
                    Ok(Box::new(link.clone()) as Box<dyn SerialLink>)
                })?
            }
            None => {
                let poll = Duration::from_millis(config.timing.receive_backoff_ms.max(1));
                Tban::with_connector(config, move |device| {
                    Ok(Box::new(SerialPortLink::open(device, poll)?) as Box<dyn SerialLink>)
                })?
            }
        };

        tban.set_interrupt(shutdown.flag());

        let retry = config.retry;
        retry
            .run(|| tban.open(), log_retry)
            .with_context(|| format!("Cannot open {}", config.device.path))?;

        Ok(Self {
            tban,
            retry,
            presence: None,
            shutdown,
        })
    }

    /// Query every status source again
    pub fn refresh(&mut self) -> Result<Presence> {
        let tban = &mut self.tban;
        let presence = self
            .retry
            .run(|| tban.query_all(), log_retry)
            .context("Cannot query the controller")?;
        debug!(
            "Detected {} (big: {}, mini: {})",
            presence.kind.name(),
            presence.big,
            presence.mini
        );
        self.presence = Some(presence);
        Ok(presence)
    }

    /// Presence from the last refresh, querying if there was none
    pub fn presence(&mut self) -> Result<Presence> {
        match self.presence {
            Some(presence) => Ok(presence),
            None => self.refresh(),
        }
    }

    /// Query a single source
    pub fn query(&mut self, variant: Variant) -> Result<()> {
        let tban = &mut self.tban;
        self.retry
            .run(|| tban.query(variant), log_retry)
            .with_context(|| format!("Cannot query the {} status", variant))
    }

    /// Query a single source unless its snapshot is younger than `max_age`
    pub fn query_if_stale(&mut self, variant: Variant, max_age: Duration) -> Result<()> {
        let tban = &mut self.tban;
        self.retry
            .run(|| tban.query_if_stale(variant, max_age), log_retry)
            .with_context(|| format!("Cannot query the {} status", variant))
    }

    /// Run a device operation under the retry policy
    pub fn run<T, F>(&mut self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(&mut Tban<Box<dyn SerialLink>>) -> tban_core::Result<T>,
    {
        let tban = &mut self.tban;
        self.retry
            .run(|| op(tban), log_retry)
            .with_context(|| what.to_string())
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn tban(&self) -> &Tban<Box<dyn SerialLink>> {
        &self.tban
    }

    pub fn tban_mut(&mut self) -> &mut Tban<Box<dyn SerialLink>> {
        &mut self.tban
    }

    /// Close the handle, disabling the watchdog and releasing the lock
    pub fn close(mut self) -> Result<()> {
        self.tban.close().context("Cannot close the controller")
    }
}

fn log_retry(attempt: u32, err: &TbanError) {
    if is_disconnect_error(err) {
        warn!("Device went away on attempt {}: {}. Retrying", attempt, err);
    } else {
        warn!("Attempt {} failed: {}. Retrying", attempt, err);
    }
}
