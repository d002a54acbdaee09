//! Device handle - high-level interface to one controller
//!
//! [`Tban`] ties the pieces together: it takes the exclusive lock, opens the
//! link, keeps the status cache and turns setter calls into command frames.
//! All I/O is blocking and happens in call order.
//!
//! The handle may be moved to another thread but is deliberately `!Sync`;
//! sharing it requires external synchronization.

use std::cell::Cell;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tban_core::registers::{self, Register, MINI_PASS_THROUGH, WATCHDOG_ENABLED};
use tban_core::variant::WATCHDOG_MIN_FIRMWARE;
use tban_core::{
    check_firmware_at_least, detect_variant, CurvePoint, DeviceConfig, DeviceKind,
    FirmwareVersion, HardwareInfo, NameTable, Result, StatusBuffer, StatusSource, TbanConfig,
    TbanError, TimingConfig, Variant,
};
use tracing::{debug, warn};

use crate::cache::StatusCache;
use crate::commands::{self, CommandFrame};
use crate::lock::ExclusiveLock;
use crate::transport::{SerialLink, SerialPortLink, Transport};

/// Opens the link when the handle is opened
pub type Connector<L> = Box<dyn FnMut(&DeviceConfig) -> Result<L> + Send>;

/// Progress sink called with `(current, max)` after each frame of a setter
pub type ProgressFn = Box<dyn FnMut(usize, usize) + Send>;

/// Which status sources answered during [`Tban::query_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub kind: DeviceKind,
    pub big: bool,
    pub mini: bool,
}

/// Handle on one T-Balancer controller
pub struct Tban<L: SerialLink = SerialPortLink> {
    device: DeviceConfig,
    timing: TimingConfig,
    connector: Connector<L>,
    transport: Option<Transport<L>>,
    cache: StatusCache,
    lock: ExclusiveLock,
    progress: Option<ProgressFn>,
    interrupt: Option<Arc<AtomicBool>>,
    names: NameTable,
    _not_sync: PhantomData<Cell<()>>,
}

impl Tban<SerialPortLink> {
    /// Handle for the serial port named in `config`
    pub fn new(config: &TbanConfig) -> Result<Self> {
        let poll = Duration::from_millis(config.timing.receive_backoff_ms.max(1));
        Self::with_connector(config, move |device| SerialPortLink::open(device, poll))
    }
}

impl<L: SerialLink> Tban<L> {
    /// Handle whose link is produced by `connector` on every open
    pub fn with_connector<F>(config: &TbanConfig, connector: F) -> Result<Self>
    where
        F: FnMut(&DeviceConfig) -> Result<L> + Send + 'static,
    {
        config.device.validate()?;
        Ok(Self {
            device: config.device.clone(),
            timing: config.timing.clone(),
            connector: Box::new(connector),
            transport: None,
            cache: StatusCache::new(),
            lock: ExclusiveLock::from_config(&config.lock),
            progress: None,
            interrupt: None,
            names: config.name_table()?,
            _not_sync: PhantomData,
        })
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Use another lock file; refused while the handle is open
    pub fn set_lock_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.lock.configure(path)
    }

    pub fn set_lock_timeout(&mut self, timeout: Duration) {
        self.lock.set_timeout(timeout);
    }

    /// Receive timeout for each query
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.device.timeout_ms = timeout.as_millis() as u64;
    }

    pub fn set_progress<F>(&mut self, progress: F)
    where
        F: FnMut(usize, usize) + Send + 'static,
    {
        self.progress = Some(Box::new(progress));
    }

    /// Stop lock waits and multi-frame writes once `flag` is raised.
    /// Interrupted writes leave the handle open so `close` can still run.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.lock.set_interrupt(flag.clone());
        self.interrupt = Some(flag);
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Take the lock, then open the link
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(TbanError::AlreadyOpen);
        }
        self.lock.acquire()?;

        match (self.connector)(&self.device) {
            Ok(link) => {
                let backoff = Duration::from_millis(self.timing.receive_backoff_ms);
                self.transport = Some(Transport::new(link, backoff));
                debug!("Opened {}", self.device.path);
                Ok(())
            }
            Err(e) => {
                if let Err(unlock) = self.lock.release() {
                    warn!("Failed to release lock after open failure: {}", unlock);
                }
                Err(e)
            }
        }
    }

    /// Disable the watchdog if it is running, close the link and release the lock
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(TbanError::NotOpen);
        }

        match WATCHDOG_ENABLED.read(&self.cache, 0) {
            Ok(enabled) if enabled != 0 => {
                debug!("Disabling watchdog before close");
                if let Err(e) = self.disable_watchdog() {
                    warn!("Failed to disable watchdog: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) if e.is_capability() => {}
            Err(TbanError::NotQueried(_)) => {}
            Err(e) => warn!("Cannot read watchdog state: {}", e),
        }

        self.transport = None;
        self.cache.clear();
        debug!("Closed {}", self.device.path);
        self.lock.release()
    }

    fn transport_mut(&mut self) -> Result<&mut Transport<L>> {
        self.transport.as_mut().ok_or(TbanError::NotOpen)
    }

    fn settle(&self, variant: Variant) -> Duration {
        let mut ms = self.timing.settle_ms;
        if variant.extra_settle_ms() > 0 {
            ms += self.timing.mini_settle_ms;
        }
        Duration::from_millis(ms)
    }

    fn report(&mut self, current: usize, max: usize) {
        if let Some(progress) = self.progress.as_mut() {
            progress(current, max);
        }
    }

    /// Send one frame and wait for the device to settle
    pub fn send(&mut self, frame: &CommandFrame, variant: Variant) -> Result<()> {
        let settle = self.settle(variant);
        self.transport_mut()?.send(frame.as_bytes())?;
        std::thread::sleep(settle);
        Ok(())
    }

    /// Fetch the full status vector of `variant` into the cache
    pub fn query(&mut self, variant: Variant) -> Result<()> {
        let settle = self.settle(variant);
        let timeout = self.device.timeout();
        let transport = self.transport.as_mut().ok_or(TbanError::NotOpen)?;
        self.cache.query(transport, variant, settle, timeout)?;
        Ok(())
    }

    /// Query only when the cached snapshot is older than `max_age`
    pub fn query_if_stale(&mut self, variant: Variant, max_age: Duration) -> Result<()> {
        let settle = self.settle(variant);
        let timeout = self.device.timeout();
        let transport = self.transport.as_mut().ok_or(TbanError::NotOpen)?;
        self.cache
            .query_if_stale(transport, variant, max_age, settle, timeout)?;
        Ok(())
    }

    /// Query the base vector and every add-on that answers
    ///
    /// The big vector is fetched only when the base reports big hardware.
    /// Otherwise the secondary source is tried as a mini; a mini that does
    /// not answer or answers garbage is simply absent. Link failures during
    /// the probe still propagate.
    pub fn query_all(&mut self) -> Result<Presence> {
        self.query(Variant::Base)?;
        let kind = self
            .cache
            .snapshot(Variant::Base)
            .map(|s| detect_variant(s.as_bytes()))
            .unwrap_or(DeviceKind::Absent);

        let mut presence = Presence {
            kind,
            big: false,
            mini: false,
        };

        if kind.has_big_dialect() {
            self.query(Variant::Big)?;
            presence.big = self.cache.present(Variant::Big);
        } else {
            match self.query(Variant::Mini) {
                Ok(()) => presence.mini = true,
                Err(e @ (TbanError::ReceiveTimeout { .. } | TbanError::CorruptData(_))) => {
                    debug!("No mini add-on: {}", e);
                    self.cache.invalidate(Variant::Mini);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(presence)
    }

    /// Cached byte of `variant` at absolute `index`
    pub fn get(&self, variant: Variant, index: usize) -> Result<u8> {
        if !self.is_open() {
            return Err(TbanError::NotOpen);
        }
        self.cache.get(variant, index)
    }

    /// Sentinel check of the cached `variant` snapshot, no I/O
    pub fn present(&self, variant: Variant) -> bool {
        self.cache.present(variant)
    }

    pub fn snapshot(&self, variant: Variant) -> Option<&StatusBuffer> {
        self.cache.snapshot(variant)
    }

    pub fn last_query(&self) -> Option<Instant> {
        self.cache.last_query()
    }

    /// Install a captured status vector instead of querying the device
    pub fn load_snapshot(&mut self, variant: Variant, bytes: &[u8]) -> Result<()> {
        self.cache.load_snapshot(variant, bytes)
    }

    /// Decode one register instance from the cache
    pub fn read(&self, register: &Register, index: usize) -> Result<u32> {
        register.read(self, index)
    }

    pub fn read_all(&self, register: &Register) -> Result<Vec<u32>> {
        register.read_all(self)
    }

    pub fn hardware_info(&self) -> Result<HardwareInfo> {
        registers::hardware_info(self)
    }

    fn base_bytes(&self) -> Result<&[u8]> {
        if !self.is_open() {
            return Err(TbanError::NotOpen);
        }
        self.cache
            .snapshot(Variant::Base)
            .map(StatusBuffer::as_bytes)
            .ok_or(TbanError::NotQueried(Variant::Base))
    }

    pub fn device_kind(&self) -> Result<DeviceKind> {
        Ok(detect_variant(self.base_bytes()?))
    }

    pub fn firmware_version(&self) -> Result<FirmwareVersion> {
        tban_core::firmware_version(self.base_bytes()?)
    }

    pub fn check_firmware(&self, min_version: u8) -> Result<()> {
        check_firmware_at_least(self.base_bytes()?, min_version)
    }

    pub fn curve(&self, channel: usize) -> Result<Vec<CurvePoint>> {
        registers::read_base_curve(self, channel)
    }

    pub fn mini_curve(&self, channel: usize) -> Result<Vec<CurvePoint>> {
        registers::read_mini_curve(self, channel)
    }

    fn command(&mut self, frame: Result<CommandFrame>) -> Result<()> {
        let frame = frame?;
        self.send(&frame, Variant::Base)?;
        self.report(1, 1);
        Ok(())
    }

    fn run_steps(
        &mut self,
        operation: &'static str,
        frames: &[CommandFrame],
        variant: Variant,
        mut after_each: impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if !self.is_open() {
            return Err(TbanError::NotOpen);
        }
        let total = frames.len();
        for (i, frame) in frames.iter().enumerate() {
            let step = i + 1;
            if self.interrupted() {
                warn!("{} interrupted before step {} of {}", operation, step, total);
                return Err(TbanError::Interrupted);
            }
            self.send(frame, variant)
                .and_then(|()| after_each(self))
                .map_err(|e| TbanError::Step {
                    operation,
                    step,
                    total,
                    source: Box::new(e),
                })?;
            self.report(step, total);
        }
        Ok(())
    }

    pub fn set_led(&mut self, on: bool) -> Result<()> {
        self.command(commands::led(on))
    }

    pub fn set_buzzer(&mut self, on: bool) -> Result<()> {
        self.command(commands::buzzer(on))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.command(commands::reset())
    }

    pub fn set_pwm(&mut self, channel: usize, pwm: u8) -> Result<()> {
        self.command(commands::channel_pwm(channel, pwm))
    }

    pub fn set_init_pwm(&mut self, channel: usize, pwm: u8) -> Result<()> {
        self.command(commands::init_pwm(channel, pwm))
    }

    pub fn set_pwm_frequency(&mut self, frequency: u8) -> Result<()> {
        self.command(commands::pwm_frequency(frequency))
    }

    /// One bit per channel, set for manual mode
    pub fn set_channel_mode(&mut self, mask: u8) -> Result<()> {
        self.command(commands::channel_mode(mask))
    }

    pub fn set_tacho(&mut self, mask: u8) -> Result<()> {
        self.command(commands::tacho(mask))
    }

    pub fn set_scale_factor(&mut self, index: usize, factor: u8) -> Result<()> {
        self.command(commands::scale_factor(index, factor))
    }

    pub fn set_motion(&mut self, lower: u8, upper: u8, error: u8) -> Result<()> {
        self.command(commands::motion(lower, upper, error))
    }

    pub fn set_hysteresis(&mut self, channel: usize, value: u8) -> Result<()> {
        self.command(commands::hysteresis(channel, value))
    }

    pub fn set_sensor_assignment(&mut self, channel: usize, digital: u8, analog: u8) -> Result<()> {
        self.command(commands::sensor_assignment(channel, digital, analog))
    }

    pub fn ping(&mut self, mask: u8) -> Result<()> {
        self.command(commands::ping(mask))
    }

    /// Arm or re-arm the USB watchdog
    pub fn kick_watchdog(&mut self) -> Result<()> {
        self.watchdog(true)
    }

    pub fn disable_watchdog(&mut self) -> Result<()> {
        self.watchdog(false)
    }

    fn watchdog(&mut self, enable: bool) -> Result<()> {
        let frame = commands::watchdog(enable)?;
        self.check_firmware(WATCHDOG_MIN_FIRMWARE)?;
        self.command(Ok(frame))
    }

    /// Write a base response curve: six points plus the end point
    pub fn set_curve(&mut self, channel: usize, points: &[CurvePoint]) -> Result<()> {
        let frames = commands::base_curve(channel, points)?;
        self.run_steps("set curve", &frames, Variant::Base, |_| Ok(()))
    }

    pub fn set_big_output_mode(&mut self, mask: u8) -> Result<()> {
        self.command(commands::big_output_mode(mask))
    }

    pub fn set_big_sensor_assignment(
        &mut self,
        channel: usize,
        digital: u8,
        analog: u8,
        big: u8,
    ) -> Result<()> {
        self.command(commands::big_sensor_assignment(channel, digital, analog, big))
    }

    pub fn set_big_analog_scale(&mut self, sensor: usize, factor: u8) -> Result<()> {
        self.command(commands::big_analog_scale(sensor, factor))
    }

    pub fn set_big_analog_abs_scale(&mut self, sensor: usize, factor: u8) -> Result<()> {
        self.command(commands::big_analog_abs_scale(sensor, factor))
    }

    pub fn set_big_digital_abs_scale(&mut self, sensor: usize, factor: u8) -> Result<()> {
        self.command(commands::big_digital_abs_scale(sensor, factor))
    }

    pub fn set_big_target_temp(&mut self, channel: usize, temp: u8) -> Result<()> {
        self.command(commands::big_target_temp(channel, temp))
    }

    pub fn set_big_target_mode(&mut self, channel: usize, mode: u8) -> Result<()> {
        self.command(commands::big_target_mode(channel, mode))
    }

    /// Write a mini response curve
    ///
    /// Each point travels through the base controller's pass-through buffer.
    /// After every frame the mini status is polled until the buffer reads
    /// empty, up to the configured number of polls.
    pub fn set_mini_curve(&mut self, channel: usize, points: &[CurvePoint]) -> Result<()> {
        let frames = commands::mini_curve(channel, points)?;
        let polls = self.timing.pass_through_polls.max(1);
        self.run_steps("set mini curve", &frames, Variant::Mini, move |tban| {
            tban.wait_pass_through(polls)
        })
    }

    fn wait_pass_through(&mut self, polls: u32) -> Result<()> {
        for poll in 1..=polls {
            self.query(Variant::Mini)?;
            let drained = MINI_PASS_THROUGH
                .read_all(&self.cache)?
                .iter()
                .all(|&b| b == 0);
            if drained {
                return Ok(());
            }
            debug!("Pass-through buffer busy (poll {} of {})", poll, polls);
        }
        Err(TbanError::PassThroughStalled { polls })
    }
}

impl<L: SerialLink> StatusSource for Tban<L> {
    fn status_byte(&self, variant: Variant, index: usize) -> Result<u8> {
        self.get(variant, index)
    }
}

impl<L: SerialLink> Drop for Tban<L> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                warn!("Failed to close device on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplayLink;
    use std::sync::{Arc, Mutex};
    use tban_core::registers::{CH_MAX_RPM, CH_PWM, FW_MAJOR};

    struct Fixture {
        _dir: tempfile::TempDir,
        lock_path: PathBuf,
        link: ReplayLink,
        tban: Tban<ReplayLink>,
    }

    fn config(dir: &tempfile::TempDir) -> TbanConfig {
        let mut config = TbanConfig::default();
        config.device.timeout_ms = 200;
        config.lock.path = dir.path().join("xban.lock");
        config.lock.timeout_secs = 0;
        config.timing.settle_ms = 0;
        config.timing.mini_settle_ms = 0;
        config.timing.receive_backoff_ms = 1;
        config.timing.pass_through_polls = 3;
        config
    }

    fn base_wire(firmware: u8, watchdog: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 285];
        buf[0] = 100;
        buf[137] = 30;
        buf[148] = 0x2C;
        buf[149] = 0x01;
        buf[272] = 0x10;
        buf[273] = firmware;
        buf[278] = watchdog;
        buf
    }

    fn mini_wire(pass_through: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 285];
        buf[0] = 100;
        buf[1] = 253;
        buf[62] = 254;
        buf[63] = pass_through;
        buf
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let link = ReplayLink::new();
        let handle = link.clone();
        let tban = Tban::with_connector(&config(&dir), move |_| Ok(handle.clone())).unwrap();
        Fixture {
            lock_path: dir.path().join("xban.lock"),
            _dir: dir,
            link,
            tban,
        }
    }

    fn opened(firmware: u8, watchdog: u8) -> Fixture {
        let mut f = fixture();
        f.link.set_answer([0x05, 0x36], base_wire(firmware, watchdog));
        f.tban.open().unwrap();
        f.tban.query(Variant::Base).unwrap();
        f.link.clear_written();
        f
    }

    #[test]
    fn test_open_takes_lock_and_close_releases() {
        let mut f = fixture();
        f.tban.open().unwrap();
        assert!(f.tban.is_open());
        assert!(f.lock_path.exists());
        assert!(matches!(f.tban.open(), Err(TbanError::AlreadyOpen)));

        f.tban.close().unwrap();
        assert!(!f.tban.is_open());
        assert!(!f.lock_path.exists());
        assert!(matches!(f.tban.close(), Err(TbanError::NotOpen)));
    }

    #[test]
    fn test_open_failure_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut tban: Tban<ReplayLink> = Tban::with_connector(&config(&dir), |device| {
            Err(TbanError::Open {
                path: device.path.clone(),
                reason: "no such device".to_string(),
            })
        })
        .unwrap();
        assert!(matches!(tban.open(), Err(TbanError::Open { .. })));
        assert!(!dir.path().join("xban.lock").exists());
    }

    #[test]
    fn test_operations_require_open() {
        let mut f = fixture();
        assert!(matches!(f.tban.query(Variant::Base), Err(TbanError::NotOpen)));
        assert!(matches!(f.tban.set_led(true), Err(TbanError::NotOpen)));
        assert!(matches!(f.tban.get(Variant::Base, 0), Err(TbanError::NotOpen)));
        assert!(f.link.written().is_empty());
    }

    #[test]
    fn test_get_before_query() {
        let mut f = fixture();
        f.tban.open().unwrap();
        assert!(matches!(
            f.tban.get(Variant::Base, 0),
            Err(TbanError::NotQueried(Variant::Base))
        ));
    }

    #[test]
    fn test_register_reads() {
        let f = opened(0x28, 0);
        assert_eq!(f.tban.read(&CH_PWM, 0).unwrap(), 60);
        assert_eq!(f.tban.read(&CH_MAX_RPM, 0).unwrap(), 3150);
        assert_eq!(f.tban.read(&FW_MAJOR, 0).unwrap(), 2);
        assert_eq!(f.tban.device_kind().unwrap(), DeviceKind::Base);
        assert_eq!(f.tban.firmware_version().unwrap().to_string(), "2.8");
    }

    #[test]
    fn test_setter_sends_frame() {
        let mut f = opened(0x28, 0);
        f.tban.set_pwm(1, 80).unwrap();
        f.tban.set_led(false).unwrap();
        assert_eq!(f.link.written(), vec![vec![0x12, 80], vec![0x02]]);
    }

    #[test]
    fn test_setter_validation_touches_nothing() {
        let mut f = opened(0x28, 0);
        assert!(matches!(
            f.tban.set_pwm(4, 10),
            Err(TbanError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            f.tban.set_pwm(0, 101),
            Err(TbanError::ValueOutOfBounds { .. })
        ));
        assert!(f.tban.set_motion(0, 1, 1).is_err());
        assert!(f.link.written().is_empty());
    }

    #[test]
    fn test_watchdog_requires_firmware() {
        let mut f = opened(0x27, 0);
        assert!(matches!(
            f.tban.kick_watchdog(),
            Err(TbanError::FirmwareTooOld {
                required: 28,
                actual: 27
            })
        ));
        assert!(f.link.written().is_empty());

        let mut f = opened(0x28, 0);
        f.tban.kick_watchdog().unwrap();
        assert_eq!(f.link.written(), vec![vec![0xF5]]);
    }

    #[test]
    fn test_close_disables_enabled_watchdog() {
        let mut f = opened(0x30, 1);
        f.tban.close().unwrap();
        assert_eq!(f.link.written(), vec![vec![0xF6]]);
        assert!(!f.lock_path.exists());
    }

    #[test]
    fn test_close_ignores_old_firmware_watchdog() {
        let mut f = opened(0x20, 1);
        f.tban.close().unwrap();
        assert!(f.link.written().is_empty());
        assert!(!f.lock_path.exists());
    }

    #[test]
    fn test_drop_closes() {
        let f = opened(0x28, 0);
        let lock_path = f.lock_path.clone();
        let Fixture { tban, _dir, .. } = f;
        drop(tban);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_curve_progress() {
        let mut f = opened(0x28, 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.tban
            .set_progress(move |current, max| sink.lock().unwrap().push((current, max)));

        let points: Vec<CurvePoint> = (0..7)
            .map(|i| CurvePoint {
                temp: 20 + 5 * i,
                pwm: 10 * i,
            })
            .collect();
        f.tban.set_curve(0, &points).unwrap();

        assert_eq!(f.link.written().len(), 7);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 7);
        assert_eq!(seen[0], (1, 7));
        assert_eq!(seen[6], (7, 7));
    }

    #[test]
    fn test_curve_failure_reports_step() {
        let mut f = opened(0x28, 0);
        f.link.fail_write_at(3);
        let points: Vec<CurvePoint> = (0..7)
            .map(|i| CurvePoint {
                temp: 20 + 5 * i,
                pwm: 10 * i,
            })
            .collect();

        match f.tban.set_curve(2, &points) {
            Err(TbanError::Step {
                step,
                total,
                source,
                ..
            }) => {
                assert_eq!(step, 4);
                assert_eq!(total, 7);
                assert!(matches!(*source, TbanError::Send(_)));
            }
            other => panic!("Expected Step error, got {:?}", other),
        }
        assert_eq!(f.link.written().len(), 3);
    }

    #[test]
    fn test_mini_curve_waits_for_pass_through() {
        let mut f = opened(0x28, 0);
        f.link.set_answer([0x06, 0x36], mini_wire(0));
        // first poll after frame 1 sees a busy buffer
        f.link.queue_response(mini_wire(5));

        let points: Vec<CurvePoint> = (0..5)
            .map(|i| CurvePoint {
                temp: 20 + 5 * i,
                pwm: 30 + 10 * i,
            })
            .collect();
        f.tban.set_mini_curve(0, &points).unwrap();

        let written = f.link.written();
        let curve_frames: Vec<_> = written.iter().filter(|w| w[0] == 0xF0).collect();
        let polls = written.iter().filter(|w| w.as_slice() == [0x06, 0x36]).count();
        assert_eq!(curve_frames.len(), 5);
        assert_eq!(polls, 6);
        assert_eq!(written[0], vec![0xF0, 0x30, 0xF1, 40, 0xF2, 30, 0xF3]);
    }

    #[test]
    fn test_mini_curve_stall() {
        let mut f = opened(0x28, 0);
        f.link.set_answer([0x06, 0x36], mini_wire(1));
        let points: Vec<CurvePoint> = (0..5)
            .map(|i| CurvePoint {
                temp: 20 + 5 * i,
                pwm: 30 + 10 * i,
            })
            .collect();

        match f.tban.set_mini_curve(1, &points) {
            Err(TbanError::Step { step, source, .. }) => {
                assert_eq!(step, 1);
                assert!(matches!(*source, TbanError::PassThroughStalled { polls: 3 }));
            }
            other => panic!("Expected Step error, got {:?}", other),
        }
    }

    #[test]
    fn test_query_all_detects_mini() {
        let mut f = opened(0x28, 0);
        f.link.set_answer([0x06, 0x36], mini_wire(0));
        let presence = f.tban.query_all().unwrap();
        assert_eq!(presence.kind, DeviceKind::Base);
        assert!(presence.mini);
        assert!(!presence.big);
        assert!(f.tban.present(Variant::Mini));
    }

    #[test]
    fn test_query_all_without_addon() {
        let mut f = opened(0x28, 0);
        let presence = f.tban.query_all().unwrap();
        assert!(!presence.mini);
        assert!(!f.tban.present(Variant::Mini));
    }

    #[test]
    fn test_interrupt_stops_curve_between_frames() {
        let mut f = opened(0x28, 0);
        let flag = Arc::new(AtomicBool::new(false));
        f.tban.set_interrupt(flag.clone());
        let raise = flag.clone();
        f.tban.set_progress(move |current, _| {
            if current == 2 {
                raise.store(true, Ordering::SeqCst);
            }
        });

        let points = [CurvePoint { temp: 20, pwm: 30 }; 7];
        assert!(matches!(
            f.tban.set_curve(0, &points),
            Err(TbanError::Interrupted)
        ));
        assert_eq!(f.link.written().len(), 2);
        assert!(f.tban.is_open());

        f.tban.close().unwrap();
        assert!(!f.lock_path.exists());
    }

    #[test]
    fn test_query_all_propagates_link_failure() {
        let mut f = opened(0x28, 0);
        // base query is write 0, the mini probe write 1
        f.link.fail_write_at(1);
        assert!(matches!(f.tban.query_all(), Err(TbanError::Send(_))));
    }

    #[test]
    fn test_lock_file_change_refused_while_open() {
        let mut f = fixture();
        f.tban.open().unwrap();
        assert!(matches!(
            f.tban.set_lock_file("/tmp/other.lock"),
            Err(TbanError::LockFileChangeNotAllowed)
        ));
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Tban<ReplayLink>>();
    }
}
