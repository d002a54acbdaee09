//! Serial transport for low-level hardware communication
//!
//! Frames go out verbatim; responses are collected in chunks of at most
//! [`CHUNK_SIZE`] bytes until the expected length arrives or the deadline
//! passes. The transport never retries a failed exchange.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tban_core::{DeviceConfig, FlowControl, Result, TbanError};
use tracing::{debug, error, trace};

/// Largest read issued to the link in one go
pub const CHUNK_SIZE: usize = 32;

/// Byte-level access to a serial line
///
/// This trait enables testing of the device handle without real hardware by
/// allowing in-memory implementations.
pub trait SerialLink: Send {
    /// Write all bytes and flush
    fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is pending, up to `buf.len()` bytes. `Ok(0)` means
    /// nothing arrived yet.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes waiting on the line
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Discard unread input
    fn clear_input(&mut self) -> io::Result<()>;

    /// Get the port path for log messages
    fn port_path(&self) -> Option<&str>;
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_frame(bytes)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }

    fn port_path(&self) -> Option<&str> {
        (**self).port_path()
    }
}

/// Real serial port via the `serialport` crate
pub struct SerialPortLink {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialPortLink {
    /// Open the port described by `config`
    ///
    /// `poll_timeout` bounds each individual read; the overall receive
    /// deadline is enforced by [`Transport::receive`].
    pub fn open(config: &DeviceConfig, poll_timeout: Duration) -> Result<Self> {
        config.validate()?;
        debug!("Opening serial port: {}", config.path);

        let data_bits = match config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };
        let flow_control = match config.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        };

        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(data_bits)
            .parity(serialport::Parity::None)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .timeout(poll_timeout)
            .open()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", config.path, e);
                TbanError::Open {
                    path: config.path.clone(),
                    reason: e.to_string(),
                }
            })?;

        debug!("Serial port opened successfully");
        Ok(Self {
            port,
            path: config.path.clone(),
        })
    }
}

impl SerialLink for SerialPortLink {
    fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(self.port.clear(serialport::ClearBuffer::Input)?)
    }

    fn port_path(&self) -> Option<&str> {
        Some(&self.path)
    }
}

/// Edge flag raised when data is pending on the line
///
/// Poll-driven: the receive loop raises it from the link's pending-byte
/// count and consumes it in the same iteration. Serial ports give no
/// asynchronous readiness callback to hook instead.
#[derive(Debug, Default)]
pub struct DataReady(AtomicBool);

impl DataReady {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the flag, returning whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Framing layer over a [`SerialLink`]
pub struct Transport<L: SerialLink> {
    link: L,
    data_ready: DataReady,
    backoff: Duration,
}

impl<L: SerialLink> Transport<L> {
    pub fn new(link: L, backoff: Duration) -> Self {
        Self {
            link,
            data_ready: DataReady::default(),
            backoff,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Drop pending input, then write `frame` and flush
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        debug!("TX: {:02X?}", frame);
        self.link.clear_input().map_err(|e| {
            error!("Failed to clear input buffer: {}", e);
            TbanError::Send(e)
        })?;
        self.data_ready.take();
        self.link.write_frame(frame).map_err(|e| {
            error!("Write failed: {}", e);
            TbanError::Send(e)
        })
    }

    /// Collect exactly `expected` bytes, or fail once `timeout` has elapsed
    /// since the call started
    pub fn receive(&mut self, expected: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut received = Vec::with_capacity(expected);
        let mut chunk = [0u8; CHUNK_SIZE];

        while received.len() < expected {
            if Instant::now() >= deadline {
                error!(
                    "Receive timeout: {} of {} bytes",
                    received.len(),
                    expected
                );
                return Err(TbanError::ReceiveTimeout {
                    expected,
                    received: received.len(),
                });
            }

            match self.link.bytes_available() {
                Ok(n) if n > 0 => self.data_ready.raise(),
                Ok(_) => {}
                Err(e) => {
                    error!("Read error: {}", e);
                    return Err(TbanError::Receive(e));
                }
            }
            if !self.data_ready.take() {
                std::thread::sleep(self.backoff);
                continue;
            }

            let n = match self.link.read_chunk(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => {
                    error!("Read error: {}", e);
                    return Err(TbanError::Receive(e));
                }
            };
            if n == 0 {
                std::thread::sleep(self.backoff);
                continue;
            }

            let wanted = expected - received.len();
            received.extend_from_slice(&chunk[..n.min(wanted)]);
            trace!("-- {} bytes read of the expected {}", received.len(), expected);
        }

        debug!("RX: {} bytes", received.len());
        Ok(received)
    }
}

/// Determine if an error indicates device disconnection
///
/// Returns `true` if the error suggests the device has gone away (USB
/// unplugged, power loss) rather than a transient error.
pub fn is_disconnect_error(err: &TbanError) -> bool {
    match err {
        TbanError::Send(e) | TbanError::Receive(e) | TbanError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
                | io::ErrorKind::NotFound
                | io::ErrorKind::PermissionDenied
                | io::ErrorKind::UnexpectedEof
        ),
        TbanError::Step { source, .. } => is_disconnect_error(source),
        // Timeouts are typically transient, not disconnection
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplayLink;

    fn transport(link: ReplayLink) -> Transport<ReplayLink> {
        Transport::new(link, Duration::from_millis(1))
    }

    #[test]
    fn test_send_writes_verbatim_and_clears_input() {
        let link = ReplayLink::new();
        link.push_input(&[9, 9, 9]);
        let mut t = transport(link.clone());

        t.send(&[0x05, 0x36]).unwrap();

        assert_eq!(link.written(), vec![vec![0x05, 0x36]]);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn test_receive_in_chunks() {
        let link = ReplayLink::new();
        let data: Vec<u8> = (0..100).collect();
        link.push_input(&data);
        let mut t = transport(link.clone());

        let received = t.receive(100, Duration::from_secs(1)).unwrap();
        assert_eq!(received, data);
        assert!(link.reads().iter().all(|&n| n <= CHUNK_SIZE));
        assert_eq!(link.reads().len(), 4);
    }

    #[test]
    fn test_receive_truncates_excess() {
        let link = ReplayLink::new();
        link.push_input(&[1; 40]);
        let mut t = transport(link.clone());

        let received = t.receive(10, Duration::from_secs(1)).unwrap();
        assert_eq!(received.len(), 10);
    }

    #[test]
    fn test_receive_accumulates_short_reads() {
        let link = ReplayLink::new();
        link.set_dribble(3);
        link.push_input(&[7; 12]);
        let mut t = transport(link.clone());

        let received = t.receive(12, Duration::from_secs(1)).unwrap();
        assert_eq!(received, vec![7; 12]);
        assert_eq!(link.reads(), vec![3, 3, 3, 3]);
    }

    #[test]
    fn test_receive_retries_empty_reads() {
        let link = ReplayLink::new();
        link.stall_reads(2);
        link.push_input(&[7; 12]);
        let mut t = transport(link.clone());

        let received = t.receive(12, Duration::from_secs(1)).unwrap();
        assert_eq!(received.len(), 12);
        assert_eq!(link.reads(), vec![0, 0, 12]);
    }

    #[test]
    fn test_receive_timeout_reports_progress() {
        let link = ReplayLink::new();
        link.push_input(&[1; 20]);
        let mut t = transport(link);

        match t.receive(285, Duration::from_millis(30)) {
            Err(TbanError::ReceiveTimeout { expected, received }) => {
                assert_eq!(expected, 285);
                assert_eq!(received, 20);
            }
            other => panic!("Expected ReceiveTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_send_failure() {
        let link = ReplayLink::new();
        link.fail_write_at(0);
        let mut t = transport(link);
        assert!(matches!(t.send(&[0x01]), Err(TbanError::Send(_))));
    }

    #[test]
    fn test_is_disconnect_error() {
        let gone = TbanError::Send(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(is_disconnect_error(&gone));

        let step = TbanError::Step {
            operation: "set curve",
            step: 2,
            total: 7,
            source: Box::new(gone),
        };
        assert!(is_disconnect_error(&step));

        let timeout = TbanError::ReceiveTimeout {
            expected: 285,
            received: 0,
        };
        assert!(!is_disconnect_error(&timeout));
        assert!(!is_disconnect_error(&TbanError::NotOpen));
    }

    #[test]
    fn test_data_ready_flag() {
        let flag = DataReady::default();
        assert!(!flag.take());
        flag.raise();
        assert!(flag.is_raised());
        assert!(flag.take());
        assert!(!flag.take());
    }
}
