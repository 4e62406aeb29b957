//! # RS485 Transport Layer
//!
//! The transaction engine talks to the bus through the [`RtuPort`] trait: a
//! half-duplex line that can be flushed, written, left to settle, and polled
//! for whatever bytes arrived. Two implementations ship with the crate:
//!
//! ### Serial (`SerialRtuPort`)
//! - Blocking serial port via the `serialport` crate (RS-485 adapters, UARTs)
//! - Serial parameters from [`SerialConfig`](crate::config::SerialConfig)
//! - Fixed post-write settle delay, 300 ms unless configured otherwise
//!
//! ### Scripted (`ScriptedPort`)
//! - In-memory bus for tests and host-side simulation
//! - Canned responses or a responder closure keyed on the request frame
//! - Settle is counted, never slept
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rs485_rtu::config::SerialConfig;
//! use rs485_rtu::transport::SerialRtuPort;
//! use rs485_rtu::RtuMaster;
//!
//! # fn main() -> rs485_rtu::ModbusResult<()> {
//! let port = SerialRtuPort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//! let mut master = RtuMaster::new(port);
//! let frame = master.read_registers(1, 0x03, 0x0000, 2)?;
//! println!("{:02X?}", frame);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::info;

use crate::config::SerialConfig;
use crate::error::{ModbusError, ModbusResult};
use crate::utils::format::bytes_to_hex;

/// Post-write delay observed across the device fleet, in milliseconds
pub const DEFAULT_SETTLE_MS: u64 = 300;

/// Log packet with direction
pub(crate) fn log_packet(direction: &str, data: &[u8], slave_id: u8) {
    info!("[MODBUS-RTU] {} slave:{} {}", direction, slave_id, bytes_to_hex(data));
}

/// Half-duplex serial line as seen by the transaction engine
///
/// Implementations block; there is no cancellation. A device that never
/// answers simply leaves nothing to read.
pub trait RtuPort {
    /// Discard unread input and pending output before a new transaction
    fn flush(&mut self) -> ModbusResult<()>;

    /// Blocking write of a complete frame
    fn write(&mut self, bytes: &[u8]) -> ModbusResult<()>;

    /// Wait a bounded, fixed time for the device to answer
    fn settle(&mut self);

    /// Next received byte, or `None` once nothing more is available
    fn read_byte(&mut self) -> ModbusResult<Option<u8>>;

    /// Iterate over the bytes currently available
    fn read_available(&mut self) -> ReadAvailable<'_, Self>
    where
        Self: Sized,
    {
        ReadAvailable { port: self, done: false }
    }
}

impl<P: RtuPort + ?Sized> RtuPort for Box<P> {
    fn flush(&mut self) -> ModbusResult<()> {
        (**self).flush()
    }

    fn write(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        (**self).write(bytes)
    }

    fn settle(&mut self) {
        (**self).settle()
    }

    fn read_byte(&mut self) -> ModbusResult<Option<u8>> {
        (**self).read_byte()
    }
}

/// Iterator returned by [`RtuPort::read_available`]
///
/// Ends at the first "nothing available" and after yielding an error.
pub struct ReadAvailable<'a, P: RtuPort> {
    port: &'a mut P,
    done: bool,
}

impl<P: RtuPort> Iterator for ReadAvailable<'_, P> {
    type Item = ModbusResult<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.port.read_byte() {
            Ok(Some(byte)) => Some(Ok(byte)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub no_responses: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub flushes: u64,
}

/// RS485 serial port opened through the `serialport` crate
pub struct SerialRtuPort {
    port: Box<dyn SerialPort>,
    port_name: String,
    settle: Duration,
}

impl SerialRtuPort {
    /// Open the port described by `config`
    pub fn open(config: &SerialConfig) -> ModbusResult<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| {
                ModbusError::io(format!("Failed to open serial port {}: {}", config.port, e))
            })?;

        log::info!(
            "Opened {} at {} baud ({:?}/{:?}/{:?}), settle {}ms",
            config.port,
            config.baud_rate,
            config.data_bits,
            config.parity,
            config.stop_bits,
            config.settle_ms
        );

        Ok(Self::from_port(port, &config.port, Duration::from_millis(config.settle_ms)))
    }

    /// Wrap an already opened port
    pub fn from_port(port: Box<dyn SerialPort>, port_name: &str, settle: Duration) -> Self {
        Self {
            port,
            port_name: port_name.to_string(),
            settle,
        }
    }

    /// Port name/path
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Configured settle delay
    pub fn settle_delay(&self) -> Duration {
        self.settle
    }
}

impl fmt::Debug for SerialRtuPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialRtuPort")
            .field("port_name", &self.port_name)
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

impl RtuPort for SerialRtuPort {
    fn flush(&mut self) -> ModbusResult<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        self.port
            .write_all(bytes)
            .map_err(|e| ModbusError::io(format!("Failed to send RTU frame: {}", e)))?;
        self.port.flush()?;
        Ok(())
    }

    fn settle(&mut self) {
        thread::sleep(self.settle);
    }

    fn read_byte(&mut self) -> ModbusResult<Option<u8>> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }

        let mut buffer = [0u8; 1];
        match self.port.read(&mut buffer) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buffer[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(ModbusError::io(format!("Serial read error: {}", e))),
        }
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// In-memory bus standing in for a serial line
///
/// Each `write` makes the next response available for reading: either the
/// result of the responder closure or the next queued response. Anything left
/// unread is discarded by `flush`, exactly like a real port.
///
/// ```rust
/// use rs485_rtu::transport::ScriptedPort;
/// use rs485_rtu::RtuMaster;
///
/// let mut port = ScriptedPort::new();
/// port.queue_response(vec![0x01, 0x03, 0x02, 0x01, 0x90, 0xB9, 0xB8]);
///
/// let mut master = RtuMaster::new(port);
/// let frame = master.read_registers(1, 0x03, 0x0001, 1).unwrap();
/// assert_eq!(&frame[3..5], &[0x01, 0x90]);
/// ```
#[derive(Default)]
pub struct ScriptedPort {
    queued: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    input: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    settles: usize,
    flushes: usize,
}

impl ScriptedPort {
    /// Create a port with no scripted responses (a silent bus)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a port that answers each written frame through `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queue the bytes delivered after the next write
    pub fn queue_response(&mut self, bytes: Vec<u8>) {
        self.queued.push_back(bytes);
    }

    /// Queue a write that gets no answer
    pub fn queue_silence(&mut self) {
        self.queued.push_back(Vec::new());
    }

    /// Put bytes in the receive buffer right now (line noise, late replies)
    pub fn inject_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Every frame written so far
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Number of settle delays requested
    pub fn settle_count(&self) -> usize {
        self.settles
    }

    /// Number of flushes requested
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Bytes still waiting in the receive buffer
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl fmt::Debug for ScriptedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedPort")
            .field("queued", &self.queued.len())
            .field("responder", &self.responder.is_some())
            .field("input", &self.input.len())
            .field("written", &self.written.len())
            .finish()
    }
}

impl RtuPort for ScriptedPort {
    fn flush(&mut self) -> ModbusResult<()> {
        self.flushes += 1;
        self.input.clear();
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        self.written.push(bytes.to_vec());
        let reply = match self.responder.as_mut() {
            Some(responder) => responder(bytes),
            None => self.queued.pop_front(),
        };
        if let Some(reply) = reply {
            self.input.extend(reply);
        }
        Ok(())
    }

    fn settle(&mut self) {
        self.settles += 1;
    }

    fn read_byte(&mut self) -> ModbusResult<Option<u8>> {
        Ok(self.input.pop_front())
    }
}
