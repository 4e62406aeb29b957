//! # RS485 RTU Error Handling
//!
//! Every operation of the transaction engine reports failure through
//! [`ModbusError`]. A failed transaction never leaves state behind: the next
//! call starts from a fresh flush, so callers are free to retry, log, or
//! substitute a sentinel value.
//!
//! ## Error Categories
//!
//! ### Transaction Errors
//! - **No Response**: the device stayed silent after the settle delay
//! - **Short Read**: fewer bytes arrived than the caller declared
//! - **Checksum Mismatch**: the aligned frame failed CRC16 validation
//!
//! ### Caller Errors
//! - **Invalid Parameter**: rejected before any byte reaches the bus
//! - **Invalid Data**: decode offsets outside the captured frame
//!
//! ### System Errors
//! - **I/O Errors**: serial port failures
//! - **Configuration Errors**: malformed bus configuration files
//! - **Internal Errors**: poisoned locks around a shared master
//!
//! ## Error Recovery
//!
//! ```rust
//! use rs485_rtu::{ModbusError, ModbusResult};
//!
//! fn handle(result: ModbusResult<Vec<u8>>) {
//!     match result {
//!         Ok(frame) => println!("frame: {:02X?}", frame),
//!         Err(error) if error.is_recoverable() => println!("retry later: {}", error),
//!         Err(error) => println!("giving up: {}", error),
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for engine operations
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors produced by the RTU master engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModbusError {
    /// Zero bytes were captured after the settle delay.
    ///
    /// # Examples
    /// - Device powered off or not wired to the bus
    /// - Wrong slave address (the usual outcome while scanning)
    #[error("Device {slave_id} not responding")]
    NoResponse { slave_id: u8 },

    /// Fewer bytes were captured than the caller expected.
    #[error("Short read: expected {expected} bytes, captured {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// The aligned frame's trailing CRC does not match the computed CRC.
    ///
    /// `expected` is the CRC computed over the frame body, `actual` the value
    /// carried in the last two bytes.
    #[error("CRC validation failed: expected={expected:04X}, actual={actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Caller supplied an out-of-range argument; nothing was sent.
    ///
    /// # Examples
    /// - Slave address 0 (broadcast never answers)
    /// - Reading 200 registers (max 125)
    /// - Expected response length larger than the capture buffer
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Decode request that does not fit the captured frame.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Serial port failure.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Bus configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Library internal failure (poisoned lock).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ModbusError {
    /// Create a no-response error for `slave_id`
    pub fn no_response(slave_id: u8) -> Self {
        Self::NoResponse { slave_id }
    }

    /// Create a short read error
    pub fn short_read(expected: usize, actual: usize) -> Self {
        Self::ShortRead { expected, actual }
    }

    /// Create a CRC mismatch error
    ///
    /// # Arguments
    ///
    /// * `expected` - CRC computed over the received frame body
    /// * `actual` - CRC carried in the frame
    pub fn checksum_mismatch(expected: u16, actual: u16) -> Self {
        Self::ChecksumMismatch { expected, actual }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameter { message: message.into() }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData { message: message.into() }
    }

    /// Create an I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if the error is recoverable (can retry)
    ///
    /// Bus-level failures are transient: a later transaction may well succeed.
    /// Caller and configuration mistakes fail the same way every time.
    ///
    /// ```rust
    /// use rs485_rtu::ModbusError;
    ///
    /// assert!(ModbusError::no_response(3).is_recoverable());
    /// assert!(ModbusError::checksum_mismatch(0x1234, 0x4321).is_recoverable());
    /// assert!(!ModbusError::invalid_parameter("count = 0").is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoResponse { .. }
                | Self::ShortRead { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Io { .. }
        )
    }

    /// Check if the error comes from the serial line itself
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::NoResponse { .. })
    }

    /// Check if the error is a framing/protocol issue
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::ShortRead { .. } | Self::ChecksumMismatch { .. })
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convert from serial port errors
impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        Self::io(format!("Serial port error: {}", err))
    }
}

/// Convert from serde YAML errors
impl From<serde_yaml::Error> for ModbusError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}

/// Convert from serde JSON errors
impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}
