//! # rs485_rtu - Blocking Modbus RTU Master for RS485 Field Devices
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **Version:** 0.1.0
//! **License:** MIT
//!
//! A small, synchronous Modbus RTU master for polling sensors, meters and
//! controllers on a half-duplex RS485 bus. Each transaction flushes the line,
//! writes one fixed-size request, waits a fixed settle delay, captures whatever
//! arrived and validates it by CRC.
//!
//! ## Features
//!
//! - **Fixed Request Frames**: 8-byte 0x03/0x04/0x06 requests with CRC-16/MODBUS
//! - **Response Alignment**: leading-zero resync and tail alignment of noisy captures
//! - **Address Scanning**: linear discovery of a device's slave address
//! - **Table-Driven Decoding**: vendor register layouts described as data
//! - **Injectable Transport**: serial port or scripted in-memory bus behind one trait
//! - **Configuration Files**: YAML/JSON bus descriptions via serde
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Response |
//! |------|----------|----------|
//! | 0x03 | Read Holding Registers | `5 + 2 * count` bytes |
//! | 0x04 | Read Input Registers | `5 + 2 * count` bytes |
//! | 0x06 | Write Single Register | 8-byte echo |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rs485_rtu::config::SerialConfig;
//! use rs485_rtu::protocol::data_utils::decode_u16_be;
//! use rs485_rtu::transport::SerialRtuPort;
//! use rs485_rtu::{ModbusResult, RtuMaster};
//!
//! fn main() -> ModbusResult<()> {
//!     let port = SerialRtuPort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let mut master = RtuMaster::new(port);
//!
//!     // Read one holding register and decode it from the frame
//!     let frame = master.read_registers(1, 0x03, 0x0001, 1)?;
//!     println!("Register 1: {}", decode_u16_be(&frame, 3)?);
//!
//!     // Write single register
//!     master.write_register(1, 0x0001, 3)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │   Application / rtu_probe            │
//! └──────────────────────────────────────┘
//!          │                   │
//! ┌─────────────────┐ ┌─────────────────┐
//! │    Scanner      │ │  Register Map   │
//! └─────────────────┘ └─────────────────┘
//!          │                   │
//! ┌──────────────────────────────────────┐
//! │   RtuMaster (transaction engine)     │
//! └──────────────────────────────────────┘
//!          │                   │
//! ┌─────────────────┐ ┌─────────────────┐
//! │  Protocol/CRC   │ │    Aligner      │
//! └─────────────────┘ └─────────────────┘
//!          │
//! ┌──────────────────────────────────────┐
//! │   RtuPort (serial / scripted)        │
//! └──────────────────────────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// CRC-16/MODBUS checksum
pub mod crc;

/// Modbus RTU frame encoding, validation and decoding
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod protocol;

/// RS485 port abstraction and implementations
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod transport;

/// Response capture and alignment
pub mod aligner;

/// Transaction engine
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod client;

/// Slave address discovery
pub mod scanner;

/// Register decoding tables
pub mod register_map;

/// Bus and device configuration
pub mod config;

/// Utility functions and performance monitoring
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

/// Frame logging for the library
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod logging;

// Re-export main types for convenience
pub use error::{ModbusError, ModbusResult};
pub use protocol::{FunctionCode, SlaveId, RegisterAddress};
pub use transport::{RtuPort, SerialRtuPort, ScriptedPort, TransportStats};
pub use aligner::{Capture, ResyncPolicy};
pub use client::{ModbusMaster, RtuMaster, SharedMaster, TransactionStage};
pub use scanner::{scan_addresses, ProbeSpec, ScanRange};
pub use register_map::{RegisterMap, RegisterSpec, ValueFormat};
pub use config::{BusConfig, DeviceProfile, MasterConfig, ReadBlock, SerialConfig};
pub use utils::{PerformanceMetrics, OperationTimer};
pub use logging::{LogLevel, LogCallback, FrameLogger, LoggingMode};

/// Maximum number of registers that can be read in a single request
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Maximum Modbus RTU frame size, also the default capture capacity
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("rs485_rtu v{} - Blocking Modbus RTU master by Evan Liu", VERSION)
}
