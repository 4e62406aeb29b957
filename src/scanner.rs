//! # Address Scanner
//!
//! Finds the slave address of a device by running the same read transaction
//! against every candidate address in ascending order until one answers with
//! a correctly sized, CRC-valid frame.
//!
//! Each probe blocks for the full settle delay, so a miss-heavy 1-255 scan at
//! 300 ms per probe takes over a minute. Probes stop at the first hit.
//!
//! ```rust
//! use rs485_rtu::scanner::scan_addresses;
//! use rs485_rtu::ModbusError;
//!
//! let found = scan_addresses(1..=247, |address| {
//!     if address == 42 { Ok(()) } else { Err(ModbusError::no_response(address)) }
//! });
//! assert_eq!(found, Some(42));
//! ```

use std::ops::RangeInclusive;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::client::RtuMaster;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{expected_read_len, FunctionCode, SlaveId};
use crate::transport::RtuPort;
use crate::utils::OperationTimer;

/// Inclusive range of candidate addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    pub start: SlaveId,
    pub end: SlaveId,
}

impl ScanRange {
    /// 7-bit address families
    pub const UP_TO_127: ScanRange = ScanRange { start: 1, end: 127 };
    /// Standard Modbus unicast range
    pub const UP_TO_247: ScanRange = ScanRange { start: 1, end: 247 };
    pub const UP_TO_252: ScanRange = ScanRange { start: 1, end: 252 };
    pub const UP_TO_253: ScanRange = ScanRange { start: 1, end: 253 };
    /// Every non-broadcast address
    pub const UP_TO_255: ScanRange = ScanRange { start: 1, end: 255 };

    pub fn new(start: SlaveId, end: SlaveId) -> ModbusResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Reject broadcast and reversed ranges
    pub fn validate(&self) -> ModbusResult<()> {
        if self.start == 0 || self.start > self.end {
            return Err(ModbusError::configuration(format!(
                "Invalid scan range {}-{}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn to_range(self) -> RangeInclusive<SlaveId> {
        self.start..=self.end
    }

    /// Number of candidate addresses
    pub fn len(&self) -> usize {
        self.to_range().count()
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::UP_TO_247
    }
}

impl From<ScanRange> for RangeInclusive<SlaveId> {
    fn from(range: ScanRange) -> Self {
        range.to_range()
    }
}

/// Fixed read transaction used to probe each candidate address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub function: FunctionCode,
    pub register: u16,
    #[serde(default = "default_probe_count")]
    pub count: u16,
}

fn default_probe_count() -> u16 {
    1
}

impl ProbeSpec {
    /// Single holding register read
    pub fn holding(register: u16) -> Self {
        Self {
            function: FunctionCode::ReadHoldingRegisters,
            register,
            count: 1,
        }
    }

    /// Single input register read
    pub fn input(register: u16) -> Self {
        Self {
            function: FunctionCode::ReadInputRegisters,
            register,
            count: 1,
        }
    }

    /// Length of the response frame a hit produces
    pub fn response_len(&self) -> usize {
        expected_read_len(self.count)
    }
}

/// First address in `range` for which `probe` succeeds.
///
/// Candidates are tried in ascending order and nothing after the hit is
/// probed. `None` means the range was exhausted.
pub fn scan_addresses<T, F>(range: RangeInclusive<SlaveId>, mut probe: F) -> Option<SlaveId>
where
    F: FnMut(SlaveId) -> ModbusResult<T>,
{
    for address in range {
        match probe(address) {
            Ok(_) => return Some(address),
            Err(e) => debug!("Scan: address {} did not answer: {}", address, e),
        }
    }
    None
}

impl<P: RtuPort> RtuMaster<P> {
    /// Discover the address of a device answering `probe` within `range`
    pub fn scan(&mut self, range: ScanRange, probe: &ProbeSpec) -> Option<SlaveId> {
        let timer = OperationTimer::start(&format!(
            "scan {}-{} with {}",
            range.start, range.end, probe.function
        ));

        let found = scan_addresses(range.to_range(), |address| {
            self.read_registers(address, probe.function.to_u8(), probe.register, probe.count)
        });

        let elapsed = timer.stop();
        match found {
            Some(address) => info!("Scan found device at address {} after {:?}", address, elapsed),
            None => info!(
                "Scan of {}-{} found no device after {:?}",
                range.start, range.end, elapsed
            ),
        }
        found
    }
}
