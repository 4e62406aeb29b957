/// Bus configuration: serial parameters, engine settings, device profiles
///
/// Configuration is plain data loaded from YAML (or JSON). Serial parameters
/// vary by device family (9600 8N1, 9600 8N2, 4800 8N1, ...), so they live
/// here rather than in the engine.
///
/// ```yaml
/// serial:
///   port: /dev/ttyUSB0
///   baud_rate: 9600
///   stop_bits: two
/// master:
///   resync: zero_or_ff
/// devices:
///   - name: cabinet-th
///     scan_range: { start: 1, end: 247 }
///     block: { function: input, start: 0, count: 2 }
///     registers:
///       - { name: temperature, offset: 3, format: i16, scale: 0.1 }
///       - { name: humidity, offset: 5, format: u16, scale: 0.1 }
/// ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aligner::ResyncPolicy;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{expected_read_len, FunctionCode, SlaveId, MIN_FRAME_LEN};
use crate::register_map::RegisterMap;
use crate::scanner::{ProbeSpec, ScanRange};
use crate::transport::DEFAULT_SETTLE_MS;
use crate::{MAX_REGISTERS_PER_REQUEST, MAX_RTU_FRAME_SIZE};

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

fn default_read_timeout_ms() -> u64 {
    50
}

/// Serial line parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name/path ("/dev/ttyUSB0", "COM3")
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    /// Fixed wait between writing a request and reading the answer
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Timeout of a single byte read once data is known to be available
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl SerialConfig {
    /// 8N1 with the default settle delay
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            settle_ms: DEFAULT_SETTLE_MS,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    /// Builder-style stop bits override (8N2 devices)
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Check the serial parameters
    pub fn validate(&self) -> ModbusResult<()> {
        if self.port.is_empty() {
            return Err(ModbusError::configuration("Serial port name is empty"));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::configuration("Baud rate must be positive"));
        }
        Ok(())
    }
}

fn default_capture_capacity() -> usize {
    MAX_RTU_FRAME_SIZE
}

/// Transaction engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Size of the response buffer; captures stop once it is full
    #[serde(default = "default_capture_capacity")]
    pub capture_capacity: usize,
    /// Leading bytes that restart the capture
    #[serde(default)]
    pub resync: ResyncPolicy,
    /// Hex dump every frame through `tracing`
    #[serde(default)]
    pub packet_logging: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            capture_capacity: default_capture_capacity(),
            resync: ResyncPolicy::default(),
            packet_logging: false,
        }
    }
}

impl MasterConfig {
    /// Check the engine settings
    pub fn validate(&self) -> ModbusResult<()> {
        if self.capture_capacity < MIN_FRAME_LEN {
            return Err(ModbusError::configuration(format!(
                "Capture capacity {} is below the minimum frame length {}",
                self.capture_capacity, MIN_FRAME_LEN
            )));
        }
        Ok(())
    }
}

/// Register block read from a device in one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBlock {
    pub function: FunctionCode,
    pub start: u16,
    pub count: u16,
}

impl ReadBlock {
    /// Length of the response frame this block produces
    pub fn response_len(&self) -> usize {
        expected_read_len(self.count)
    }
}

/// One field device on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    /// Known slave address; `None` means discover it by scanning
    #[serde(default)]
    pub address: Option<SlaveId>,
    #[serde(default)]
    pub scan_range: ScanRange,
    /// Probe used while scanning; defaults to reading `block`
    #[serde(default)]
    pub probe: Option<ProbeSpec>,
    pub block: ReadBlock,
    #[serde(default)]
    pub registers: RegisterMap,
}

impl DeviceProfile {
    /// Probe transaction for address discovery
    pub fn probe_spec(&self) -> ProbeSpec {
        self.probe.unwrap_or(ProbeSpec {
            function: self.block.function,
            register: self.block.start,
            count: self.block.count,
        })
    }

    /// Check the profile against the frame it will decode
    pub fn validate(&self) -> ModbusResult<()> {
        if let Some(0) = self.address {
            return Err(ModbusError::configuration(format!(
                "Device '{}': address 0 is broadcast and never answers",
                self.name
            )));
        }
        self.scan_range.validate()?;

        if !self.block.function.is_read_function() {
            return Err(ModbusError::configuration(format!(
                "Device '{}': block function {} is not a read",
                self.name, self.block.function
            )));
        }
        if self.block.count == 0 || self.block.count > MAX_REGISTERS_PER_REQUEST {
            return Err(ModbusError::configuration(format!(
                "Device '{}': block count {} outside 1-{}",
                self.name, self.block.count, MAX_REGISTERS_PER_REQUEST
            )));
        }

        if let Some(probe) = self.probe {
            if !probe.function.is_read_function() {
                return Err(ModbusError::configuration(format!(
                    "Device '{}': probe function {} is not a read",
                    self.name, probe.function
                )));
            }
            if probe.count == 0 || probe.count > MAX_REGISTERS_PER_REQUEST {
                return Err(ModbusError::configuration(format!(
                    "Device '{}': probe count {} outside 1-{}",
                    self.name, probe.count, MAX_REGISTERS_PER_REQUEST
                )));
            }
        }

        let data_end = self.block.response_len() - 2;
        for spec in self.registers.specs() {
            let overruns = spec
                .offset
                .checked_add(spec.format.width())
                .map_or(true, |end| end > data_end);
            if overruns {
                return Err(ModbusError::configuration(format!(
                    "Device '{}': register '{}' at offset {} overruns {}-byte frame",
                    self.name,
                    spec.name,
                    spec.offset,
                    self.block.response_len()
                )));
            }
        }
        Ok(())
    }
}

/// Complete bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    pub serial: SerialConfig,
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub devices: Vec<DeviceProfile>,
}

impl BusConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(text: &str) -> ModbusResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> ModbusResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file; `.json` files are parsed as JSON, anything
    /// else as YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ModbusError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check every section, including that each device's response fits the
    /// capture buffer
    pub fn validate(&self) -> ModbusResult<()> {
        self.serial.validate()?;
        self.master.validate()?;

        for device in &self.devices {
            device.validate()?;
            let needed = device.block.response_len().max(device.probe_spec().response_len());
            if needed > self.master.capture_capacity {
                return Err(ModbusError::configuration(format!(
                    "Device '{}' needs {} bytes but capture capacity is {}",
                    device.name, needed, self.master.capture_capacity
                )));
            }
        }
        Ok(())
    }

    /// Look up a device profile by name
    pub fn device(&self, name: &str) -> Option<&DeviceProfile> {
        self.devices.iter().find(|d| d.name == name)
    }
}
