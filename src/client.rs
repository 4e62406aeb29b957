/// RTU transaction engine
///
/// Every exchange with a device follows the same fixed sequence:
///
/// ```text
/// Idle -> Flushed -> Sent -> Settled -> Captured -> Validated -> Done
///                                                              \-> Failed
/// ```
///
/// The engine owns its port, so a call holds exclusive access to the bus for
/// its whole duration. A failed step ends the call with a specific error;
/// nothing is retried and no state survives into the next call.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::aligner::Capture;
use crate::config::{MasterConfig, ReadBlock};
use crate::error::{ModbusError, ModbusResult};
use crate::logging::FrameLogger;
use crate::protocol::{
    encode_read_request, encode_write_request, expected_read_len, parse_registers,
    validate_and_extract, FunctionCode, RegisterAddress, SlaveId, WRITE_ECHO_LEN,
};
use crate::register_map::{RegisterMap, RegisterSpec};
use crate::transport::{log_packet, RtuPort, TransportStats};
use crate::utils::{validation, OperationTimer, PerformanceMetrics};

/// Step a transaction has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    Idle,
    Flushed,
    Sent,
    Settled,
    Captured,
    Validated,
    Done,
    Failed,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStage::Idle => "idle",
            TransactionStage::Flushed => "flushed",
            TransactionStage::Sent => "sent",
            TransactionStage::Settled => "settled",
            TransactionStage::Captured => "captured",
            TransactionStage::Validated => "validated",
            TransactionStage::Done => "done",
            TransactionStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Function-code level operations of an RTU master
///
/// `read_registers` and `write_register` are the primitives; the numbered
/// methods follow the function code naming used throughout the crate.
pub trait ModbusMaster {
    /// Validated response frame of a 0x03/0x04 read, CRC included
    fn read_registers(
        &mut self,
        slave_id: SlaveId,
        function: u8,
        address: RegisterAddress,
        quantity: u16,
    ) -> ModbusResult<Vec<u8>>;

    /// Write one register and check the echoed frame
    fn write_register(
        &mut self,
        slave_id: SlaveId,
        address: RegisterAddress,
        value: u16,
    ) -> ModbusResult<()>;

    /// Get transport statistics
    fn get_stats(&self) -> TransportStats;

    /// Read holding registers (function code 0x03)
    fn read_03(
        &mut self,
        slave_id: SlaveId,
        address: RegisterAddress,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let frame = self.read_registers(
            slave_id,
            FunctionCode::ReadHoldingRegisters.to_u8(),
            address,
            quantity,
        )?;
        parse_registers(&frame)
    }

    /// Read input registers (function code 0x04)
    fn read_04(
        &mut self,
        slave_id: SlaveId,
        address: RegisterAddress,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let frame = self.read_registers(
            slave_id,
            FunctionCode::ReadInputRegisters.to_u8(),
            address,
            quantity,
        )?;
        parse_registers(&frame)
    }

    /// Write single register (function code 0x06)
    fn write_06(
        &mut self,
        slave_id: SlaveId,
        address: RegisterAddress,
        value: u16,
    ) -> ModbusResult<()> {
        self.write_register(slave_id, address, value)
    }
}

/// Blocking Modbus RTU master bound to one port
pub struct RtuMaster<P: RtuPort> {
    port: P,
    config: MasterConfig,
    stats: TransportStats,
    metrics: PerformanceMetrics,
    logger: Option<FrameLogger>,
}

impl<P: RtuPort> RtuMaster<P> {
    /// Master with the default engine settings
    pub fn new(port: P) -> Self {
        Self::with_config(port, MasterConfig::default())
    }

    /// Master with explicit engine settings
    pub fn with_config(port: P, config: MasterConfig) -> Self {
        Self {
            port,
            config,
            stats: TransportStats::default(),
            metrics: PerformanceMetrics::new(),
            logger: None,
        }
    }

    /// Attach a frame logger
    pub fn with_logger(mut self, logger: FrameLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn set_logger(&mut self, logger: Option<FrameLogger>) {
        self.logger = logger;
    }

    /// Enable/disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.config.packet_logging = enabled;
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Get a reference to the underlying port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give the port back
    pub fn into_inner(self) -> P {
        self.port
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Run one raw exchange and return the aligned, CRC-checked frame.
    ///
    /// `request` is written as is; its first byte labels errors and logs.
    pub fn transact(&mut self, request: &[u8], expected_len: usize) -> ModbusResult<Vec<u8>> {
        let slave_id = *request
            .first()
            .ok_or_else(|| ModbusError::invalid_parameter("Empty request frame"))?;
        validation::validate_expected_len(expected_len, self.config.capture_capacity)?;

        let timer = OperationTimer::start("rtu transaction");
        let mut stage = TransactionStage::Idle;
        let result = self.run_stages(request, expected_len, slave_id, &mut stage);
        let duration = timer.stop();

        match &result {
            Ok(_) => {
                self.stats.responses_received += 1;
                self.metrics.record(duration, true);
                debug!(
                    "Slave {} transaction {} in {:?}",
                    slave_id,
                    TransactionStage::Done,
                    duration
                );
            }
            Err(e) => {
                self.stats.errors += 1;
                self.metrics.record(duration, false);
                if matches!(e, ModbusError::NoResponse { .. }) {
                    self.stats.no_responses += 1;
                    debug!(
                        "Slave {} transaction {} after {}: {}",
                        slave_id,
                        TransactionStage::Failed,
                        stage,
                        e
                    );
                } else {
                    warn!(
                        "Slave {} transaction {} after {}: {}",
                        slave_id,
                        TransactionStage::Failed,
                        stage,
                        e
                    );
                }
            }
        }

        result
    }

    fn run_stages(
        &mut self,
        request: &[u8],
        expected_len: usize,
        slave_id: SlaveId,
        stage: &mut TransactionStage,
    ) -> ModbusResult<Vec<u8>> {
        self.port.flush()?;
        self.stats.flushes += 1;
        *stage = TransactionStage::Flushed;

        if self.config.packet_logging {
            log_packet("send", request, slave_id);
        }
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        self.port.write(request)?;
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += request.len() as u64;
        *stage = TransactionStage::Sent;

        self.port.settle();
        *stage = TransactionStage::Settled;

        let capture = self.capture()?;
        self.stats.bytes_received += capture.len() as u64;
        if self.config.packet_logging && !capture.is_empty() {
            log_packet("recv", capture.as_bytes(), slave_id);
        }
        if capture.resyncs() > 0 {
            debug!("Slave {} capture restarted {} time(s)", slave_id, capture.resyncs());
        }
        *stage = TransactionStage::Captured;

        let frame = match capture
            .align(expected_len, slave_id)
            .and_then(validate_and_extract)
        {
            Ok(frame) => frame,
            Err(e) => {
                if let Some(logger) = &self.logger {
                    logger.log_failure(slave_id, capture.as_bytes(), &e.to_string());
                }
                return Err(e);
            }
        };
        *stage = TransactionStage::Validated;

        if let Some(logger) = &self.logger {
            logger.log_response(frame);
        }
        Ok(frame.to_vec())
    }

    /// Drain available bytes into a fresh capture, stopping at capacity
    fn capture(&mut self) -> ModbusResult<Capture> {
        let mut capture = Capture::new(self.config.capture_capacity, self.config.resync);
        let mut incoming = self.port.read_available();
        while !capture.is_full() {
            match incoming.next() {
                Some(byte) => capture.push(byte?),
                None => break,
            }
        }
        Ok(capture)
    }

    /// Read `count` registers and return the validated response frame.
    ///
    /// Data starts at offset 3; the trailing CRC pair is kept. All parameters
    /// are checked before anything is written to the bus.
    pub fn read_registers(
        &mut self,
        address: SlaveId,
        function: u8,
        start_reg: RegisterAddress,
        count: u16,
    ) -> ModbusResult<Vec<u8>> {
        validation::validate_slave_id(address)?;
        let function_code = FunctionCode::from_u8(function)?;
        if !function_code.is_read_function() {
            return Err(ModbusError::invalid_parameter(format!(
                "{} is not a register read",
                function_code
            )));
        }
        validation::validate_register_count(count)?;
        let expected_len = expected_read_len(count);
        validation::validate_expected_len(expected_len, self.config.capture_capacity)?;

        debug!(
            "Slave {} {}: start 0x{:04X}, count {}",
            address, function_code, start_reg, count
        );
        let request = encode_read_request(address, function, start_reg, count);
        self.transact(&request, expected_len)
    }

    /// Write one holding register; success means a CRC-valid 8-byte echo
    pub fn write_register(
        &mut self,
        address: SlaveId,
        register: RegisterAddress,
        value: u16,
    ) -> ModbusResult<()> {
        validation::validate_slave_id(address)?;
        debug!("Slave {} write 0x{:04X} = {}", address, register, value);
        let request = encode_write_request(address, register, value);
        self.transact(&request, WRITE_ECHO_LEN).map(|_| ())
    }

    /// Read `block` and decode a single value from it
    pub fn read_value(
        &mut self,
        address: SlaveId,
        block: &ReadBlock,
        spec: &RegisterSpec,
    ) -> ModbusResult<f64> {
        let frame = self.read_registers(address, block.function.to_u8(), block.start, block.count)?;
        spec.decode(&frame)
    }

    /// Read `block` once and decode every entry of `map`
    pub fn read_map(
        &mut self,
        address: SlaveId,
        block: &ReadBlock,
        map: &RegisterMap,
    ) -> ModbusResult<Vec<(String, f64)>> {
        let frame = self.read_registers(address, block.function.to_u8(), block.start, block.count)?;
        map.decode_all(&frame)
    }
}

impl<P: RtuPort> ModbusMaster for RtuMaster<P> {
    fn read_registers(
        &mut self,
        slave_id: SlaveId,
        function: u8,
        address: RegisterAddress,
        quantity: u16,
    ) -> ModbusResult<Vec<u8>> {
        RtuMaster::read_registers(self, slave_id, function, address, quantity)
    }

    fn write_register(
        &mut self,
        slave_id: SlaveId,
        address: RegisterAddress,
        value: u16,
    ) -> ModbusResult<()> {
        RtuMaster::write_register(self, slave_id, address, value)
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

impl<P: RtuPort + fmt::Debug> fmt::Debug for RtuMaster<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtuMaster")
            .field("port", &self.port)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Master shared between threads
///
/// The bus is half-duplex, so whole transactions are serialised behind one
/// lock. Clones share the same master.
pub struct SharedMaster<P: RtuPort> {
    inner: Arc<Mutex<RtuMaster<P>>>,
}

impl<P: RtuPort> SharedMaster<P> {
    pub fn new(master: RtuMaster<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(master)),
        }
    }

    /// Run `f` with exclusive access to the master
    pub fn transaction<R, F>(&self, f: F) -> ModbusResult<R>
    where
        F: FnOnce(&mut RtuMaster<P>) -> ModbusResult<R>,
    {
        let mut master = self
            .inner
            .lock()
            .map_err(|_| ModbusError::internal("RTU master lock poisoned"))?;
        f(&mut master)
    }
}

impl<P: RtuPort> Clone for SharedMaster<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: RtuPort> ModbusMaster for SharedMaster<P> {
    fn read_registers(
        &mut self,
        slave_id: SlaveId,
        function: u8,
        address: RegisterAddress,
        quantity: u16,
    ) -> ModbusResult<Vec<u8>> {
        self.transaction(|master| master.read_registers(slave_id, function, address, quantity))
    }

    fn write_register(
        &mut self,
        slave_id: SlaveId,
        address: RegisterAddress,
        value: u16,
    ) -> ModbusResult<()> {
        self.transaction(|master| master.write_register(slave_id, address, value))
    }

    fn get_stats(&self) -> TransportStats {
        match self.inner.lock() {
            Ok(master) => master.stats().clone(),
            Err(poisoned) => {
                warn!("Shared master lock poisoned, reporting last known stats");
                poisoned.into_inner().stats().clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::ResyncPolicy;
    use crate::crc::crc16;
    use crate::logging::{LogCallback, LogLevel, LoggingMode};
    use crate::register_map::ValueFormat;
    use crate::transport::ScriptedPort;
    use std::thread;

    fn reply(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    fn master_with(responses: Vec<Vec<u8>>) -> RtuMaster<ScriptedPort> {
        let mut port = ScriptedPort::new();
        for response in responses {
            port.queue_response(response);
        }
        RtuMaster::new(port)
    }

    #[test]
    fn test_read_registers_sequence() {
        let response = reply(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        let mut master = master_with(vec![response.clone()]);

        let frame = master.read_registers(1, 0x03, 0x0000, 2).unwrap();
        assert_eq!(frame, response);

        let port = master.port();
        assert_eq!(port.written(), &[vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]]);
        assert_eq!(port.flush_count(), 1);
        assert_eq!(port.settle_count(), 1);

        let stats = master.stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_received, 1);
        assert_eq!(stats.bytes_sent, 8);
        assert_eq!(stats.bytes_received, 9);
    }

    #[test]
    fn test_write_register_echo() {
        let echo = vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B];
        let mut master = master_with(vec![echo.clone()]);

        master.write_register(1, 0x0001, 3).unwrap();
        assert_eq!(master.port().written()[0], echo);
    }

    #[test]
    fn test_corrupt_echo_fails() {
        let mut master = master_with(vec![vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0C]]);
        assert!(matches!(
            master.write_register(1, 0x0001, 3),
            Err(ModbusError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_silent_device() {
        let mut master = master_with(vec![]);
        assert_eq!(
            master.read_registers(9, 0x04, 0, 1),
            Err(ModbusError::no_response(9))
        );
        assert_eq!(master.stats().no_responses, 1);
        assert_eq!(master.metrics().failed, 1);
    }

    #[test]
    fn test_short_read() {
        let mut master = master_with(vec![vec![0x01, 0x03, 0x02]]);
        assert_eq!(
            master.read_registers(1, 0x03, 0, 1),
            Err(ModbusError::short_read(7, 3))
        );
    }

    #[test]
    fn test_parameters_checked_before_io() {
        let mut master = RtuMaster::with_config(
            ScriptedPort::new(),
            MasterConfig {
                capture_capacity: 8,
                ..MasterConfig::default()
            },
        );

        let rejected = [
            master.read_registers(0, 0x03, 0, 1),
            master.read_registers(1, 0x03, 0, 0),
            master.read_registers(1, 0x03, 0, 126),
            master.read_registers(1, 0x06, 0, 1),
            master.read_registers(1, 0x10, 0, 1),
            master.read_registers(1, 0x03, 0, 2),
        ];
        for result in rejected {
            assert!(matches!(result, Err(ModbusError::InvalidParameter { .. })));
        }
        assert!(master.write_register(0, 1, 1).is_err());
        assert!(master.transact(&[], 8).is_err());

        assert!(master.port().written().is_empty());
        assert_eq!(master.port().flush_count(), 0);
    }

    #[test]
    fn test_stale_input_discarded() {
        let response = reply(&[0x01, 0x03, 0x02, 0x01, 0x90]);
        let mut master = master_with(vec![response.clone()]);
        master.port_mut().inject_input(&[0x01, 0x03, 0x02, 0xFF, 0xFF, 0x12, 0x34]);

        assert_eq!(master.read_registers(1, 0x03, 1, 1).unwrap(), response);
    }

    #[test]
    fn test_leading_zero_resync() {
        let response = reply(&[0x01, 0x03, 0x02, 0x01, 0x90]);
        let mut raw = vec![0x00, 0x00];
        raw.extend_from_slice(&response);
        let mut master = master_with(vec![raw]);

        assert_eq!(master.read_registers(1, 0x03, 1, 1).unwrap(), response);
        assert_eq!(master.stats().bytes_received, 7);
    }

    #[test]
    fn test_resync_disabled_keeps_noise() {
        let response = reply(&[0x01, 0x03, 0x02, 0x01, 0x90]);
        let mut raw = vec![0x00];
        raw.extend_from_slice(&response);

        let mut port = ScriptedPort::new();
        port.queue_response(raw);
        let config = MasterConfig {
            resync: ResyncPolicy::Disabled,
            ..MasterConfig::default()
        };
        let mut master = RtuMaster::with_config(port, config);

        // the zero is kept but tail alignment still finds the frame
        assert_eq!(master.read_registers(1, 0x03, 1, 1).unwrap(), response);
        assert_eq!(master.stats().bytes_received, 8);
    }

    #[test]
    fn test_capture_stops_at_capacity() {
        let mut port = ScriptedPort::new();
        port.queue_response((1..=40).collect());
        let config = MasterConfig {
            capture_capacity: 16,
            ..MasterConfig::default()
        };
        let mut master = RtuMaster::with_config(port, config);

        assert!(master.read_registers(1, 0x03, 0, 1).is_err());
        assert_eq!(master.stats().bytes_received, 16);
        assert_eq!(master.port().pending_input(), 24);
    }

    #[test]
    fn test_numbered_operations() {
        let mut master = master_with(vec![
            reply(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]),
            reply(&[0x01, 0x04, 0x02, 0xFF, 0xFE]),
            vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B],
        ]);

        assert_eq!(master.read_03(1, 0, 2).unwrap(), vec![10, 258]);
        assert_eq!(master.read_04(1, 0, 1).unwrap(), vec![0xFFFE]);
        master.write_06(1, 1, 3).unwrap();
        assert_eq!(master.get_stats().responses_received, 3);
    }

    #[test]
    fn test_read_value_and_map() {
        let body = [0x05, 0x03, 0x04, 0x00, 0xE6, 0xFF, 0x85];
        let mut master = master_with(vec![reply(&body), reply(&body)]);
        let block = ReadBlock {
            function: FunctionCode::ReadHoldingRegisters,
            start: 0x0000,
            count: 2,
        };

        let humidity = RegisterSpec::new("humidity", 3, ValueFormat::U16).scaled(0.1);
        let value = master.read_value(5, &block, &humidity).unwrap();
        assert!((value - 23.0).abs() < 1e-9);

        let map = RegisterMap::new(vec![
            humidity,
            RegisterSpec::new("temperature", 5, ValueFormat::I16).scaled(0.1),
        ]);
        let values = master.read_map(5, &block, &map).unwrap();
        assert!((values[1].1 + 12.3).abs() < 1e-9);
    }

    #[test]
    fn test_frame_logger_sees_transaction() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let callback: LogCallback = Box::new(move |_, message| {
            sink.lock().unwrap().push(message.to_string());
        });
        let logger = FrameLogger::with_mode(Some(callback), LogLevel::Debug, LoggingMode::Raw);

        let mut master =
            master_with(vec![reply(&[0x01, 0x03, 0x02, 0x01, 0x90])]).with_logger(logger);
        master.set_packet_logging(true);
        master.read_registers(1, 0x03, 1, 1).unwrap();
        let _ = master.read_registers(1, 0x03, 1, 1);

        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], "RTU Request -> Raw: 01 03 00 01 00 01 D5 CA");
        assert_eq!(lines[1], "RTU Response <- Raw: 01 03 02 01 90 B9 B8");
        assert!(lines[3].contains("Slave 1 transaction failed"));
    }

    #[test]
    fn test_shared_master_across_threads() {
        let port = ScriptedPort::with_responder(|request| {
            let body = [request[0], 0x03, 0x02, 0x00, request[0]];
            let mut frame = body.to_vec();
            frame.extend_from_slice(&crc16(&body).to_le_bytes());
            Some(frame)
        });
        let shared = SharedMaster::new(RtuMaster::new(port));

        let handles: Vec<_> = (1..=4u8)
            .map(|address| {
                let mut master = shared.clone();
                thread::spawn(move || master.read_03(address, 0, 1))
            })
            .collect();

        for (address, handle) in (1..=4u8).zip(handles) {
            assert_eq!(handle.join().unwrap().unwrap(), vec![address as u16]);
        }
        assert_eq!(shared.get_stats().requests_sent, 4);
        assert_eq!(
            shared.transaction(|master| Ok(master.port().written().len())).unwrap(),
            4
        );
    }

    #[test]
    fn test_shared_master_stats_survive_poisoned_lock() {
        let shared = SharedMaster::new(master_with(vec![reply(&[0x01, 0x03, 0x02, 0x01, 0x90])]));
        let mut master = shared.clone();
        assert_eq!(master.read_03(1, 1, 1).unwrap(), vec![400]);

        let poisoner = shared.clone();
        let result = thread::spawn(move || {
            poisoner.transaction::<(), _>(|_| panic!("caller bug while holding the bus"))
        })
        .join();
        assert!(result.is_err());

        assert!(matches!(
            shared.transaction(|master| Ok(master.stats().clone())),
            Err(ModbusError::Internal { .. })
        ));
        let stats = shared.get_stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_received, 1);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(TransactionStage::Settled.to_string(), "settled");
        assert_eq!(format!("{}", TransactionStage::Failed), "failed");
    }
}
