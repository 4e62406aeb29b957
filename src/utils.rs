/// Utility functions and helpers for the RTU master
///
/// Parameter validation shared by the engine, frame formatting, and
/// transaction timing.

use std::time::{Duration, Instant};

use log::debug;

use crate::error::{ModbusError, ModbusResult};

/// Transaction counters and timings of one master
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub transactions: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_time: Duration,
    pub fastest: Option<Duration>,
    pub slowest: Option<Duration>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished transaction
    pub fn record(&mut self, elapsed: Duration, success: bool) {
        self.transactions += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_time += elapsed;
        self.fastest = Some(self.fastest.map_or(elapsed, |d| d.min(elapsed)));
        self.slowest = Some(self.slowest.map_or(elapsed, |d| d.max(elapsed)));
    }

    /// Mean transaction time, zero before the first transaction
    pub fn average(&self) -> Duration {
        match u32::try_from(self.transactions) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_time / n,
            Err(_) => self.total_time.div_f64(self.transactions as f64),
        }
    }

    /// Share of successful transactions in percent
    pub fn success_rate(&self) -> f64 {
        if self.transactions == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.transactions as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Wall-clock timer around one named operation
pub struct OperationTimer {
    label: String,
    started: Instant,
}

impl OperationTimer {
    pub fn start(label: &str) -> Self {
        debug!("{}: started", label);
        Self {
            label: label.to_string(),
            started: Instant::now(),
        }
    }

    /// Elapsed time since `start`
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        debug!("{}: finished in {:?}", self.label, elapsed);
        elapsed
    }
}

/// Parameter checks run before any byte reaches the bus
pub mod validation {
    use super::*;
    use crate::protocol::MIN_FRAME_LEN;
    use crate::MAX_REGISTERS_PER_REQUEST;

    /// Reject the broadcast address; it never produces a response
    pub fn validate_slave_id(slave_id: u8) -> ModbusResult<()> {
        if slave_id == 0 {
            return Err(ModbusError::invalid_parameter(
                "Slave address 0 is broadcast and never answers",
            ));
        }
        Ok(())
    }

    /// Register count of a single read request
    pub fn validate_register_count(count: u16) -> ModbusResult<()> {
        if !(1..=MAX_REGISTERS_PER_REQUEST).contains(&count) {
            return Err(ModbusError::invalid_parameter(format!(
                "Register count {} outside 1-{}",
                count, MAX_REGISTERS_PER_REQUEST
            )));
        }
        Ok(())
    }

    /// Expected response length must hold a CRC and fit the capture buffer
    pub fn validate_expected_len(expected_len: usize, capacity: usize) -> ModbusResult<()> {
        if expected_len < MIN_FRAME_LEN || expected_len > capacity {
            return Err(ModbusError::invalid_parameter(format!(
                "Expected response length {} outside {}-{}",
                expected_len, MIN_FRAME_LEN, capacity
            )));
        }
        Ok(())
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;
    use std::fmt::Write as _;

    /// Space separated upper-case hex, as frames are printed in device manuals
    pub fn bytes_to_hex(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 3);
        for (i, byte) in bytes.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:02X}", byte);
        }
        out
    }

    /// Milliseconds below one second, seconds above
    pub fn format_duration(duration: Duration) -> String {
        if duration < Duration::from_secs(1) {
            format!("{}ms", duration.as_millis())
        } else {
            format!("{:.2}s", duration.as_secs_f64())
        }
    }

    /// Multi-line summary printed at the end of a polling run
    pub fn format_metrics(metrics: &PerformanceMetrics) -> String {
        let or_na = |d: Option<Duration>| d.map_or_else(|| "N/A".to_string(), format_duration);
        format!(
            "Transactions: {} ({} ok, {} failed, {:.1}% success)\n\
             Timing: avg {}, fastest {}, slowest {}",
            metrics.transactions,
            metrics.succeeded,
            metrics.failed,
            metrics.success_rate(),
            format_duration(metrics.average()),
            or_na(metrics.fastest),
            or_na(metrics.slowest),
        )
    }
}

/// Logging utilities
pub mod logging {
    /// Route `log` records to the test harness output
    pub fn init_test_logger() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record() {
        let mut metrics = PerformanceMetrics::new();
        assert_eq!(metrics.average(), Duration::ZERO);

        metrics.record(Duration::from_millis(300), true);
        metrics.record(Duration::from_millis(330), true);
        metrics.record(Duration::from_millis(315), false);

        assert_eq!(metrics.transactions, 3);
        assert_eq!(metrics.succeeded, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.fastest, Some(Duration::from_millis(300)));
        assert_eq!(metrics.slowest, Some(Duration::from_millis(330)));
        assert_eq!(metrics.average(), Duration::from_millis(315));
        assert!((metrics.success_rate() - 66.67).abs() < 0.1);

        metrics.reset();
        assert_eq!(metrics, PerformanceMetrics::default());
    }

    #[test]
    fn test_validation() {
        assert!(validation::validate_slave_id(1).is_ok());
        assert!(validation::validate_slave_id(255).is_ok());
        assert!(validation::validate_slave_id(0).is_err());

        assert!(validation::validate_register_count(1).is_ok());
        assert!(validation::validate_register_count(125).is_ok());
        assert!(validation::validate_register_count(0).is_err());
        assert!(validation::validate_register_count(126).is_err());

        assert!(validation::validate_expected_len(7, 50).is_ok());
        assert!(validation::validate_expected_len(3, 50).is_err());
        assert!(validation::validate_expected_len(51, 50).is_err());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format::bytes_to_hex(&[0x01, 0x03, 0x10, 0xFF]), "01 03 10 FF");
        assert_eq!(format::bytes_to_hex(&[]), "");
        assert_eq!(format::format_duration(Duration::from_millis(300)), "300ms");
        assert_eq!(format::format_duration(Duration::from_millis(1500)), "1.50s");

        let mut metrics = PerformanceMetrics::new();
        metrics.record(Duration::from_millis(300), true);
        let summary = format::format_metrics(&metrics);
        assert!(summary.starts_with("Transactions: 1 (1 ok, 0 failed, 100.0% success)"));
        assert!(summary.contains("fastest 300ms"));
    }
}
