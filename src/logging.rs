use std::sync::Arc;

use crate::protocol::FunctionCode;
use crate::utils::format::bytes_to_hex;

/// Log levels for the frame logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Error messages
    Error,
    /// Warning messages
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
}

/// Logging mode for frame display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Show raw frame bytes only
    Raw,
    /// Show interpreted frame fields
    Interpreted,
    /// Show both raw and interpreted data
    Both,
}

impl LogLevel {
    /// Convert log level to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Type alias for log callback functions
///
/// The callback receives a log level and message string
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Callback logger for RTU request and response frames
#[derive(Clone)]
pub struct FrameLogger {
    callback: Option<Arc<LogCallback>>,
    min_level: LogLevel,
    mode: LoggingMode,
}

impl FrameLogger {
    /// Create a new frame logger
    pub fn new(callback: Option<LogCallback>, min_level: LogLevel) -> Self {
        Self::with_mode(callback, min_level, LoggingMode::Interpreted)
    }

    /// Create a new frame logger with specific mode
    pub fn with_mode(
        callback: Option<LogCallback>,
        min_level: LogLevel,
        mode: LoggingMode,
    ) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode,
        }
    }

    /// Logger forwarding to the `log` facade
    pub fn facade(mode: LoggingMode) -> Self {
        let callback: LogCallback = Box::new(|level, message| match level {
            LogLevel::Error => log::error!("{}", message),
            LogLevel::Warn => log::warn!("{}", message),
            LogLevel::Info => log::info!("{}", message),
            LogLevel::Debug => log::debug!("{}", message),
        });
        Self::with_mode(Some(callback), LogLevel::Debug, mode)
    }

    /// Create a logger that outputs nothing (disabled)
    pub fn disabled() -> Self {
        Self::new(None, LogLevel::Error)
    }

    /// Set logging mode
    pub fn set_mode(&mut self, mode: LoggingMode) {
        self.mode = mode;
    }

    /// Get current logging mode
    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    /// Log a message at the specified level
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.should_log(level) {
            if let Some(ref callback) = self.callback {
                callback(level, message);
            }
        }
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn should_log(&self, level: LogLevel) -> bool {
        self.callback.is_some() && level as u8 <= self.min_level as u8
    }

    /// Log an outgoing request frame
    pub fn log_request(&self, frame: &[u8]) {
        self.log_frame("Request ->", frame, interpret_request);
    }

    /// Log an aligned response frame
    pub fn log_response(&self, frame: &[u8]) {
        self.log_frame("Response <-", frame, interpret_response);
    }

    /// Log a failed capture with whatever bytes arrived
    pub fn log_failure(&self, slave_id: u8, captured: &[u8], reason: &str) {
        self.warn(&format!(
            "Slave {} transaction failed: {} (captured {} bytes: {})",
            slave_id,
            reason,
            captured.len(),
            bytes_to_hex(captured)
        ));
    }

    fn log_frame(&self, direction: &str, frame: &[u8], interpret: fn(&[u8]) -> String) {
        match self.mode {
            LoggingMode::Raw => {
                self.info(&format!("RTU {} Raw: {}", direction, bytes_to_hex(frame)));
            }
            LoggingMode::Interpreted => {
                self.info(&format!("RTU {} {}", direction, interpret(frame)));
            }
            LoggingMode::Both => {
                self.info(&format!("RTU {} {}", direction, interpret(frame)));
                self.debug(&format!("RTU {} Raw: {}", direction, bytes_to_hex(frame)));
            }
        }
    }
}

impl Default for FrameLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

fn function_name(code: u8) -> &'static str {
    FunctionCode::from_u8(code)
        .map(|f| f.name())
        .unwrap_or("Unknown Function")
}

fn interpret_request(frame: &[u8]) -> String {
    if frame.len() < 6 {
        return format!("Data: {}", hex::encode(frame));
    }
    let register = u16::from_be_bytes([frame[2], frame[3]]);
    let operand = u16::from_be_bytes([frame[4], frame[5]]);
    let operand_label = if frame[1] == 0x06 { "Value" } else { "Quantity" };
    format!(
        "Slave: {}, Function: {} (0x{:02X}), Address: {}, {}: {}",
        frame[0],
        function_name(frame[1]),
        frame[1],
        register,
        operand_label,
        operand
    )
}

fn interpret_response(frame: &[u8]) -> String {
    if frame.len() < 4 {
        return format!("Data: {}", hex::encode(frame));
    }
    let (slave_id, code) = (frame[0], frame[1]);
    let pdu = &frame[2..frame.len() - 2];

    let detail = match code {
        0x03 | 0x04 if !pdu.is_empty() => {
            let registers: Vec<u16> = pdu[1..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            format!(
                "Byte count: {}, Registers: {:?}",
                pdu[0],
                &registers[..registers.len().min(8)]
            )
        }
        0x06 if pdu.len() >= 4 => {
            let register = u16::from_be_bytes([pdu[0], pdu[1]]);
            let value = u16::from_be_bytes([pdu[2], pdu[3]]);
            format!("Address: {}, Value: {} (0x{:04X})", register, value, value)
        }
        _ => format!("Data: {}", hex::encode(pdu)),
    };

    format!(
        "Slave: {}, Function: {} (0x{:02X}), {}",
        slave_id,
        function_name(code),
        code,
        detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capturing(mode: LoggingMode) -> (FrameLogger, Arc<Mutex<Vec<(LogLevel, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let callback: LogCallback = Box::new(move |level, message| {
            sink.lock().unwrap().push((level, message.to_string()));
        });
        (FrameLogger::with_mode(Some(callback), LogLevel::Debug, mode), lines)
    }

    #[test]
    fn test_interpreted_request() {
        let (logger, lines) = capturing(LoggingMode::Interpreted);
        logger.log_request(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].1,
            "RTU Request -> Slave: 1, Function: Read Holding Registers (0x03), Address: 0, Quantity: 10"
        );
    }

    #[test]
    fn test_raw_and_both_modes() {
        let frame = [0x01, 0x03, 0x02, 0x01, 0x90, 0xB9, 0xB8];

        let (raw, lines) = capturing(LoggingMode::Raw);
        raw.log_response(&frame);
        assert_eq!(lines.lock().unwrap()[0].1, "RTU Response <- Raw: 01 03 02 01 90 B9 B8");

        let (both, lines) = capturing(LoggingMode::Both);
        both.log_response(&frame);
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].1.contains("Registers: [400]"));
        assert_eq!(lines[1].0, LogLevel::Debug);
    }

    #[test]
    fn test_write_echo_and_unknown() {
        let (logger, lines) = capturing(LoggingMode::Interpreted);
        logger.log_response(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B]);
        logger.log_response(&[0x01, 0x83, 0x02, 0xC0, 0xF1]);

        let lines = lines.lock().unwrap();
        assert!(lines[0].1.contains("Address: 1, Value: 3 (0x0003)"));
        assert!(lines[1].1.contains("Unknown Function"));
    }

    #[test]
    fn test_level_filter_and_disabled() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let callback: LogCallback = Box::new(move |_, message| {
            sink.lock().unwrap().push(message.to_string());
        });
        let logger = FrameLogger::new(Some(callback), LogLevel::Warn);
        logger.debug("hidden");
        logger.log_failure(7, &[0x07], "short read");
        assert_eq!(lines.lock().unwrap().len(), 1);

        FrameLogger::disabled().log_request(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }
}
