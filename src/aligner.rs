//! # Response Aligner
//!
//! Captures a response of unknown length and carves out the frame the caller
//! expects. Two rules, both kept exactly as the device fleet relies on them:
//!
//! - **Resync**: whenever the first captured byte is a resync byte (`0x00`,
//!   and for some device families `0xFF`), the capture restarts from the next
//!   byte. Only the first byte is ever inspected.
//! - **Tail alignment**: a capture longer than expected keeps its *last*
//!   `expected_len` bytes; the extra leading bytes are treated as noise that
//!   arrived before the real frame.
//!
//! ## Known limitation
//!
//! Tail alignment is lossy. A reply with trailing garbage is cut at the wrong
//! place and then fails CRC validation, and a reply that legitimately starts
//! with `0x00` cannot be captured at all. Both behaviors are part of the wire
//! contract with deployed devices and are not corrected here.

use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, ModbusResult};

/// Which leading bytes restart the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Never restart
    Disabled,
    /// Restart on a leading `0x00`
    #[default]
    Zero,
    /// Restart on a leading `0x00` or `0xFF`
    ZeroOrFf,
}

impl ResyncPolicy {
    /// Check whether `byte` in the first slot restarts the capture
    pub fn triggers_on(self, byte: u8) -> bool {
        match self {
            ResyncPolicy::Disabled => false,
            ResyncPolicy::Zero => byte == 0x00,
            ResyncPolicy::ZeroOrFf => byte == 0x00 || byte == 0xFF,
        }
    }
}

/// Fixed-capacity response buffer filled one byte at a time
#[derive(Debug, Clone)]
pub struct Capture {
    buffer: Vec<u8>,
    len: usize,
    policy: ResyncPolicy,
    resyncs: usize,
}

impl Capture {
    /// Empty capture holding at most `capacity` bytes
    pub fn new(capacity: usize, policy: ResyncPolicy) -> Self {
        Self {
            buffer: vec![0u8; capacity],
            len: 0,
            policy,
            resyncs: 0,
        }
    }

    /// Run a whole byte sequence through a fresh capture
    pub fn from_bytes<I>(bytes: I, capacity: usize, policy: ResyncPolicy) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let mut capture = Self::new(capacity, policy);
        let mut bytes = bytes.into_iter();
        while !capture.is_full() {
            match bytes.next() {
                Some(byte) => capture.push(byte),
                None => break,
            }
        }
        capture
    }

    /// Store one byte, then apply the resync rule to the first slot
    pub fn push(&mut self, byte: u8) {
        if self.is_full() {
            return;
        }
        self.buffer[self.len] = byte;
        self.len += 1;

        if self.policy.triggers_on(self.buffer[0]) {
            self.len = 0;
            self.resyncs += 1;
        }
    }

    /// Check whether the buffer has reached capacity
    pub fn is_full(&self) -> bool {
        self.len >= self.buffer.len()
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether nothing has been kept
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of times the capture restarted
    pub fn resyncs(&self) -> usize {
        self.resyncs
    }

    /// Bytes captured so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// The trailing `expected_len` bytes of the capture
    ///
    /// `slave_id` is only used to label a [`ModbusError::NoResponse`].
    pub fn align(&self, expected_len: usize, slave_id: u8) -> ModbusResult<&[u8]> {
        align(self.as_bytes(), expected_len, slave_id)
    }
}

/// Keep the last `expected_len` bytes of `captured`
pub fn align(captured: &[u8], expected_len: usize, slave_id: u8) -> ModbusResult<&[u8]> {
    let n = captured.len();
    if n == 0 {
        return Err(ModbusError::no_response(slave_id));
    }
    if n < expected_len {
        return Err(ModbusError::short_read(expected_len, n));
    }
    Ok(&captured[n - expected_len..])
}
