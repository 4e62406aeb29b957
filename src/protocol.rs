/// Modbus RTU frame codec
///
/// Builds the fixed 8-byte request frames used by every device routine,
/// validates response frames, and provides the fixed-offset decode helpers
/// used to pull values out of a validated frame.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crc::{crc16, crc16_frame};
use crate::error::{ModbusError, ModbusResult};

/// Modbus slave address on the RS485 bus
pub type SlaveId = u8;

/// Register address (0-65535)
pub type RegisterAddress = u16;

/// Length of every request frame produced by this codec
pub const REQUEST_FRAME_LEN: usize = 8;

/// Response length of a 0x06 write: an echo of the request
pub const WRITE_ECHO_LEN: usize = 8;

/// Smallest frame that can carry a CRC: address, function, CRC pair
pub const MIN_FRAME_LEN: usize = 4;

/// Offset of the first data byte in a 0x03/0x04 response
pub const READ_DATA_OFFSET: usize = 3;

/// Function codes spoken by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03)
    #[serde(alias = "holding")]
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    #[serde(alias = "input")]
    ReadInputRegisters = 0x04,
    /// Write Single Register (0x06)
    #[serde(alias = "write")]
    WriteSingleRegister = 0x06,
}

impl FunctionCode {
    /// Convert from u8 to FunctionCode
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            _ => Err(ModbusError::invalid_parameter(format!(
                "Unsupported function code 0x{:02X}",
                value
            ))),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a register read
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters
        )
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleRegister => "Write Single Register",
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), *self as u8)
    }
}

/// Expected response length of a register read: header, byte count, data, CRC
pub fn expected_read_len(reg_count: u16) -> usize {
    5 + 2 * reg_count as usize
}

fn encode_frame(header: [u8; 6]) -> [u8; REQUEST_FRAME_LEN] {
    let crc = crc16(&header);
    let [crc_lo, crc_hi] = crc.to_le_bytes();
    [
        header[0], header[1], header[2], header[3], header[4], header[5], crc_lo, crc_hi,
    ]
}

/// Build a read request frame.
///
/// Layout: `address, function, start_hi, start_lo, count_hi, count_lo, crc_lo,
/// crc_hi`. The function byte is taken as given so that device routines with
/// non-standard codes can reuse the encoder.
///
/// ```rust
/// use rs485_rtu::protocol::encode_read_request;
///
/// let frame = encode_read_request(0x01, 0x03, 0x0000, 0x000A);
/// assert_eq!(frame, [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
/// ```
pub fn encode_read_request(
    address: SlaveId,
    function: u8,
    start_reg: RegisterAddress,
    reg_count: u16,
) -> [u8; REQUEST_FRAME_LEN] {
    let [start_hi, start_lo] = start_reg.to_be_bytes();
    let [count_hi, count_lo] = reg_count.to_be_bytes();
    encode_frame([address, function, start_hi, start_lo, count_hi, count_lo])
}

/// Build a 0x06 write single register frame
pub fn encode_write_request(
    address: SlaveId,
    register: RegisterAddress,
    value: u16,
) -> [u8; REQUEST_FRAME_LEN] {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let [value_hi, value_lo] = value.to_be_bytes();
    encode_frame([
        address,
        FunctionCode::WriteSingleRegister.to_u8(),
        reg_hi,
        reg_lo,
        value_hi,
        value_lo,
    ])
}

/// Check the trailing CRC of `raw` and hand the whole frame back.
///
/// The returned slice still contains the CRC pair; callers index data by
/// fixed offsets (3.. for register reads).
pub fn validate_and_extract(raw: &[u8]) -> ModbusResult<&[u8]> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(ModbusError::short_read(MIN_FRAME_LEN, raw.len()));
    }

    let len = raw.len();
    let received = (raw[len - 1] as u16) << 8 | raw[len - 2] as u16;
    let computed = crc16_frame(raw);

    if received != computed {
        return Err(ModbusError::checksum_mismatch(computed, received));
    }

    Ok(raw)
}

/// Register values of a validated 0x03/0x04 response.
///
/// Uses the byte-count field at offset 2 and refuses counts that run past the
/// CRC.
pub fn parse_registers(frame: &[u8]) -> ModbusResult<Vec<u16>> {
    if frame.len() < 5 {
        return Err(ModbusError::invalid_data("Frame too short for register data"));
    }

    let byte_count = frame[2] as usize;
    if byte_count % 2 != 0 {
        return Err(ModbusError::invalid_data(format!(
            "Odd register byte count: {}",
            byte_count
        )));
    }
    if READ_DATA_OFFSET + byte_count > frame.len() - 2 {
        return Err(ModbusError::invalid_data(format!(
            "Byte count {} exceeds frame of {} bytes",
            byte_count,
            frame.len()
        )));
    }

    Ok(frame[READ_DATA_OFFSET..READ_DATA_OFFSET + byte_count]
        .chunks_exact(2)
        .map(BigEndian::read_u16)
        .collect())
}

/// Fixed-offset value extraction
pub mod data_utils {
    use super::*;

    /// Order of the two 16-bit words that make up a 32-bit value
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum WordOrder {
        /// High word in the first register (Modbus convention)
        #[default]
        HighWordFirst,
        /// High word in the second register (common vendor swap)
        LowWordFirst,
    }

    fn window(payload: &[u8], offset: usize, width: usize) -> ModbusResult<&[u8]> {
        offset
            .checked_add(width)
            .and_then(|end| payload.get(offset..end))
            .ok_or_else(|| {
                ModbusError::invalid_data(format!(
                    "{} bytes at offset {} outside frame of {} bytes",
                    width,
                    offset,
                    payload.len()
                ))
            })
    }

    /// Big-endian 16-bit word at `offset`
    pub fn decode_u16_be(payload: &[u8], offset: usize) -> ModbusResult<u16> {
        Ok(BigEndian::read_u16(window(payload, offset, 2)?))
    }

    /// 32-bit value from two words: the word at `hi_pair_offset` is shifted
    /// into the upper half, the word at `lo_pair_offset` fills the lower half.
    pub fn decode_u32_be_split(
        payload: &[u8],
        hi_pair_offset: usize,
        lo_pair_offset: usize,
    ) -> ModbusResult<u32> {
        let hi = decode_u16_be(payload, hi_pair_offset)? as u32;
        let lo = decode_u16_be(payload, lo_pair_offset)? as u32;
        Ok(hi << 16 | lo)
    }

    /// 32-bit value from the two registers starting at `offset`
    pub fn decode_u32(payload: &[u8], offset: usize, order: WordOrder) -> ModbusResult<u32> {
        match order {
            WordOrder::HighWordFirst => {
                decode_u32_be_split(payload, offset, offset.saturating_add(2))
            }
            WordOrder::LowWordFirst => {
                decode_u32_be_split(payload, offset.saturating_add(2), offset)
            }
        }
    }

    /// IEEE-754 float from the two registers starting at `offset` (bit
    /// reinterpretation, not numeric conversion)
    pub fn decode_f32(payload: &[u8], offset: usize, order: WordOrder) -> ModbusResult<f32> {
        decode_u32(payload, offset, order).map(f32::from_bits)
    }

    /// IEEE-754 float in the vendor word order: high word in the second register
    pub fn decode_f32_be(payload: &[u8], offset: usize) -> ModbusResult<f32> {
        decode_f32(payload, offset, WordOrder::LowWordFirst)
    }
}

#[cfg(test)]
mod tests {
    use super::data_utils::*;
    use super::*;

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    #[test]
    fn test_function_conversion() {
        assert_eq!(
            FunctionCode::from_u8(0x03).unwrap(),
            FunctionCode::ReadHoldingRegisters
        );
        assert_eq!(FunctionCode::ReadInputRegisters.to_u8(), 0x04);
        assert!(FunctionCode::from_u8(0x01).is_err());
        assert!(!FunctionCode::WriteSingleRegister.is_read_function());
    }

    #[test]
    fn test_encode_read_request() {
        let frame = encode_read_request(0x01, 0x03, 0x0001, 0x0001);
        assert_eq!(frame, [0x01, 0x03, 0x00, 0x01, 0x00, 0x01, 0xD5, 0xCA]);

        let frame = encode_read_request(0x01, 0x03, 0x0000, 0x0002);
        assert_eq!(frame, [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]);
    }

    #[test]
    fn test_encode_write_request() {
        let frame = encode_write_request(0x01, 0x0001, 0x0003);
        assert_eq!(frame, [0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B]);
    }

    #[test]
    fn test_encoder_passes_own_validator() {
        for address in [1u8, 17, 127, 247, 255] {
            for function in [0x03u8, 0x04, 0x06] {
                for (start, count) in [(0u16, 1u16), (0x1234, 2), (0xFFFF, 125)] {
                    let frame = encode_read_request(address, function, start, count);
                    assert!(validate_and_extract(&frame).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_validate_returns_full_frame() {
        let frame = with_crc(&[0x01, 0x03, 0x02, 0x01, 0x90]);
        let validated = validate_and_extract(&frame).unwrap();
        assert_eq!(validated, &frame[..]);
        assert_eq!(decode_u16_be(validated, 3).unwrap(), 400);
    }

    #[test]
    fn test_validate_rejects_bad_crc() {
        let mut frame = with_crc(&[0x01, 0x03, 0x02, 0x01, 0x90]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        match validate_and_extract(&frame) {
            Err(ModbusError::ChecksumMismatch { expected, actual }) => {
                assert_ne!(expected, actual);
                assert_eq!(expected, crc16(&frame[..5]));
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_tiny_frame() {
        assert_eq!(
            validate_and_extract(&[0x01, 0x03]),
            Err(ModbusError::short_read(MIN_FRAME_LEN, 2))
        );
    }

    #[test]
    fn test_parse_registers() {
        let frame = with_crc(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        assert_eq!(parse_registers(&frame).unwrap(), vec![0x000A, 0x0102]);

        let lying = with_crc(&[0x01, 0x03, 0x08, 0x00, 0x0A]);
        assert!(parse_registers(&lying).is_err());
    }

    #[test]
    fn test_expected_read_len() {
        assert_eq!(expected_read_len(1), 7);
        assert_eq!(expected_read_len(2), 9);
        assert_eq!(expected_read_len(125), 255);
    }

    #[test]
    fn test_decode_u32_word_orders() {
        // registers: 0x5678, 0x1234
        let frame = [0x01, 0x03, 0x04, 0x56, 0x78, 0x12, 0x34, 0x00, 0x00];
        assert_eq!(decode_u32_be_split(&frame, 5, 3).unwrap(), 0x1234_5678);
        assert_eq!(decode_u32(&frame, 3, WordOrder::LowWordFirst).unwrap(), 0x1234_5678);
        assert_eq!(decode_u32(&frame, 3, WordOrder::HighWordFirst).unwrap(), 0x5678_1234);
    }

    #[test]
    fn test_decode_f32_vendor_order() {
        let bits = 230.5f32.to_bits();
        let hi = ((bits >> 16) as u16).to_be_bytes();
        let lo = (bits as u16).to_be_bytes();
        let frame = [0x01, 0x04, 0x04, lo[0], lo[1], hi[0], hi[1], 0x00, 0x00];

        assert_eq!(decode_f32_be(&frame, 3).unwrap(), 230.5);
        assert_ne!(decode_f32(&frame, 3, WordOrder::HighWordFirst).unwrap(), 230.5);
    }

    #[test]
    fn test_decode_out_of_bounds() {
        let frame = [0x01, 0x03, 0x02, 0x01];
        assert!(matches!(
            decode_u16_be(&frame, 3),
            Err(ModbusError::InvalidData { .. })
        ));
        assert!(decode_u16_be(&frame, usize::MAX).is_err());
    }
}
