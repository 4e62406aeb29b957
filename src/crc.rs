//! Modbus CRC16 (reflected polynomial 0xA001, seed 0xFFFF)
//!
//! The checksum travels low byte first on the wire; see
//! [`crate::protocol::encode_read_request`].

/// Initial accumulator value for every frame
pub const CRC_SEED: u16 = 0xFFFF;

/// Reflected form of the Modbus polynomial 0x8005
pub const CRC_POLYNOMIAL: u16 = 0xA001;

/// Fold one byte into the running checksum
#[inline]
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ byte as u16;
    for _ in 0..8 {
        if crc & 0x0001 != 0 {
            crc = (crc >> 1) ^ CRC_POLYNOMIAL;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// Checksum of `data`, starting from [`CRC_SEED`]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC_SEED, |crc, &byte| crc16_update(crc, byte))
}

/// Checksum of a complete frame, skipping its two trailing CRC bytes.
///
/// Frames shorter than two bytes have nothing to skip and yield the seed.
pub fn crc16_frame(frame: &[u8]) -> u16 {
    crc16(&frame[..frame.len().saturating_sub(2)])
}
