/// Table-driven register decoding
///
/// Each vendor places values at different offsets, widths, word orders and
/// scale factors. Instead of one routine per register, a device is described
/// by a list of [`RegisterSpec`] entries decoded by a single function.

use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, ModbusResult};
use crate::protocol::data_utils::{decode_f32, decode_u16_be, decode_u32, WordOrder};

/// Raw encoding of a value inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl ValueFormat {
    /// Width in bytes
    pub fn width(self) -> usize {
        match self {
            ValueFormat::U16 | ValueFormat::I16 => 2,
            ValueFormat::U32 | ValueFormat::I32 | ValueFormat::F32 => 4,
        }
    }
}

fn default_scale() -> f64 {
    1.0
}

/// Location and scaling of one value in a response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSpec {
    pub name: String,
    /// Byte offset into the full frame (3 is the first data byte of a read)
    pub offset: usize,
    pub format: ValueFormat,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub word_order: WordOrder,
}

impl RegisterSpec {
    /// Register entry with scale 1 and Modbus word order
    pub fn new(name: &str, offset: usize, format: ValueFormat) -> Self {
        Self {
            name: name.to_string(),
            offset,
            format,
            scale: default_scale(),
            word_order: WordOrder::default(),
        }
    }

    /// Builder-style scale factor
    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Builder-style word order
    pub fn word_order(mut self, order: WordOrder) -> Self {
        self.word_order = order;
        self
    }

    /// Decode this value from a validated frame
    pub fn decode(&self, frame: &[u8]) -> ModbusResult<f64> {
        let raw = match self.format {
            ValueFormat::U16 => decode_u16_be(frame, self.offset)? as f64,
            ValueFormat::I16 => decode_u16_be(frame, self.offset)? as i16 as f64,
            ValueFormat::U32 => decode_u32(frame, self.offset, self.word_order)? as f64,
            ValueFormat::I32 => decode_u32(frame, self.offset, self.word_order)? as i32 as f64,
            ValueFormat::F32 => decode_f32(frame, self.offset, self.word_order)? as f64,
        };

        if !raw.is_finite() {
            return Err(ModbusError::invalid_data(format!(
                "Register '{}' decoded to a non-finite value",
                self.name
            )));
        }

        Ok(raw * self.scale)
    }
}

/// Named list of register specs decoded from one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterMap {
    specs: Vec<RegisterSpec>,
}

impl RegisterMap {
    pub fn new(specs: Vec<RegisterSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[RegisterSpec] {
        &self.specs
    }

    /// Decode every value, stopping at the first that does not fit the frame
    pub fn decode_all(&self, frame: &[u8]) -> ModbusResult<Vec<(String, f64)>> {
        self.specs
            .iter()
            .map(|spec| spec.decode(frame).map(|value| (spec.name.clone(), value)))
            .collect()
    }
}

impl From<Vec<RegisterSpec>> for RegisterMap {
    fn from(specs: Vec<RegisterSpec>) -> Self {
        Self::new(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    #[test]
    fn test_scaled_u16() {
        let frame = frame(&[0x01, 0x03, 0x02, 0x01, 0x90]);
        let spec = RegisterSpec::new("humidity", 3, ValueFormat::U16).scaled(0.1);
        assert!((spec.decode(&frame).unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_i16() {
        // -12.5 degrees at 0.1 resolution
        let raw = (-125i16).to_be_bytes();
        let frame = frame(&[0x01, 0x04, 0x02, raw[0], raw[1]]);
        let spec = RegisterSpec::new("temperature", 3, ValueFormat::I16).scaled(0.1);
        assert!((spec.decode(&frame).unwrap() + 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_swapped_u32_energy() {
        // 0x0001_86A0 = 100000 Wh sent low word first
        let frame = frame(&[0x01, 0x03, 0x04, 0x86, 0xA0, 0x00, 0x01]);
        let spec = RegisterSpec::new("energy", 3, ValueFormat::U32)
            .scaled(0.001)
            .word_order(WordOrder::LowWordFirst);
        assert!((spec.decode(&frame).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_i32_and_f32() {
        let power = (-1500i32).to_be_bytes();
        let volts = 231.25f32.to_be_bytes();
        let frame = frame(&[
            0x01, 0x03, 0x08, power[0], power[1], power[2], power[3], volts[0], volts[1],
            volts[2], volts[3],
        ]);

        let map = RegisterMap::new(vec![
            RegisterSpec::new("power", 3, ValueFormat::I32),
            RegisterSpec::new("voltage", 7, ValueFormat::F32),
        ]);
        let values = map.decode_all(&frame).unwrap();
        assert_eq!(values[0], ("power".to_string(), -1500.0));
        assert_eq!(values[1], ("voltage".to_string(), 231.25));
    }

    #[test]
    fn test_nan_rejected() {
        let nan = f32::NAN.to_be_bytes();
        let frame = frame(&[0x01, 0x03, 0x04, nan[0], nan[1], nan[2], nan[3]]);
        let spec = RegisterSpec::new("bad", 3, ValueFormat::F32);
        assert!(matches!(spec.decode(&frame), Err(ModbusError::InvalidData { .. })));
    }

    #[test]
    fn test_offset_outside_frame() {
        let frame = frame(&[0x01, 0x03, 0x02, 0x00, 0x01]);
        let map = RegisterMap::new(vec![RegisterSpec::new("far", 40, ValueFormat::U16)]);
        assert!(map.decode_all(&frame).is_err());
    }
}
