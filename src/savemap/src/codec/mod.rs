//! Typed reads and writes over a save buffer.
//!
//! Every access is bounds checked up front: an offset that does not fit in the
//! buffer produces [`Error::Bounds`] and nothing is read or written.

mod bcd;
mod bits;
pub mod text;

pub use bits::BitRange;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::{Error, Result};

/// Primitive data types a template leaf can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint24,
    Int24,
    Uint32,
    Int32,
    Float32,
    /// A single bit of a byte, selected by [`Field::bit`]
    Bit,
}

impl DataType {
    /// Width in bytes
    pub fn width(self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 | DataType::Bit => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint24 | DataType::Int24 => 3,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
        }
    }

    pub fn bits(self) -> u32 {
        self.width() as u32 * 8
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int24 | DataType::Int32
        )
    }

    /// Mask covering the full width of the type
    pub fn mask(self) -> u32 {
        match self.bits() {
            32 => u32::MAX,
            bits => (1u32 << bits) - 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Uint8 => "uint8",
            DataType::Int8 => "int8",
            DataType::Uint16 => "uint16",
            DataType::Int16 => "int16",
            DataType::Uint24 => "uint24",
            DataType::Int24 => "int24",
            DataType::Uint32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Bit => "bit",
        };
        f.write_str(name)
    }
}

/// Everything the codec needs to know to read or write one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub data_type: DataType,
    pub big_endian: bool,
    /// Single bit index, counted from the least significant bit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<BitRange>,
    pub bcd: bool,
}

impl Field {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            big_endian: false,
            bit: None,
            binary: None,
            bcd: false,
        }
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn with_bit(mut self, bit: u8) -> Self {
        self.bit = Some(bit);
        self
    }

    pub fn with_binary(mut self, binary: BitRange) -> Self {
        self.binary = Some(binary);
        self
    }

    pub fn with_bcd(mut self) -> Self {
        self.bcd = true;
        self
    }

    pub fn width(&self) -> usize {
        self.data_type.width()
    }

    /// Inclusive range of integers this field can store.
    pub fn limits(&self) -> (i64, i64) {
        if self.bit_index().is_some() {
            return (0, 1);
        }
        if let Some(range) = self.binary {
            return (0, range.mask() as i64);
        }
        if self.bcd {
            return (0, bcd::max_value(self.width()) as i64);
        }
        let bits = self.data_type.bits();
        if self.data_type.is_signed() {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        }
    }

    fn bit_index(&self) -> Option<u8> {
        match (self.data_type, self.bit) {
            (DataType::Bit, bit) => Some(bit.unwrap_or(0)),
            (_, bit) => bit,
        }
    }

    /// Check the field against its own type, returning a reason when invalid.
    pub fn check(&self) -> std::result::Result<(), String> {
        let bits = self.data_type.bits();
        if let Some(bit) = self.bit_index() {
            if u32::from(bit) >= bits {
                return Err(format!("bit {bit} is outside {}", self.data_type));
            }
        }
        if let Some(range) = self.binary {
            if range.bit_length == 0 || range.end() > bits {
                return Err(format!(
                    "binary range {}+{} is outside {}",
                    range.bit_start, range.bit_length, self.data_type
                ));
            }
        }
        if self.data_type == DataType::Float32 && (self.bcd || self.binary.is_some()) {
            return Err("float32 cannot be bit packed or BCD".into());
        }
        Ok(())
    }
}

/// Byte range `[offset, offset + length)` after checking it fits the buffer
pub fn span(buffer_len: usize, offset: usize, length: usize) -> Result<Range<usize>> {
    match offset.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(offset..end),
        _ => Err(Error::Bounds {
            offset,
            length,
            buffer_len,
        }),
    }
}

/// Read the full width of `data_type` as an unsigned integer
pub fn read_unsigned(
    buffer: &[u8],
    offset: usize,
    data_type: DataType,
    big_endian: bool,
) -> Result<u32> {
    let bytes = &buffer[span(buffer.len(), offset, data_type.width())?];
    let value = match (bytes.len(), big_endian) {
        (1, _) => u32::from(bytes[0]),
        (2, true) => u32::from(BigEndian::read_u16(bytes)),
        (2, false) => u32::from(LittleEndian::read_u16(bytes)),
        (3, true) => BigEndian::read_u24(bytes),
        (3, false) => LittleEndian::read_u24(bytes),
        (_, true) => BigEndian::read_u32(bytes),
        (_, false) => LittleEndian::read_u32(bytes),
    };
    Ok(value)
}

/// Write the low `width` bytes of `value`
pub fn write_unsigned(
    buffer: &mut [u8],
    offset: usize,
    data_type: DataType,
    big_endian: bool,
    value: u32,
) -> Result<()> {
    let range = span(buffer.len(), offset, data_type.width())?;
    let bytes = &mut buffer[range];
    let value = value & data_type.mask();
    match (bytes.len(), big_endian) {
        (1, _) => bytes[0] = value as u8,
        (2, true) => BigEndian::write_u16(bytes, value as u16),
        (2, false) => LittleEndian::write_u16(bytes, value as u16),
        (3, true) => BigEndian::write_u24(bytes, value),
        (3, false) => LittleEndian::write_u24(bytes, value),
        (_, true) => BigEndian::write_u32(bytes, value),
        (_, false) => LittleEndian::write_u32(bytes, value),
    }
    tracing::trace!(offset, value, %data_type, "codec write");
    Ok(())
}

fn sign_extend(raw: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    i64::from(((raw << shift) as i32) >> shift)
}

/// Read an integer field, applying bit selection, bit ranges, BCD and sign.
pub fn read_int(buffer: &[u8], offset: usize, field: &Field) -> Result<i64> {
    if field.data_type == DataType::Float32 {
        return Err(Error::UnsupportedType(
            "float32 cannot be read as an integer".into(),
        ));
    }
    let raw = read_unsigned(buffer, offset, field.data_type, field.big_endian)?;

    if let Some(bit) = field.bit_index() {
        return Ok(i64::from((raw >> bit) & 1));
    }
    if let Some(range) = field.binary {
        return Ok(i64::from(range.extract(raw)));
    }
    if field.bcd {
        return Ok(bcd::decode(raw, field.width()) as i64);
    }
    if field.data_type.is_signed() {
        return Ok(sign_extend(raw, field.data_type.bits()));
    }
    Ok(i64::from(raw))
}

/// Write an integer field. Bits outside a declared bit or bit range are
/// preserved. BCD values are clamped to what the field can hold, every other
/// representation rejects values that do not fit.
pub fn write_int(buffer: &mut [u8], offset: usize, field: &Field, value: i64) -> Result<()> {
    if field.data_type == DataType::Float32 {
        return Err(Error::UnsupportedType(
            "float32 cannot be written as an integer".into(),
        ));
    }

    let (min, max) = field.limits();
    if !field.bcd && (value < min || value > max) {
        return Err(Error::Overflow {
            value,
            data_type: field.data_type.to_string(),
        });
    }

    let current = read_unsigned(buffer, offset, field.data_type, field.big_endian)?;
    let raw = if let Some(bit) = field.bit_index() {
        (current & !(1 << bit)) | ((value as u32 & 1) << bit)
    } else if let Some(range) = field.binary {
        range.insert(current, value as u32)
    } else if field.bcd {
        bcd::encode(value, field.width())
    } else {
        value as u32
    };

    write_unsigned(buffer, offset, field.data_type, field.big_endian, raw)
}

pub fn read_float(buffer: &[u8], offset: usize, big_endian: bool) -> Result<f32> {
    let bytes = &buffer[span(buffer.len(), offset, 4)?];
    Ok(if big_endian {
        BigEndian::read_f32(bytes)
    } else {
        LittleEndian::read_f32(bytes)
    })
}

pub fn write_float(buffer: &mut [u8], offset: usize, big_endian: bool, value: f32) -> Result<()> {
    let range = span(buffer.len(), offset, 4)?;
    let bytes = &mut buffer[range];
    if big_endian {
        BigEndian::write_f32(bytes, value);
    } else {
        LittleEndian::write_f32(bytes, value);
    }
    Ok(())
}

/// Read any numeric field as `f64` (float32 included)
pub fn read_number(buffer: &[u8], offset: usize, field: &Field) -> Result<f64> {
    match field.data_type {
        DataType::Float32 => Ok(f64::from(read_float(buffer, offset, field.big_endian)?)),
        _ => Ok(read_int(buffer, offset, field)? as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint24_both_endians() {
        let mut buf = vec![0u8; 4];
        let le = Field::new(DataType::Uint24);
        write_int(&mut buf, 1, &le, 0x123456).unwrap();
        assert_eq!(buf, [0x00, 0x56, 0x34, 0x12]);
        assert_eq!(read_int(&buf, 1, &le).unwrap(), 0x123456);

        let be = le.big_endian(true);
        write_int(&mut buf, 0, &be, 0xabcdef).unwrap();
        assert_eq!(&buf[..3], &[0xab, 0xcd, 0xef]);
        assert_eq!(read_int(&buf, 0, &be).unwrap(), 0xabcdef);
    }

    #[test]
    fn test_signed_values() {
        let mut buf = vec![0u8; 4];
        let int16 = Field::new(DataType::Int16).big_endian(true);
        write_int(&mut buf, 0, &int16, -2).unwrap();
        assert_eq!(&buf[..2], &[0xff, 0xfe]);
        assert_eq!(read_int(&buf, 0, &int16).unwrap(), -2);

        let int24 = Field::new(DataType::Int24);
        write_int(&mut buf, 0, &int24, -8_388_608).unwrap();
        assert_eq!(read_int(&buf, 0, &int24).unwrap(), -8_388_608);
    }

    #[test]
    fn test_bit_write_preserves_neighbours() {
        let mut buf = vec![0b1010_0101];
        let field = Field::new(DataType::Bit).with_bit(1);
        write_int(&mut buf, 0, &field, 1).unwrap();
        assert_eq!(buf[0], 0b1010_0111);
        write_int(&mut buf, 0, &field, 0).unwrap();
        assert_eq!(buf[0], 0b1010_0101);
        assert_eq!(read_int(&buf, 0, &Field::new(DataType::Bit).with_bit(7)).unwrap(), 1);
    }

    #[test]
    fn test_binary_range_preserves_neighbours() {
        let mut buf = vec![0xff, 0xff];
        let field = Field::new(DataType::Uint16)
            .big_endian(true)
            .with_binary(BitRange::new(4, 6));
        write_int(&mut buf, 0, &field, 0).unwrap();
        assert_eq!(buf, [0xfc, 0x0f]);
        write_int(&mut buf, 0, &field, 0b10_1010).unwrap();
        assert_eq!(read_int(&buf, 0, &field).unwrap(), 0b10_1010);
        assert_eq!(buf, [0xfe, 0xaf]);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut buf = vec![0u8; 2];
        let field = Field::new(DataType::Uint8);
        assert!(matches!(
            write_int(&mut buf, 0, &field, 256),
            Err(Error::Overflow { .. })
        ));
        assert!(matches!(
            write_int(&mut buf, 0, &field, -1),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(buf, [0, 0]);
    }

    #[test]
    fn test_bounds() {
        let mut buf = vec![0u8; 4];
        let field = Field::new(DataType::Uint32);
        assert!(read_int(&buf, 1, &field).is_err());
        let err = write_int(&mut buf, 2, &Field::new(DataType::Uint24), 1).unwrap_err();
        assert!(matches!(
            err,
            Error::Bounds {
                offset: 2,
                length: 3,
                buffer_len: 4
            }
        ));
        assert!(span(4, usize::MAX, 2).is_err());
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn test_float32() {
        let mut buf = vec![0u8; 4];
        write_float(&mut buf, 0, true, 1.5).unwrap();
        assert_eq!(buf, [0x3f, 0xc0, 0x00, 0x00]);
        let field = Field::new(DataType::Float32).big_endian(true);
        assert_eq!(read_number(&buf, 0, &field).unwrap(), 1.5);
        assert!(read_int(&buf, 0, &field).is_err());
    }

    #[test]
    fn test_field_check() {
        assert!(Field::new(DataType::Uint8).with_bit(8).check().is_err());
        assert!(Field::new(DataType::Uint16).with_bit(15).check().is_ok());
        assert!(Field::new(DataType::Uint8)
            .with_binary(BitRange::new(4, 5))
            .check()
            .is_err());
        assert!(Field::new(DataType::Float32).with_bcd().check().is_err());
    }

    #[test]
    fn test_limits() {
        assert_eq!(Field::new(DataType::Int8).limits(), (-128, 127));
        assert_eq!(Field::new(DataType::Uint32).limits(), (0, 0xffff_ffff));
        assert_eq!(Field::new(DataType::Uint16).with_bcd().limits(), (0, 9999));
        assert_eq!(
            Field::new(DataType::Uint8).with_binary(BitRange::new(0, 3)).limits(),
            (0, 7)
        );
    }
}
