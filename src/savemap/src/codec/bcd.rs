//! Binary-coded decimal: one decimal digit per nibble, least significant
//! digit in the low nibble.
//!
//! Nibbles above 9 are clamped to 9 when decoding and values outside the
//! representable range are clamped when encoding.

/// Largest value `width` bytes of BCD can hold (e.g. 9999 for two bytes)
pub fn max_value(width: usize) -> u64 {
    10u64.pow(width as u32 * 2) - 1
}

pub fn decode(raw: u32, width: usize) -> u64 {
    let mut value = 0u64;
    let mut scale = 1u64;
    for nibble in 0..width * 2 {
        let digit = u64::from((raw >> (nibble * 4)) & 0xf).min(9);
        value += digit * scale;
        scale *= 10;
    }
    value
}

pub fn encode(value: i64, width: usize) -> u32 {
    let mut value = value.clamp(0, max_value(width) as i64) as u64;
    let mut raw = 0u32;
    for nibble in 0..width * 2 {
        raw |= ((value % 10) as u32) << (nibble * 4);
        value /= 10;
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        assert_eq!(decode(0x1234, 2), 1234);
        assert_eq!(decode(0x59, 1), 59);
        // 0xA in the low nibble clamps to 9
        assert_eq!(decode(0x1a, 1), 19);
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(1234, 2), 0x1234);
        assert_eq!(encode(7, 3), 0x000007);
        assert_eq!(encode(100, 1), 0x99);
        assert_eq!(encode(-5, 1), 0x00);
    }

    #[test]
    fn test_max_value() {
        assert_eq!(max_value(1), 99);
        assert_eq!(max_value(4), 99_999_999);
    }
}
