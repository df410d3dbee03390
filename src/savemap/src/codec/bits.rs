//! Bit-range helpers for sub-byte packed values.

use serde::{Deserialize, Serialize};

/// A contiguous run of bits inside an integer, counted from the LSB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitRange {
    pub bit_start: u8,
    pub bit_length: u8,
}

impl BitRange {
    pub fn new(bit_start: u8, bit_length: u8) -> Self {
        Self {
            bit_start,
            bit_length,
        }
    }

    /// One past the highest bit covered
    pub fn end(&self) -> u32 {
        u32::from(self.bit_start) + u32::from(self.bit_length)
    }

    /// Mask of `bit_length` low bits (before shifting)
    pub fn mask(&self) -> u32 {
        match self.bit_length {
            0 => 0,
            len if len >= 32 => u32::MAX,
            len => (1u32 << len) - 1,
        }
    }

    pub fn extract(&self, raw: u32) -> u32 {
        raw.checked_shr(u32::from(self.bit_start)).unwrap_or(0) & self.mask()
    }

    /// Replace the covered bits of `raw` with `value`, keeping all others
    pub fn insert(&self, raw: u32, value: u32) -> u32 {
        let shift = u32::from(self.bit_start);
        let mask = self.mask().checked_shl(shift).unwrap_or(0);
        (raw & !mask) | ((value & self.mask()).checked_shl(shift).unwrap_or(0))
    }
}
