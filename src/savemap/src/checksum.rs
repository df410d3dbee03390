//! Checksum algorithms computed over a byte range of the buffer.
//!
//! Templates pick a declarative [`Algorithm`]; games with anything more exotic
//! supply `Hooks::generate_checksum` instead. A stored value that does not
//! match is reported as a [`ChecksumStatus`], never as an error: an unused
//! save slot is indistinguishable from a corrupt one at this level.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::OnceLock;

use crate::codec::span;
use crate::Result;

/// Reflected CRC-32 polynomial (zlib, PNG, most console SDKs)
pub const CRC32_POLYNOMIAL: u32 = 0xedb8_8320;

fn default_polynomial() -> u32 {
    CRC32_POLYNOMIAL
}

/// Declarative checksum algorithms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Algorithm {
    /// Wrapping sum of every byte, plus `constant`. With `nibbles`, each byte
    /// contributes its high and low nibble separately.
    #[serde(rename_all = "camelCase")]
    Sum {
        #[serde(default)]
        constant: u32,
        #[serde(default)]
        nibbles: bool,
    },
    /// 16-bit running sum in the low half, XOR of all words in the high half
    #[serde(rename_all = "camelCase")]
    SumXor {
        #[serde(default)]
        big_endian: bool,
    },
    /// Table-driven reflected CRC-32 with final one's complement
    Crc32 {
        #[serde(default = "default_polynomial")]
        polynomial: u32,
    },
    Adler32,
}

impl Algorithm {
    pub fn compute(&self, data: &[u8]) -> u32 {
        match self {
            Algorithm::Sum { constant, nibbles } => sum(data, *constant, *nibbles),
            Algorithm::SumXor { big_endian } => sum_xor(data, *big_endian),
            Algorithm::Crc32 { polynomial } => crc32(data, *polynomial),
            Algorithm::Adler32 => adler::adler32_slice(data),
        }
    }
}

/// Compute `algorithm` over `buffer[range]`
pub fn compute(algorithm: &Algorithm, buffer: &[u8], range: Range<usize>) -> Result<u32> {
    let length = range.end.saturating_sub(range.start);
    let range = span(buffer.len(), range.start, length)?;
    Ok(algorithm.compute(&buffer[range]))
}

fn sum(data: &[u8], constant: u32, nibbles: bool) -> u32 {
    data.iter().fold(constant, |acc, &byte| {
        let add = if nibbles {
            u32::from(byte >> 4) + u32::from(byte & 0xf)
        } else {
            u32::from(byte)
        };
        acc.wrapping_add(add)
    })
}

fn sum_xor(data: &[u8], big_endian: bool) -> u32 {
    let mut sum = 0u16;
    let mut xor = 0u16;
    for pair in data.chunks(2) {
        let hi_lo = [pair[0], pair.get(1).copied().unwrap_or(0)];
        let word = if big_endian {
            u16::from_be_bytes(hi_lo)
        } else {
            u16::from_le_bytes(hi_lo)
        };
        sum = sum.wrapping_add(word);
        xor ^= word;
    }
    (u32::from(xor) << 16) | u32::from(sum)
}

/// Build the 256-entry lookup table for a reflected polynomial
pub fn crc_table(polynomial: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    for (n, slot) in table.iter_mut().enumerate() {
        let mut c = n as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 {
                polynomial ^ (c >> 1)
            } else {
                c >> 1
            };
        }
        *slot = c;
    }
    table
}

fn crc32(data: &[u8], polynomial: u32) -> u32 {
    static DEFAULT_TABLE: OnceLock<[u32; 256]> = OnceLock::new();

    let custom;
    let table = if polynomial == CRC32_POLYNOMIAL {
        DEFAULT_TABLE.get_or_init(|| crc_table(CRC32_POLYNOMIAL))
    } else {
        custom = crc_table(polynomial);
        &custom
    };

    let crc = data.iter().fold(u32::MAX, |crc, &byte| {
        table[((crc ^ u32::from(byte)) & 0xff) as usize] ^ (crc >> 8)
    });
    !crc
}

/// Stored vs computed checksum for one checksum leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecksumStatus {
    pub stored: u32,
    pub computed: u32,
}

impl ChecksumStatus {
    pub fn is_valid(&self) -> bool {
        self.stored == self.computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_over_zeroes_is_constant() {
        let buf = vec![0u8; 0x2e0];
        let algo = Algorithm::Sum {
            constant: 5,
            nibbles: false,
        };
        assert_eq!(compute(&algo, &buf, 0x2..0x2dc).unwrap(), 0x5);
    }

    #[test]
    fn test_sum_detects_change_inside_range_only() {
        let mut buf = vec![0u8; 0x2e0];
        let algo = Algorithm::Sum {
            constant: 5,
            nibbles: false,
        };
        buf[0x10] = 0x20;
        assert_eq!(compute(&algo, &buf, 0x2..0x2dc).unwrap(), 0x25);
        // Bytes outside the control range (e.g. the checksum itself) do not count
        buf[0x0] = 0xff;
        buf[0x2dc] = 0xff;
        assert_eq!(compute(&algo, &buf, 0x2..0x2dc).unwrap(), 0x25);
    }

    #[test]
    fn test_nibble_sum() {
        let algo = Algorithm::Sum {
            constant: 0,
            nibbles: true,
        };
        assert_eq!(algo.compute(&[0x12, 0xff]), 1 + 2 + 15 + 15);
    }

    #[test]
    fn test_sum_xor() {
        let algo = Algorithm::SumXor { big_endian: false };
        // words 0x0201 and 0x0403
        assert_eq!(algo.compute(&[1, 2, 3, 4]), (0x0602 << 16) | 0x0604);
    }

    #[test]
    fn test_crc32_known_vector() {
        let algo = Algorithm::Crc32 {
            polynomial: CRC32_POLYNOMIAL,
        };
        assert_eq!(algo.compute(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn test_crc_table_shape() {
        let table = crc_table(CRC32_POLYNOMIAL);
        assert_eq!(table[0], 0);
        assert_eq!(table[1], 0x7707_3096);
        assert_eq!(table[255], 0x2d02_ef8d);
    }

    #[test]
    fn test_adler32_known_vector() {
        assert_eq!(Algorithm::Adler32.compute(b"Wikipedia"), 0x11e6_0398);
    }

    #[test]
    fn test_corrupting_control_range_always_mismatches() {
        let mut buf: Vec<u8> = (0..64).collect();
        for algo in [
            Algorithm::Sum {
                constant: 0,
                nibbles: false,
            },
            Algorithm::SumXor { big_endian: true },
            Algorithm::Crc32 {
                polynomial: CRC32_POLYNOMIAL,
            },
            Algorithm::Adler32,
        ] {
            let before = compute(&algo, &buf, 4..60).unwrap();
            buf[30] ^= 0x01;
            let after = compute(&algo, &buf, 4..60).unwrap();
            buf[30] ^= 0x01;
            assert_ne!(before, after, "{algo:?}");
        }
    }

    #[test]
    fn test_range_out_of_bounds() {
        let buf = [0u8; 8];
        assert!(compute(&Algorithm::Adler32, &buf, 4..9).is_err());
    }

    #[test]
    fn test_deserialize() {
        let algo: Algorithm = serde_json::from_str(r#"{"kind": "sum", "constant": 5}"#).unwrap();
        assert_eq!(
            algo,
            Algorithm::Sum {
                constant: 5,
                nibbles: false
            }
        );
        let algo: Algorithm = serde_json::from_str(r#"{"kind": "crc32"}"#).unwrap();
        assert_eq!(
            algo,
            Algorithm::Crc32 {
                polynomial: CRC32_POLYNOMIAL
            }
        );
    }
}
