//! Lenient number parsing for template documents.
//!
//! Template authors write offsets and codes the way they appear in a hex
//! editor, so anywhere a number is expected `"0x2dc"` is accepted as well as
//! `732`.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parse a decimal or `0x`-prefixed hexadecimal integer
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

struct IntVisitor;

impl<'de> Visitor<'de> for IntVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer or a \"0x\" hex string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::custom(format!("{v} is too large")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        parse_int(v).ok_or_else(|| E::custom(format!("'{v}' is not an integer")))
    }
}

/// A non-negative byte offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Offset(pub usize);

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = deserializer.deserialize_any(IntVisitor)?;
        usize::try_from(value)
            .map(Offset)
            .map_err(|_| de::Error::custom(format!("offset {value} is negative")))
    }
}

/// A 32-bit code (checksum constants, string end/fallback codes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Code(pub u32);

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = deserializer.deserialize_any(IntVisitor)?;
        u32::try_from(value)
            .map(Code)
            .map_err(|_| de::Error::custom(format!("code {value} does not fit in 32 bits")))
    }
}

/// Byte pattern written either as `[0x52, 0x4f]` or as a hex string `"524f"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bytes(pub Vec<u8>);

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            List(Vec<Code>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(text) => {
                let compact: String = text.split_whitespace().collect();
                let compact = compact.strip_prefix("0x").unwrap_or(&compact);
                hex::decode(compact)
                    .map(Bytes)
                    .map_err(|e| de::Error::custom(format!("invalid hex '{text}': {e}")))
            }
            Repr::List(codes) => codes
                .into_iter()
                .map(|Code(c)| {
                    u8::try_from(c).map_err(|_| de::Error::custom(format!("{c} is not a byte")))
                })
                .collect::<Result<Vec<u8>, D::Error>>()
                .map(Bytes),
        }
    }
}
