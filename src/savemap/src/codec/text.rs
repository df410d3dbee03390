//! Fixed-length strings stored as custom character codes.
//!
//! Each character slot is one integer of `letter` width. Codes are mapped to
//! glyphs through a letters resource; a glyph may be longer than one char
//! (e.g. `"<heart>"`), so encoding tokenizes greedily on the longest glyph.

use serde::Serialize;
use std::ops::Range;

use super::{read_unsigned, span, write_unsigned, Field};
use crate::resource::Resource;
use crate::{Error, Result};

/// Layout of a fixed-charset string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextField {
    /// Number of character slots
    pub length: usize,
    /// Type and byte order of each slot
    pub letter: Field,
    /// Code that terminates the string early
    pub end_code: Option<u32>,
    /// Code written for unmapped characters and unused slots
    pub fallback: u32,
}

impl TextField {
    /// Bytes taken by all slots, `None` when that overflows
    pub fn byte_len(&self) -> Option<usize> {
        self.length.checked_mul(self.letter.width())
    }

    /// Byte range of the string at `offset` after checking it fits the buffer
    pub fn checked_span(&self, buffer_len: usize, offset: usize) -> Result<Range<usize>> {
        match self.byte_len() {
            Some(length) => span(buffer_len, offset, length),
            None => Err(Error::Bounds {
                offset,
                length: usize::MAX,
                buffer_len,
            }),
        }
    }
}

/// Decode until the end code or the last slot. Codes without a glyph are
/// skipped.
pub fn decode(buffer: &[u8], offset: usize, text: &TextField, letters: &Resource) -> Result<String> {
    text.checked_span(buffer.len(), offset)?;
    let width = text.letter.width();

    let mut out = String::new();
    for slot in 0..text.length {
        let code = read_unsigned(
            buffer,
            offset + slot * width,
            text.letter.data_type,
            text.letter.big_endian,
        )?;
        if text.end_code == Some(code) {
            break;
        }
        if let Some(glyph) = letters.label(i64::from(code)) {
            out.push_str(glyph);
        }
    }
    Ok(out)
}

/// Split `value` into character codes, longest glyph first.
pub fn tokenize(value: &str, letters: &Resource, fallback: u32) -> Vec<u32> {
    let mut glyphs: Vec<(&str, i64)> = letters
        .iter()
        .filter(|(_, glyph)| !glyph.is_empty())
        .map(|(code, glyph)| (glyph, code))
        .collect();
    // Longest first; equal lengths keep the lowest code
    glyphs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.1.cmp(&b.1)));

    let mut codes = Vec::new();
    let mut rest = value;
    while let Some(ch) = rest.chars().next() {
        match glyphs.iter().find(|(glyph, _)| rest.starts_with(glyph)) {
            Some((glyph, code)) => {
                codes.push(*code as u32);
                rest = &rest[glyph.len()..];
            }
            None => {
                codes.push(fallback);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    codes
}

/// Encode `value` into the string slots, padding with the fallback code.
/// Fails without writing if the value needs more slots than exist.
pub fn encode(
    buffer: &mut [u8],
    offset: usize,
    text: &TextField,
    letters: &Resource,
    value: &str,
) -> Result<()> {
    text.checked_span(buffer.len(), offset)?;
    let codes = tokenize(value, letters, text.fallback);
    if codes.len() > text.length {
        return Err(Error::TextOverflow {
            needed: codes.len(),
            capacity: text.length,
        });
    }

    let width = text.letter.width();
    for slot in 0..text.length {
        let code = codes.get(slot).copied().unwrap_or(text.fallback);
        write_unsigned(
            buffer,
            offset + slot * width,
            text.letter.data_type,
            text.letter.big_endian,
            code,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DataType;

    fn letters() -> Resource {
        Resource::from_entries([
            (0x41, "A"),
            (0x42, "B"),
            (0x43, "C"),
            (0x20, " "),
            (0x80, "<3"),
        ])
    }

    fn field() -> TextField {
        TextField {
            length: 6,
            letter: Field::new(DataType::Uint16),
            end_code: Some(0x0),
            fallback: 0x0,
        }
    }

    #[test]
    fn test_decode_stops_at_end_code() {
        let buf = [0x41, 0, 0x42, 0, 0, 0, 0x43, 0, 0x43, 0, 0x43, 0];
        assert_eq!(decode(&buf, 0, &field(), &letters()).unwrap(), "AB");
    }

    #[test]
    fn test_encode_pads_with_fallback() {
        let mut buf = [0xffu8; 12];
        encode(&mut buf, 0, &field(), &letters(), "CAB").unwrap();
        assert_eq!(buf, [0x43, 0, 0x41, 0, 0x42, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode(&buf, 0, &field(), &letters()).unwrap(), "CAB");
    }

    #[test]
    fn test_multichar_glyphs_and_unmapped() {
        let codes = tokenize("A<3z", &letters(), 0x20);
        assert_eq!(codes, vec![0x41, 0x80, 0x20]);
    }

    #[test]
    fn test_overflow_leaves_buffer() {
        let mut buf = [0u8; 12];
        let err = encode(&mut buf, 0, &field(), &letters(), "ABCABCA").unwrap_err();
        assert!(matches!(err, Error::TextOverflow { needed: 7, capacity: 6 }));
        assert_eq!(buf, [0u8; 12]);
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = [0u8; 11];
        assert!(decode(&buf, 0, &field(), &letters()).is_err());
    }

    #[test]
    fn test_huge_length_is_out_of_bounds() {
        let text = TextField {
            length: usize::MAX / 2 + 1,
            ..field()
        };
        let mut buf = [0u8; 12];
        assert_eq!(text.byte_len(), None);
        assert!(decode(&buf, 0, &text, &letters()).unwrap_err().is_bounds());
        assert!(encode(&mut buf, 0, &text, &letters(), "A")
            .unwrap_err()
            .is_bounds());
    }
}
