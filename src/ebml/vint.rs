//! EBML variable-length integers.
//!
//! The width of a varint is encoded as a unary prefix in its first byte: the
//! number of leading zero bits plus one. The value is the first byte with the
//! marker bit masked out, followed big-endian by the remaining bytes. A size
//! whose value bits are all ones means "unknown size".

use crate::error::ParseError;

/// Maximum width of an element ID (EBMLMaxIDLength default).
pub const MAX_ID_WIDTH: usize = 4;

/// Maximum width of a data size (EBMLMaxSizeLength default).
pub const MAX_SIZE_WIDTH: usize = 8;

/// Outcome of decoding from a possibly incomplete byte slice.
///
/// `Incomplete` never consumes input; the caller retries once `needed` more
/// bytes are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<T> {
    Ready { value: T, length: usize },
    Incomplete { needed: usize },
}

impl<T> Decoded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Ready { value, length } => Decoded::Ready {
                value: f(value),
                length,
            },
            Decoded::Incomplete { needed } => Decoded::Incomplete { needed },
        }
    }
}

/// Declared data size of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSize {
    Known(u64),
    /// Reserved all-ones encoding: the element extends until its parent ends.
    Unknown,
}

impl ElementSize {
    pub fn known(self) -> Option<u64> {
        match self {
            ElementSize::Known(n) => Some(n),
            ElementSize::Unknown => None,
        }
    }
}

/// All value bits set for a varint of `width` bytes.
pub const fn all_ones(width: usize) -> u64 {
    (1u64 << (7 * width)) - 1
}

/// Returns the total width of a varint from its first byte.
pub fn vint_width(first: u8, max_width: usize) -> Result<usize, ParseError> {
    if first == 0 {
        return Err(ParseError::malformed("varint with zero length marker"));
    }
    let width = first.leading_zeros() as usize + 1;
    if width > max_width {
        return Err(ParseError::malformed(format!(
            "varint width {} exceeds maximum {}",
            width, max_width
        )));
    }
    Ok(width)
}

/// Decodes an unsigned varint, returning its value with the marker removed.
pub fn read_vint(buf: &[u8], max_width: usize) -> Result<Decoded<u64>, ParseError> {
    let Some(&first) = buf.first() else {
        return Ok(Decoded::Incomplete { needed: 1 });
    };
    let width = vint_width(first, max_width)?;
    if buf.len() < width {
        return Ok(Decoded::Incomplete {
            needed: width - buf.len(),
        });
    }

    let mut value = u64::from(first) & (0xFFu64 >> width);
    for &byte in &buf[1..width] {
        value = (value << 8) | u64::from(byte);
    }
    Ok(Decoded::Ready {
        value,
        length: width,
    })
}

/// Decodes an element data size, mapping the reserved all-ones value to `Unknown`.
pub fn read_size(buf: &[u8]) -> Result<Decoded<ElementSize>, ParseError> {
    Ok(match read_vint(buf, MAX_SIZE_WIDTH)? {
        Decoded::Ready { value, length } => Decoded::Ready {
            value: if value == all_ones(length) {
                ElementSize::Unknown
            } else {
                ElementSize::Known(value)
            },
            length,
        },
        Decoded::Incomplete { needed } => Decoded::Incomplete { needed },
    })
}

/// Decodes an element ID. IDs keep their marker bits, matching the Matroska
/// registry notation (`0x1A45DFA3` for the EBML header).
pub fn read_id(buf: &[u8]) -> Result<Decoded<u32>, ParseError> {
    let Some(&first) = buf.first() else {
        return Ok(Decoded::Incomplete { needed: 1 });
    };
    let width = vint_width(first, MAX_ID_WIDTH)?;
    if buf.len() < width {
        return Ok(Decoded::Incomplete {
            needed: width - buf.len(),
        });
    }

    let raw = buf[..width]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    let value = u64::from(raw) & all_ones(width);
    if value == all_ones(width) || value == 0 {
        return Err(ParseError::malformed(format!(
            "reserved element ID 0x{:X}",
            raw
        )));
    }
    Ok(Decoded::Ready {
        value: raw,
        length: width,
    })
}

/// Decodes a signed varint as used by EBML lacing deltas.
pub fn read_signed_vint(buf: &[u8]) -> Result<Decoded<i64>, ParseError> {
    Ok(read_vint(buf, MAX_SIZE_WIDTH)?.map_with_width(|value, width| {
        let bias = (1i64 << (7 * width - 1)) - 1;
        value as i64 - bias
    }))
}

impl Decoded<u64> {
    fn map_with_width<U>(self, f: impl FnOnce(u64, usize) -> U) -> Decoded<U> {
        match self {
            Decoded::Ready { value, length } => Decoded::Ready {
                value: f(value, length),
                length,
            },
            Decoded::Incomplete { needed } => Decoded::Incomplete { needed },
        }
    }
}

/// Smallest width able to hold `value` as a known size.
pub fn size_width(value: u64) -> Option<usize> {
    (1..=MAX_SIZE_WIDTH).find(|&w| value < all_ones(w))
}

/// Encodes a known size using the smallest width.
pub fn encode_size(value: u64) -> Option<Vec<u8>> {
    encode_size_with_width(value, size_width(value)?)
}

/// Encodes a known size padded to exactly `width` bytes.
///
/// Returns `None` if the value does not fit or would collide with the
/// unknown-size pattern.
pub fn encode_size_with_width(value: u64, width: usize) -> Option<Vec<u8>> {
    if !(1..=MAX_SIZE_WIDTH).contains(&width) || value >= all_ones(width) {
        return None;
    }
    let marked = value | (1u64 << (7 * width));
    Some(marked.to_be_bytes()[8 - width..].to_vec())
}

/// Encodes the reserved unknown-size pattern at `width` bytes (clamped to 1..=8).
pub fn encode_unknown_size(width: usize) -> Vec<u8> {
    let width = width.clamp(1, MAX_SIZE_WIDTH);
    let marked = all_ones(width) | (1u64 << (7 * width));
    marked.to_be_bytes()[8 - width..].to_vec()
}

/// Encodes a signed varint using the smallest width.
pub fn encode_signed(value: i64) -> Option<Vec<u8>> {
    (1..=MAX_SIZE_WIDTH).find_map(|width| {
        let bias = (1i64 << (7 * width - 1)) - 1;
        let raw = value.checked_add(bias)?;
        if raw < 0 {
            return None;
        }
        encode_size_with_width(raw as u64, width)
    })
}

/// Encodes an element ID (marker bits included) as its big-endian bytes.
pub fn encode_id(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    bytes[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_values(width: usize) -> Vec<u64> {
        let max = all_ones(width) - 1;
        let mut values = vec![0, 1, max / 2, max];
        if width > 1 {
            values.push(all_ones(width - 1));
        }
        values
    }

    #[test]
    fn test_size_roundtrip_every_width() {
        for width in 1..=MAX_SIZE_WIDTH {
            for value in sample_values(width) {
                let encoded = encode_size_with_width(value, width).unwrap();
                assert_eq!(encoded.len(), width);
                assert_eq!(
                    read_size(&encoded).unwrap(),
                    Decoded::Ready {
                        value: ElementSize::Known(value),
                        length: width
                    },
                    "width {} value {}",
                    width,
                    value
                );
            }
        }
    }

    #[test]
    fn test_minimal_width_encoding() {
        assert_eq!(encode_size(0).unwrap(), vec![0x80]);
        assert_eq!(encode_size(126).unwrap(), vec![0xFE]);
        // 127 is the 1-byte unknown pattern, so it needs two bytes
        assert_eq!(encode_size(127).unwrap(), vec![0x40, 0x7F]);
        assert_eq!(size_width(all_ones(8)), None);
    }

    #[test]
    fn test_unknown_size_every_width() {
        for width in 1..=MAX_SIZE_WIDTH {
            let encoded = encode_unknown_size(width);
            assert_eq!(
                read_size(&encoded).unwrap(),
                Decoded::Ready {
                    value: ElementSize::Unknown,
                    length: width
                }
            );
        }
        assert_eq!(encode_unknown_size(8), vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_incomplete_reports_missing_bytes() {
        let encoded = encode_size_with_width(300, 8).unwrap();
        assert_eq!(read_size(&[]).unwrap(), Decoded::Incomplete { needed: 1 });
        assert_eq!(
            read_size(&encoded[..7]).unwrap(),
            Decoded::Incomplete { needed: 1 }
        );
        assert_eq!(
            read_size(&encoded[..2]).unwrap(),
            Decoded::Incomplete { needed: 6 }
        );
    }

    #[test]
    fn test_zero_first_byte_is_malformed() {
        let err = read_size(&[0x00, 0x12]).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_read_id_keeps_marker() {
        assert_eq!(
            read_id(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F]).unwrap(),
            Decoded::Ready {
                value: 0x1A45_DFA3,
                length: 4
            }
        );
        assert_eq!(
            read_id(&[0xA3]).unwrap(),
            Decoded::Ready {
                value: 0xA3,
                length: 1
            }
        );
    }

    #[test]
    fn test_read_id_rejects_reserved_and_wide_ids() {
        assert!(read_id(&[0xFF]).is_err());
        assert!(read_id(&[0x80]).is_err());
        // Five-byte ID exceeds the 4-byte limit
        assert!(read_id(&[0x08, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_signed_roundtrip() {
        for value in [-1_000_000i64, -8191, -64, -1, 0, 1, 63, 64, 8191, 1_000_000] {
            let encoded = encode_signed(value).unwrap();
            match read_signed_vint(&encoded).unwrap() {
                Decoded::Ready { value: decoded, length } => {
                    assert_eq!(decoded, value);
                    assert_eq!(length, encoded.len());
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_signed_one_byte_range() {
        // One byte covers -63..=63 (127 is reserved)
        assert_eq!(encode_signed(-63).unwrap(), vec![0x80]);
        assert_eq!(encode_signed(63).unwrap(), vec![0xFE]);
        assert_eq!(encode_signed(64).unwrap().len(), 2);
    }

    #[test]
    fn test_encode_id_strips_leading_zeros() {
        assert_eq!(encode_id(0xA3), vec![0xA3]);
        assert_eq!(encode_id(0x4286), vec![0x42, 0x86]);
        assert_eq!(encode_id(0x1F43_B675), vec![0x1F, 0x43, 0xB6, 0x75]);
    }
}
