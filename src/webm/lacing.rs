//! Block lacing: several frames packed into one Block payload.

use crate::ebml::vint::{self, Decoded};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Lacing scheme, taken from bits 1–2 of the block flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lacing {
    No,
    Xiph,
    FixedSize,
    Ebml,
}

impl Lacing {
    pub fn from_flags(flags: u8) -> Self {
        match (flags >> 1) & 0x03 {
            0 => Lacing::No,
            1 => Lacing::Xiph,
            2 => Lacing::FixedSize,
            _ => Lacing::Ebml,
        }
    }
}

/// Splits a laced payload into frame ranges relative to `payload`.
///
/// `payload` starts right after the block header (track number, timecode,
/// flags). The returned ranges cover exactly the bytes after the lacing header.
pub fn decode(lacing: Lacing, payload: &[u8]) -> Result<Vec<Range<usize>>, ParseError> {
    if lacing == Lacing::No {
        if payload.is_empty() {
            return Err(ParseError::malformed("empty block payload"));
        }
        return Ok(vec![0..payload.len()]);
    }

    let Some(&count_minus_one) = payload.first() else {
        return Err(ParseError::malformed("laced block without frame count"));
    };
    let count = usize::from(count_minus_one) + 1;

    match lacing {
        Lacing::No => unreachable!("handled above"),
        Lacing::FixedSize => {
            let remaining = payload.len() - 1;
            if remaining == 0 || remaining % count != 0 {
                return Err(ParseError::malformed(format!(
                    "fixed-size lacing: {} bytes cannot hold {} equal frames",
                    remaining, count
                )));
            }
            let size = remaining / count;
            Ok((0..count).map(|i| 1 + i * size..1 + (i + 1) * size).collect())
        }
        Lacing::Xiph => {
            let mut pos = 1;
            let mut sizes = Vec::with_capacity(count);
            for _ in 1..count {
                let mut size = 0usize;
                loop {
                    let byte = *payload
                        .get(pos)
                        .ok_or_else(|| ParseError::malformed("truncated Xiph lace size"))?;
                    pos += 1;
                    size += usize::from(byte);
                    if byte != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
            frame_ranges(payload.len(), pos, sizes)
        }
        Lacing::Ebml => {
            let mut pos = 1;
            let mut sizes = Vec::with_capacity(count);
            if count > 1 {
                let (first, len) = match vint::read_vint(&payload[pos..], vint::MAX_SIZE_WIDTH)? {
                    Decoded::Ready { value, length } if value != vint::all_ones(length) => {
                        (value, length)
                    }
                    Decoded::Ready { .. } => {
                        return Err(ParseError::malformed("EBML lace size uses unknown-size pattern"));
                    }
                    Decoded::Incomplete { .. } => {
                        return Err(ParseError::malformed("truncated EBML lace size"));
                    }
                };
                pos += len;
                let mut previous = i64::try_from(first)
                    .map_err(|_| ParseError::malformed("EBML lace size overflow"))?;
                sizes.push(first as usize);

                for _ in 2..count {
                    let (delta, len) = match vint::read_signed_vint(&payload[pos..])? {
                        Decoded::Ready { value, length } => (value, length),
                        Decoded::Incomplete { .. } => {
                            return Err(ParseError::malformed("truncated EBML lace delta"));
                        }
                    };
                    pos += len;
                    let size = previous
                        .checked_add(delta)
                        .filter(|s| *s >= 0)
                        .ok_or_else(|| {
                            ParseError::malformed(format!(
                                "EBML lace delta {} yields negative frame size",
                                delta
                            ))
                        })?;
                    sizes.push(size as usize);
                    previous = size;
                }
            }
            frame_ranges(payload.len(), pos, sizes)
        }
    }
}

/// Lays out explicit sizes from `start`, giving the last frame the remainder.
fn frame_ranges(
    payload_len: usize,
    start: usize,
    mut sizes: Vec<usize>,
) -> Result<Vec<Range<usize>>, ParseError> {
    let declared = sizes
        .iter()
        .try_fold(0usize, |acc, &s| acc.checked_add(s))
        .ok_or_else(|| ParseError::malformed("lace sizes overflow"))?;
    let available = payload_len.saturating_sub(start);
    if declared > available {
        return Err(ParseError::malformed(format!(
            "lace sizes total {} bytes but only {} remain",
            declared, available
        )));
    }
    sizes.push(available - declared);

    let mut ranges = Vec::with_capacity(sizes.len());
    let mut pos = start;
    for (i, size) in sizes.into_iter().enumerate() {
        if size == 0 {
            return Err(ParseError::malformed(format!("laced frame {} is empty", i)));
        }
        ranges.push(pos..pos + size);
        pos += size;
    }
    Ok(ranges)
}
