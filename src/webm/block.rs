//! SimpleBlock / Block payload parsing.

use crate::ebml::vint::{self, Decoded};
use crate::error::ParseError;
use crate::webm::lacing::{self, Lacing};
use bytes::Bytes;
use std::ops::Range;

const FLAG_KEYFRAME: u8 = 0x80;
const FLAG_INVISIBLE: u8 = 0x08;
const FLAG_DISCARDABLE: u8 = 0x01;

/// A complete block with its frames located inside `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub track_number: u64,
    /// Signed offset from the enclosing cluster timecode, in timecode ticks.
    pub relative_timecode: i16,
    pub keyframe: bool,
    pub invisible: bool,
    pub discardable: bool,
    pub lacing: Lacing,
    /// Whole block payload, header included.
    pub data: Bytes,
    /// Frame byte ranges within `data`.
    pub frames: Vec<Range<usize>>,
    /// BlockDuration from an enclosing BlockGroup, in timecode ticks.
    pub duration: Option<u64>,
    /// Absolute stream offset of the block element.
    pub stream_offset: u64,
}

impl Block {
    /// Parses a block payload. `simple` selects SimpleBlock flag semantics.
    pub fn parse(data: Bytes, simple: bool, stream_offset: u64) -> Result<Self, ParseError> {
        let (track_number, track_len) = match vint::read_vint(&data, vint::MAX_SIZE_WIDTH)? {
            Decoded::Ready { value, length } => (value, length),
            Decoded::Incomplete { .. } => {
                return Err(ParseError::malformed("block too short for track number"));
            }
        };
        let header_len = track_len + 3;
        if data.len() < header_len {
            return Err(ParseError::malformed(format!(
                "block of {} bytes too short for its header",
                data.len()
            )));
        }
        let relative_timecode = i16::from_be_bytes([data[track_len], data[track_len + 1]]);
        let flags = data[track_len + 2];
        let lacing = Lacing::from_flags(flags);

        let frames = lacing::decode(lacing, &data[header_len..])?
            .into_iter()
            .map(|r| r.start + header_len..r.end + header_len)
            .collect();

        Ok(Self {
            track_number,
            relative_timecode,
            keyframe: simple && flags & FLAG_KEYFRAME != 0,
            invisible: flags & FLAG_INVISIBLE != 0,
            discardable: simple && flags & FLAG_DISCARDABLE != 0,
            lacing,
            data,
            frames,
            duration: None,
            stream_offset,
        })
    }

    /// Zero-copy slices of each frame.
    pub fn frame_data(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.frames.iter().map(|r| self.data.slice(r.clone()))
    }
}
