//! Element headers and the static Matroska/WebM element table.

use crate::ebml::vint::{self, Decoded, ElementSize};
use crate::error::ParseError;
use std::collections::HashMap;
use std::sync::LazyLock;

pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

    pub const VOID: u32 = 0xEC;
    pub const CRC32: u32 = 0xBF;

    pub const SEGMENT: u32 = 0x1853_8067;

    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const DATE_UTC: u32 = 0x4461;
    pub const TITLE: u32 = 0x7BA9;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;
    pub const SEGMENT_UID: u32 = 0x73A4;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_ENABLED: u32 = 0xB9;
    pub const FLAG_DEFAULT: u32 = 0x88;
    pub const FLAG_FORCED: u32 = 0x55AA;
    pub const FLAG_LACING: u32 = 0x9C;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const NAME: u32 = 0x536E;
    pub const LANGUAGE: u32 = 0x22_B59C;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const CODEC_NAME: u32 = 0x25_8688;
    pub const CODEC_DELAY: u32 = 0x56AA;
    pub const SEEK_PRE_ROLL: u32 = 0x56BB;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const OUTPUT_SAMPLING_FREQUENCY: u32 = 0x78B5;
    pub const CHANNELS: u32 = 0x9F;
    pub const BIT_DEPTH: u32 = 0x6264;
    pub const VIDEO: u32 = 0xE0;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMESTAMP: u32 = 0xE7;
    pub const POSITION: u32 = 0xA7;
    pub const PREV_SIZE: u32 = 0xAB;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const BLOCK_ADDITIONS: u32 = 0x75A1;
    pub const BLOCK_DURATION: u32 = 0x9B;
    pub const REFERENCE_BLOCK: u32 = 0xFB;
    pub const DISCARD_PADDING: u32 = 0x75A2;

    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;

    pub const TAGS: u32 = 0x1254_C367;
    pub const TAG: u32 = 0x7373;
    pub const TARGETS: u32 = 0x63C0;
    pub const SIMPLE_TAG: u32 = 0x67C8;
    pub const TAG_NAME: u32 = 0x45A3;
    pub const TAG_STRING: u32 = 0x4487;

    pub const CHAPTERS: u32 = 0x1043_A770;
    pub const ATTACHMENTS: u32 = 0x1941_A469;
}

/// Payload interpretation of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Master,
    UInt,
    Int,
    Float,
    String,
    Utf8,
    Date,
    Binary,
}

/// Where an element may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// Top level of the stream.
    Root,
    /// Direct child of the given master element.
    Element(u32),
    /// Global elements (Void, CRC-32) may appear in any master element.
    Any,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementSpec {
    pub id: u32,
    pub name: &'static str,
    pub kind: ElementKind,
    pub parent: Parent,
}

macro_rules! element_table {
    ($( $id:ident => $name:literal, $kind:ident, $parent:expr; )*) => {
        &[ $( ElementSpec { id: ids::$id, name: $name, kind: ElementKind::$kind, parent: $parent }, )* ]
    };
}

use Parent::{Any, Element, Root};

const ELEMENTS: &[ElementSpec] = element_table! {
    EBML => "EBML", Master, Root;
    EBML_VERSION => "EBMLVersion", UInt, Element(ids::EBML);
    EBML_READ_VERSION => "EBMLReadVersion", UInt, Element(ids::EBML);
    EBML_MAX_ID_LENGTH => "EBMLMaxIDLength", UInt, Element(ids::EBML);
    EBML_MAX_SIZE_LENGTH => "EBMLMaxSizeLength", UInt, Element(ids::EBML);
    DOC_TYPE => "DocType", String, Element(ids::EBML);
    DOC_TYPE_VERSION => "DocTypeVersion", UInt, Element(ids::EBML);
    DOC_TYPE_READ_VERSION => "DocTypeReadVersion", UInt, Element(ids::EBML);

    VOID => "Void", Binary, Any;
    CRC32 => "CRC-32", Binary, Any;

    SEGMENT => "Segment", Master, Root;

    SEEK_HEAD => "SeekHead", Master, Element(ids::SEGMENT);
    SEEK => "Seek", Master, Element(ids::SEEK_HEAD);
    SEEK_ID => "SeekID", Binary, Element(ids::SEEK);
    SEEK_POSITION => "SeekPosition", UInt, Element(ids::SEEK);

    INFO => "Info", Master, Element(ids::SEGMENT);
    TIMESTAMP_SCALE => "TimestampScale", UInt, Element(ids::INFO);
    DURATION => "Duration", Float, Element(ids::INFO);
    DATE_UTC => "DateUTC", Date, Element(ids::INFO);
    TITLE => "Title", Utf8, Element(ids::INFO);
    MUXING_APP => "MuxingApp", Utf8, Element(ids::INFO);
    WRITING_APP => "WritingApp", Utf8, Element(ids::INFO);
    SEGMENT_UID => "SegmentUID", Binary, Element(ids::INFO);

    TRACKS => "Tracks", Master, Element(ids::SEGMENT);
    TRACK_ENTRY => "TrackEntry", Master, Element(ids::TRACKS);
    TRACK_NUMBER => "TrackNumber", UInt, Element(ids::TRACK_ENTRY);
    TRACK_UID => "TrackUID", UInt, Element(ids::TRACK_ENTRY);
    TRACK_TYPE => "TrackType", UInt, Element(ids::TRACK_ENTRY);
    FLAG_ENABLED => "FlagEnabled", UInt, Element(ids::TRACK_ENTRY);
    FLAG_DEFAULT => "FlagDefault", UInt, Element(ids::TRACK_ENTRY);
    FLAG_FORCED => "FlagForced", UInt, Element(ids::TRACK_ENTRY);
    FLAG_LACING => "FlagLacing", UInt, Element(ids::TRACK_ENTRY);
    DEFAULT_DURATION => "DefaultDuration", UInt, Element(ids::TRACK_ENTRY);
    NAME => "Name", Utf8, Element(ids::TRACK_ENTRY);
    LANGUAGE => "Language", String, Element(ids::TRACK_ENTRY);
    CODEC_ID => "CodecID", String, Element(ids::TRACK_ENTRY);
    CODEC_PRIVATE => "CodecPrivate", Binary, Element(ids::TRACK_ENTRY);
    CODEC_NAME => "CodecName", Utf8, Element(ids::TRACK_ENTRY);
    CODEC_DELAY => "CodecDelay", UInt, Element(ids::TRACK_ENTRY);
    SEEK_PRE_ROLL => "SeekPreRoll", UInt, Element(ids::TRACK_ENTRY);
    AUDIO => "Audio", Master, Element(ids::TRACK_ENTRY);
    SAMPLING_FREQUENCY => "SamplingFrequency", Float, Element(ids::AUDIO);
    OUTPUT_SAMPLING_FREQUENCY => "OutputSamplingFrequency", Float, Element(ids::AUDIO);
    CHANNELS => "Channels", UInt, Element(ids::AUDIO);
    BIT_DEPTH => "BitDepth", UInt, Element(ids::AUDIO);
    // Video tracks are tolerated but their settings are skipped
    VIDEO => "Video", Binary, Element(ids::TRACK_ENTRY);

    CLUSTER => "Cluster", Master, Element(ids::SEGMENT);
    TIMESTAMP => "Timestamp", UInt, Element(ids::CLUSTER);
    POSITION => "Position", UInt, Element(ids::CLUSTER);
    PREV_SIZE => "PrevSize", UInt, Element(ids::CLUSTER);
    SIMPLE_BLOCK => "SimpleBlock", Binary, Element(ids::CLUSTER);
    BLOCK_GROUP => "BlockGroup", Master, Element(ids::CLUSTER);
    BLOCK => "Block", Binary, Element(ids::BLOCK_GROUP);
    BLOCK_ADDITIONS => "BlockAdditions", Binary, Element(ids::BLOCK_GROUP);
    BLOCK_DURATION => "BlockDuration", UInt, Element(ids::BLOCK_GROUP);
    REFERENCE_BLOCK => "ReferenceBlock", Int, Element(ids::BLOCK_GROUP);
    DISCARD_PADDING => "DiscardPadding", Int, Element(ids::BLOCK_GROUP);

    CUES => "Cues", Master, Element(ids::SEGMENT);
    CUE_POINT => "CuePoint", Master, Element(ids::CUES);
    CUE_TIME => "CueTime", UInt, Element(ids::CUE_POINT);
    CUE_TRACK_POSITIONS => "CueTrackPositions", Master, Element(ids::CUE_POINT);
    CUE_TRACK => "CueTrack", UInt, Element(ids::CUE_TRACK_POSITIONS);
    CUE_CLUSTER_POSITION => "CueClusterPosition", UInt, Element(ids::CUE_TRACK_POSITIONS);

    TAGS => "Tags", Master, Element(ids::SEGMENT);
    TAG => "Tag", Master, Element(ids::TAGS);
    TARGETS => "Targets", Binary, Element(ids::TAG);
    SIMPLE_TAG => "SimpleTag", Master, Element(ids::TAG);
    TAG_NAME => "TagName", Utf8, Element(ids::SIMPLE_TAG);
    TAG_STRING => "TagString", Utf8, Element(ids::SIMPLE_TAG);

    CHAPTERS => "Chapters", Binary, Element(ids::SEGMENT);
    ATTACHMENTS => "Attachments", Binary, Element(ids::SEGMENT);
};

static SCHEMA: LazyLock<HashMap<u32, &'static ElementSpec>> =
    LazyLock::new(|| ELEMENTS.iter().map(|spec| (spec.id, spec)).collect());

/// Looks up an element ID in the static table.
pub fn lookup(id: u32) -> Option<&'static ElementSpec> {
    SCHEMA.get(&id).copied()
}

/// Human-readable name for logs; unknown IDs render as hex.
pub fn name_of(id: u32) -> String {
    lookup(id)
        .map(|spec| spec.name.to_string())
        .unwrap_or_else(|| format!("0x{:X}", id))
}

/// A decoded element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    pub size: ElementSize,
    /// Absolute stream offset of the first ID byte.
    pub offset: u64,
    /// Width of the ID plus the size field.
    pub header_len: usize,
}

impl ElementHeader {
    /// Absolute offset of the first payload byte.
    pub fn data_start(&self) -> u64 {
        self.offset + self.header_len as u64
    }

    /// Absolute offset one past the last payload byte, if the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.known().map(|n| self.data_start() + n)
    }
}

/// Decodes an element header at the start of `buf`, located at `offset` in the stream.
pub fn read_header(buf: &[u8], offset: u64) -> Result<Decoded<ElementHeader>, ParseError> {
    let (id, id_len) = match vint::read_id(buf)? {
        Decoded::Ready { value, length } => (value, length),
        Decoded::Incomplete { needed } => return Ok(Decoded::Incomplete { needed }),
    };
    match vint::read_size(&buf[id_len..])? {
        Decoded::Ready { value, length } => {
            let header_len = id_len + length;
            Ok(Decoded::Ready {
                value: ElementHeader {
                    id,
                    size: value,
                    offset,
                    header_len,
                },
                length: header_len,
            })
        }
        Decoded::Incomplete { needed } => Ok(Decoded::Incomplete { needed }),
    }
}

/// Reads a big-endian unsigned integer payload (0–8 bytes).
pub fn read_uint(data: &[u8]) -> Result<u64, ParseError> {
    if data.len() > 8 {
        return Err(ParseError::malformed(format!(
            "unsigned integer of {} bytes",
            data.len()
        )));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Reads a 0, 4 or 8 byte IEEE float payload.
pub fn read_float(data: &[u8]) -> Result<f64, ParseError> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f64::from(f32::from_bits(read_uint(data)? as u32))),
        8 => Ok(f64::from_bits(read_uint(data)?)),
        n => Err(ParseError::malformed(format!("float of {} bytes", n))),
    }
}

/// Reads a string payload, dropping trailing NUL padding.
pub fn read_string(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}
