//! WebM document model populated by the tree builder.

use serde::{Deserialize, Serialize};

/// Default TimestampScale: timecodes are in milliseconds.
pub const DEFAULT_TIMESTAMP_SCALE_NS: u64 = 1_000_000;

/// Matroska codec ID for Opus.
pub const OPUS_CODEC_ID: &str = "A_OPUS";

/// EBML header of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbmlHeader {
    pub version: u64,
    pub read_version: u64,
    pub max_id_length: u64,
    pub max_size_length: u64,
    pub doc_type: String,
    pub doc_type_version: u64,
    pub doc_type_read_version: u64,
}

impl Default for EbmlHeader {
    fn default() -> Self {
        Self {
            version: 1,
            read_version: 1,
            max_id_length: 4,
            max_size_length: 8,
            doc_type: "matroska".to_string(),
            doc_type_version: 1,
            doc_type_read_version: 1,
        }
    }
}

/// Segment-level information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Nanoseconds per timecode tick.
    pub timestamp_scale: u64,
    /// Duration in timecode ticks; live recordings usually omit it.
    pub duration: Option<f64>,
    pub muxing_app: Option<String>,
    pub writing_app: Option<String>,
    pub title: Option<String>,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timestamp_scale: DEFAULT_TIMESTAMP_SCALE_NS,
            duration: None,
            muxing_app: None,
            writing_app: None,
            title: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackType {
    Video,
    Audio,
    Complex,
    Logo,
    Subtitle,
    Buttons,
    Control,
    Metadata,
    Unknown(u64),
}

impl From<u64> for TrackType {
    fn from(value: u64) -> Self {
        match value {
            1 => TrackType::Video,
            2 => TrackType::Audio,
            3 => TrackType::Complex,
            0x10 => TrackType::Logo,
            0x11 => TrackType::Subtitle,
            0x12 => TrackType::Buttons,
            0x20 => TrackType::Control,
            0x21 => TrackType::Metadata,
            other => TrackType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub output_sampling_frequency: Option<f64>,
    pub channels: u64,
    pub bit_depth: Option<u64>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sampling_frequency: 8000.0,
            output_sampling_frequency: None,
            channels: 1,
            bit_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackEntry {
    pub number: u64,
    pub uid: Option<u64>,
    pub track_type: Option<TrackType>,
    pub codec_id: String,
    pub codec_private: Option<Vec<u8>>,
    pub codec_delay_ns: Option<u64>,
    pub seek_pre_roll_ns: Option<u64>,
    /// Nanoseconds per frame when the track declares a fixed frame duration.
    pub default_duration_ns: Option<u64>,
    pub language: Option<String>,
    pub name: Option<String>,
    pub audio: Option<AudioSettings>,
}

impl TrackEntry {
    pub fn is_audio(&self) -> bool {
        matches!(self.track_type, Some(TrackType::Audio)) || self.codec_id.starts_with("A_")
    }

    pub fn is_opus(&self) -> bool {
        self.codec_id == OPUS_CODEC_ID
    }
}

/// Everything known about the stream apart from its clusters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatroskaDocument {
    pub header: Option<EbmlHeader>,
    pub info: SegmentInfo,
    pub tracks: Vec<TrackEntry>,
    pub clusters: u64,
    pub last_cluster_timecode: Option<u64>,
}

impl MatroskaDocument {
    pub fn track(&self, number: u64) -> Option<&TrackEntry> {
        self.tracks.iter().find(|t| t.number == number)
    }
}
