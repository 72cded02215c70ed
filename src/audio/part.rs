//! Audio parts: the unit published to subscribers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a published stream: `<session id>-<stream index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn for_session(session_id: &str, stream_index: u32) -> Self {
        Self(format!("{}-{:04}", session_id, stream_index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A part whose offset does not follow on from the previous part's end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discontinuity {
    /// Where the part should have started, in seconds.
    pub expected: f64,
    /// Where it actually starts, in seconds.
    pub actual: f64,
}

impl Discontinuity {
    /// Positive for a gap, negative for an overlap.
    pub fn delta(&self) -> f64 {
        self.actual - self.expected
    }
}

/// Opaque key/value sidecar carried with each part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartMetadata(BTreeMap<String, String>);

impl PartMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One Opus packet with its position in the recording.
///
/// Timing is fixed at construction and never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamPart {
    /// Zero-based, gap-free index within the session.
    pub index: u32,
    pub stream_id: StreamId,
    /// Raw Opus packet.
    pub data: Bytes,
    /// Stream byte offset of the block element that carried the packet.
    pub source_offset: u64,
    /// Seconds from recording start.
    pub offset: f64,
    /// Seconds.
    pub duration: f64,
    pub discontinuity: Option<Discontinuity>,
    pub metadata: PartMetadata,
}

impl AudioStreamPart {
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    /// Serializable description of the part without its payload.
    pub fn sidecar(&self) -> PartSidecar {
        PartSidecar {
            index: self.index,
            stream_id: self.stream_id.clone(),
            offset: self.offset,
            duration: self.duration,
            length: self.data.len(),
            discontinuity: self.discontinuity,
            metadata: self.metadata.clone(),
        }
    }
}

/// JSON sidecar persisted next to each part payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSidecar {
    pub index: u32,
    pub stream_id: StreamId,
    pub offset: f64,
    pub duration: f64,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discontinuity: Option<Discontinuity>,
    #[serde(default, skip_serializing_if = "PartMetadata::is_empty")]
    pub metadata: PartMetadata,
}
