//! Error types for webm-ingest.

use thiserror::Error;

/// Parse-level failures. Every variant is fatal to the session that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed input: {reason}")]
    Malformed { reason: String },

    #[error("Out-of-order timecode: {current} follows {previous}")]
    OutOfOrder { previous: i64, current: i64 },

    #[error("Unsupported track {track}: {reason}")]
    UnsupportedTrack { track: u64, reason: String },

    #[error("Unsupported codec: expected {expected}, got {actual}")]
    UnsupportedCodec { expected: String, actual: String },
}

impl ParseError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors reported to a single subscriber. They never affect the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Subscriber fell behind: requested part {requested}, oldest retained is {oldest}")]
    FellBehind { requested: u64, oldest: u64 },

    #[error("Stream aborted: {reason}")]
    Aborted { reason: String },

    #[error("Stream not found: {stream_id}")]
    StreamNotFound { stream_id: String },

    #[error("Stream {stream_id} is closed")]
    Closed { stream_id: String },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    // Session errors
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Cannot {operation} while session is {state}")]
    InvalidState { state: String, operation: String },

    #[error("Missing audio chunk: expected index {expected}, got {actual}")]
    ChunkGap { expected: u32, actual: u32 },

    #[error("Part index mismatch on {stream_id}: expected {expected}, got {actual}")]
    IndexMismatch {
        stream_id: String,
        expected: u64,
        actual: u64,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Storage and protocol errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl IngestError {
    /// Returns the parse error if this failure came from the container parser.
    pub fn as_parse(&self) -> Option<&ParseError> {
        match self {
            IngestError::Parse(e) => Some(e),
            _ => None,
        }
    }

    /// Stable machine-readable code used in command responses.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Parse(ParseError::Malformed { .. }) => "malformed",
            IngestError::Parse(ParseError::OutOfOrder { .. }) => "out_of_order",
            IngestError::Parse(ParseError::UnsupportedTrack { .. }) => "unsupported_track",
            IngestError::Parse(ParseError::UnsupportedCodec { .. }) => "unsupported_codec",
            IngestError::Stream(StreamError::FellBehind { .. }) => "fell_behind",
            IngestError::Stream(StreamError::Aborted { .. }) => "stream_aborted",
            IngestError::Stream(StreamError::StreamNotFound { .. }) => "stream_not_found",
            IngestError::Stream(StreamError::Closed { .. }) => "stream_closed",
            IngestError::SessionNotFound { .. } => "session_not_found",
            IngestError::InvalidState { .. } => "invalid_state",
            IngestError::ChunkGap { .. } => "chunk_gap",
            IngestError::IndexMismatch { .. } => "index_mismatch",
            IngestError::Config(_) | IngestError::ConfigInvalidValue { .. } => "config",
            IngestError::Io(_) => "io",
            IngestError::Serialization(_) => "serialization",
            IngestError::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
