//! Default configuration constants for webm-ingest.
//!
//! Shared by the config layer, the parser and the router so that a default
//! `Config` and a parser built without one behave identically.

/// The only EBML document type accepted.
pub const DOC_TYPE: &str = "webm";

/// Codec negotiated by clients.
pub const CODEC: &str = "opus";

/// Sample rate assumed when a client does not state one, in Hz.
pub const SAMPLE_RATE: u32 = 48000;

/// Channel count assumed when a client does not state one.
pub const CHANNELS: u16 = 1;

/// Frame duration used when neither the track nor the Opus TOC byte gives one.
///
/// Browser recorders emit 20ms Opus packets.
pub const FRAME_DURATION_MS: u32 = 20;

/// Maximum deviation between a part's offset and the previous part's end
/// before the part is marked as a discontinuity.
pub const DISCONTINUITY_TOLERANCE_MS: u32 = 5;

/// Largest single element the parser buffers (one Block or CodecPrivate).
///
/// 4 MiB is far above any Opus block; anything larger is treated as corruption
/// rather than held in memory.
pub const MAX_ELEMENT_BYTES: usize = 4 * 1024 * 1024;

/// Parts retained per stream for late subscribers.
///
/// 3000 parts of 20ms each is one minute of audio.
pub const RETENTION_PARTS: usize = 3000;

/// Payload bytes retained per stream.
pub const RETENTION_BYTES: usize = 16 * 1024 * 1024;

/// Ended streams kept registered so late subscribers can still replay them.
///
/// Older ended streams are dropped from the router once this many are held.
pub const ENDED_STREAMS: usize = 64;

/// Extension of persisted part payloads.
pub const PART_EXTENSION: &str = "opus";

/// Chunk size used by `replay` when none is given.
pub const REPLAY_CHUNK_SIZE: usize = 4096;
