//! Audio assembly: from WebM blocks to timed Opus parts.

pub mod assembler;
pub mod format;
pub mod opus;
pub mod part;
pub mod pipeline;

pub use assembler::SegmentAssembler;
pub use format::AudioFormat;
pub use part::{AudioStreamPart, Discontinuity, PartMetadata, PartSidecar, StreamId};
pub use pipeline::IngestPipeline;
