//! Parser and assembler wired together for one recording.

use crate::audio::assembler::SegmentAssembler;
use crate::audio::format::AudioFormat;
use crate::audio::part::{AudioStreamPart, StreamId};
use crate::config::IngestConfig;
use crate::ebml::document::MatroskaDocument;
use crate::ebml::tree::{ParseEvent, TreeBuilder};
use crate::error::ParseError;

/// Synchronous byte-chunk to part pipeline. Never blocks or waits on I/O.
#[derive(Debug)]
pub struct IngestPipeline {
    tree: TreeBuilder,
    assembler: SegmentAssembler,
}

impl IngestPipeline {
    pub fn new(stream_id: StreamId, format: AudioFormat, config: &IngestConfig) -> Self {
        Self {
            tree: TreeBuilder::new(config.max_element_bytes),
            assembler: SegmentAssembler::new(stream_id, format, config),
        }
    }

    /// Parses one chunk and returns the parts it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<AudioStreamPart>, ParseError> {
        let mut parts = Vec::new();
        self.push_into(chunk, &mut parts)?;
        Ok(parts)
    }

    /// Like [`push`](Self::push), but parts completed before a failure stay in
    /// `parts` so they can still be delivered.
    pub fn push_into(
        &mut self,
        chunk: &[u8],
        parts: &mut Vec<AudioStreamPart>,
    ) -> Result<(), ParseError> {
        let mut events = Vec::new();
        let parsed = self.tree.push_into(chunk, &mut events);
        self.assemble(&events, parts)?;
        parsed
    }

    /// Ends the byte stream, closing unknown-size containers.
    pub fn finish(&mut self) -> Result<Vec<AudioStreamPart>, ParseError> {
        let mut parts = Vec::new();
        self.finish_into(&mut parts)?;
        Ok(parts)
    }

    pub fn finish_into(&mut self, parts: &mut Vec<AudioStreamPart>) -> Result<(), ParseError> {
        let mut events = Vec::new();
        let parsed = self.tree.finish_into(&mut events);
        self.assemble(&events, parts)?;
        parsed
    }

    fn assemble(
        &mut self,
        events: &[ParseEvent],
        parts: &mut Vec<AudioStreamPart>,
    ) -> Result<(), ParseError> {
        for event in events {
            parts.extend(self.assembler.handle(event)?);
        }
        Ok(())
    }

    pub fn stream_id(&self) -> &StreamId {
        self.assembler.stream_id()
    }

    pub fn document(&self) -> &MatroskaDocument {
        self.tree.document()
    }

    /// Number of parts produced so far.
    pub fn parts_emitted(&self) -> u32 {
        self.assembler.next_index()
    }

    /// Stream bytes accepted so far, including any partially buffered element.
    pub fn bytes_received(&self) -> u64 {
        self.tree.position() + self.tree.buffered() as u64
    }
}
