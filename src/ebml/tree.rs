//! Incremental EBML tree builder.
//!
//! Bytes are pushed in arbitrary chunks. The builder keeps an explicit stack
//! of open containers and a small buffer holding at most one incomplete
//! element, so parsing resumes mid-element on the next push:
//!
//! ```text
//!   push(chunk) ──▶ buffer ──▶ header? ──▶ container ──▶ stack.push
//!                     ▲            │
//!                     │            └────▶ leaf ──▶ wanted?  ──▶ payload ──▶ events
//!                     │                            skipped? ──▶ skip_remaining
//!                     └── Incomplete: await N more bytes
//! ```
//!
//! Known-size containers close when the cursor reaches their end. Containers
//! with an unknown size close when an element that belongs to one of their
//! ancestors shows up, or when [`TreeBuilder::finish`] is called.

use crate::defaults;
use crate::ebml::document::{AudioSettings, EbmlHeader, MatroskaDocument, SegmentInfo, TrackEntry};
use crate::ebml::element::{
    self, ElementHeader, ElementKind, ElementSpec, Parent, ids, read_float, read_string,
    read_uint,
};
use crate::ebml::vint::{Decoded, ElementSize};
use crate::error::ParseError;
use crate::webm::block::Block;
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

/// Structural events emitted while parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    HeaderParsed(EbmlHeader),
    SegmentStarted { offset: u64, size: ElementSize },
    InfoParsed(SegmentInfo),
    TracksParsed(Vec<TrackEntry>),
    ClusterStarted { offset: u64, timecode: u64 },
    BlockComplete(Block),
    ClusterEnded { offset: u64 },
    SegmentEnded,
}

#[derive(Debug)]
struct OpenCluster {
    offset: u64,
    timecode: Option<u64>,
}

#[derive(Debug, Default)]
struct OpenBlockGroup {
    block: Option<Block>,
    duration: Option<u64>,
}

/// Streaming WebM parser state for one byte stream.
#[derive(Debug)]
pub struct TreeBuilder {
    buf: BytesMut,
    /// Absolute stream offset of `buf[0]`.
    position: u64,
    stack: Vec<ElementHeader>,
    /// Payload bytes of a skipped leaf still to be discarded.
    skip_remaining: u64,
    /// Buffer length required before another decode attempt.
    awaiting: usize,
    max_element_bytes: usize,
    document: MatroskaDocument,
    segment_seen: bool,
    track: Option<TrackEntry>,
    cluster: Option<OpenCluster>,
    group: Option<OpenBlockGroup>,
    finished: bool,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(defaults::MAX_ELEMENT_BYTES)
    }
}

impl TreeBuilder {
    /// Creates a builder that rejects any single buffered element larger than
    /// `max_element_bytes`.
    pub fn new(max_element_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(16 * 1024),
            position: 0,
            stack: Vec::with_capacity(8),
            skip_remaining: 0,
            awaiting: 0,
            max_element_bytes,
            document: MatroskaDocument::default(),
            segment_seen: false,
            track: None,
            cluster: None,
            group: None,
            finished: false,
        }
    }

    pub fn document(&self) -> &MatroskaDocument {
        &self.document
    }

    /// Absolute offset of the next unconsumed byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes held for an element that is not complete yet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of open containers.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Feeds the next chunk of the stream and returns the events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ParseEvent>, ParseError> {
        let mut events = Vec::new();
        self.push_into(chunk, &mut events)?;
        Ok(events)
    }

    /// Like [`push`](Self::push), but events produced before a failure stay in `events`.
    pub fn push_into(
        &mut self,
        chunk: &[u8],
        events: &mut Vec<ParseEvent>,
    ) -> Result<(), ParseError> {
        if self.finished {
            return Err(ParseError::malformed("data pushed after end of stream"));
        }
        self.buf.extend_from_slice(chunk);
        self.drain(events)
    }

    /// Ends the stream: force-closes unknown-size containers.
    ///
    /// Fails if the stream stopped inside an element or a known-size container.
    pub fn finish(&mut self) -> Result<Vec<ParseEvent>, ParseError> {
        let mut events = Vec::new();
        self.finish_into(&mut events)?;
        Ok(events)
    }

    pub fn finish_into(&mut self, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        self.close_completed(events)?;
        if self.skip_remaining > 0 || !self.buf.is_empty() {
            return Err(ParseError::malformed(format!(
                "stream ended inside an element at offset {}",
                self.position
            )));
        }
        while let Some(top) = self.stack.last().copied() {
            if let Some(end) = top.end() {
                return Err(ParseError::malformed(format!(
                    "{} at offset {} truncated: declared to end at {}, stream ended at {}",
                    element::name_of(top.id),
                    top.offset,
                    end,
                    self.position
                )));
            }
            self.close_top(events)?;
        }
        self.finished = true;
        Ok(())
    }

    fn drain(&mut self, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        loop {
            self.close_completed(events)?;

            if self.skip_remaining > 0 {
                let n = self.skip_remaining.min(self.buf.len() as u64) as usize;
                self.consume(n);
                self.skip_remaining -= n as u64;
                if self.skip_remaining > 0 {
                    return Ok(());
                }
                continue;
            }

            if self.buf.is_empty() || self.buf.len() < self.awaiting {
                return Ok(());
            }
            self.awaiting = 0;

            let header = match element::read_header(&self.buf, self.position)? {
                Decoded::Ready { value, .. } => value,
                Decoded::Incomplete { needed } => {
                    self.awaiting = self.buf.len() + needed;
                    return Ok(());
                }
            };
            let spec = element::lookup(header.id);
            self.close_for(&header, spec, events)?;
            let header = self.bound_to_parent(header)?;

            if spec.is_some_and(|s| s.kind == ElementKind::Master) {
                self.consume(header.header_len);
                self.open(header, events)?;
                continue;
            }

            let Some(size) = header.size.known() else {
                return Err(ParseError::malformed(format!(
                    "leaf element {} at offset {} has unknown size",
                    element::name_of(header.id),
                    header.offset
                )));
            };

            if !wants_payload(header.id) {
                trace!(
                    element = %element::name_of(header.id),
                    offset = header.offset,
                    size,
                    "skipping element"
                );
                self.consume(header.header_len);
                self.skip_remaining = size;
                continue;
            }

            let total = header.header_len as u64 + size;
            if total > self.max_element_bytes as u64 {
                return Err(ParseError::malformed(format!(
                    "{} at offset {} is {} bytes, limit is {}",
                    element::name_of(header.id),
                    header.offset,
                    total,
                    self.max_element_bytes
                )));
            }
            let total = total as usize;
            if self.buf.len() < total {
                self.awaiting = total;
                return Ok(());
            }

            self.consume(header.header_len);
            let payload = self.buf.split_to(size as usize).freeze();
            self.position += size;
            self.leaf(&header, payload, events)?;
        }
    }

    fn consume(&mut self, n: usize) {
        self.buf.advance(n);
        self.position += n as u64;
    }

    fn close_completed(&mut self, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        while let Some(end) = self.stack.last().and_then(|top| top.end()) {
            if end > self.position {
                break;
            }
            self.close_top(events)?;
        }
        Ok(())
    }

    /// Closes unknown-size containers that cannot hold the incoming element.
    fn close_for(
        &mut self,
        header: &ElementHeader,
        spec: Option<&ElementSpec>,
        events: &mut Vec<ParseEvent>,
    ) -> Result<(), ParseError> {
        // Unknown IDs are treated as children of the current container
        let Some(spec) = spec else {
            return Ok(());
        };
        match spec.parent {
            Parent::Any => return Ok(()),
            Parent::Element(parent) if !self.stack.iter().any(|f| f.id == parent) => {
                return Err(ParseError::malformed(format!(
                    "{} at offset {} outside of its parent {}",
                    spec.name,
                    header.offset,
                    element::name_of(parent)
                )));
            }
            _ => {}
        }

        while let Some(top) = self.stack.last().copied() {
            if spec.parent == Parent::Element(top.id) {
                break;
            }
            if let Some(end) = top.end() {
                return Err(ParseError::malformed(format!(
                    "{} at offset {} conflicts with {} declared to end at {}",
                    spec.name,
                    header.offset,
                    element::name_of(top.id),
                    end
                )));
            }
            self.close_top(events)?;
        }
        Ok(())
    }

    /// Checks that an element fits inside its known-size parent. An unknown
    /// size inside a known-size parent extends to the parent's end.
    fn bound_to_parent(&self, header: ElementHeader) -> Result<ElementHeader, ParseError> {
        let Some(parent_end) = self.stack.last().and_then(|p| p.end()) else {
            return Ok(header);
        };
        match header.end() {
            Some(end) if end > parent_end => Err(ParseError::malformed(format!(
                "{} at offset {} ends at {}, past its parent's end at {}",
                element::name_of(header.id),
                header.offset,
                end,
                parent_end
            ))),
            Some(_) => Ok(header),
            None => Ok(ElementHeader {
                size: ElementSize::Known(parent_end.saturating_sub(header.data_start())),
                ..header
            }),
        }
    }

    fn open(&mut self, header: ElementHeader, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        match header.id {
            ids::EBML => {
                if self.document.header.is_some() {
                    return Err(ParseError::malformed(
                        "multiple EBML documents in one stream are not supported",
                    ));
                }
                self.document.header = Some(EbmlHeader::default());
            }
            ids::SEGMENT => {
                if self.document.header.is_none() {
                    return Err(ParseError::malformed("Segment before EBML header"));
                }
                if self.segment_seen {
                    return Err(ParseError::malformed("multiple Segments in one stream"));
                }
                self.segment_seen = true;
                events.push(ParseEvent::SegmentStarted {
                    offset: header.offset,
                    size: header.size,
                });
            }
            ids::TRACK_ENTRY => self.track = Some(TrackEntry::default()),
            ids::AUDIO => {
                if let Some(track) = self.track.as_mut() {
                    track.audio = Some(AudioSettings::default());
                }
            }
            ids::CLUSTER => {
                self.cluster = Some(OpenCluster {
                    offset: header.offset,
                    timecode: None,
                });
                self.document.clusters += 1;
            }
            ids::BLOCK_GROUP => self.group = Some(OpenBlockGroup::default()),
            _ => {}
        }
        self.stack.push(header);
        Ok(())
    }

    fn close_top(&mut self, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        let Some(header) = self.stack.pop() else {
            return Ok(());
        };
        match header.id {
            ids::EBML => {
                let parsed = self.document.header.clone().unwrap_or_default();
                if parsed.doc_type != defaults::DOC_TYPE {
                    return Err(ParseError::malformed(format!(
                        "unsupported doc type {:?}",
                        parsed.doc_type
                    )));
                }
                events.push(ParseEvent::HeaderParsed(parsed));
            }
            ids::INFO => events.push(ParseEvent::InfoParsed(self.document.info.clone())),
            ids::TRACK_ENTRY => {
                let track = self.track.take().unwrap_or_default();
                if track.number == 0 {
                    return Err(ParseError::malformed("TrackEntry without TrackNumber"));
                }
                if self.document.track(track.number).is_some() {
                    return Err(ParseError::malformed(format!(
                        "duplicate track number {}",
                        track.number
                    )));
                }
                self.document.tracks.push(track);
            }
            ids::TRACKS => events.push(ParseEvent::TracksParsed(self.document.tracks.clone())),
            ids::CLUSTER => {
                if let Some(OpenCluster {
                    offset,
                    timecode: Some(_),
                }) = self.cluster.take()
                {
                    debug!(offset, end = self.position, "cluster ended");
                    events.push(ParseEvent::ClusterEnded { offset });
                }
            }
            ids::BLOCK_GROUP => {
                let group = self.group.take().unwrap_or_default();
                let Some(mut block) = group.block else {
                    return Err(ParseError::malformed(format!(
                        "BlockGroup at offset {} without Block",
                        header.offset
                    )));
                };
                block.duration = group.duration;
                events.push(ParseEvent::BlockComplete(block));
            }
            ids::SEGMENT => events.push(ParseEvent::SegmentEnded),
            _ => {}
        }
        Ok(())
    }

    fn cluster_timecode(&self, header: &ElementHeader) -> Result<u64, ParseError> {
        self.cluster
            .as_ref()
            .and_then(|c| c.timecode)
            .ok_or_else(|| {
                ParseError::malformed(format!(
                    "{} at offset {} before its cluster Timestamp",
                    element::name_of(header.id),
                    header.offset
                ))
            })
    }

    fn leaf(
        &mut self,
        header: &ElementHeader,
        payload: Bytes,
        events: &mut Vec<ParseEvent>,
    ) -> Result<(), ParseError> {
        match header.id {
            ids::SIMPLE_BLOCK => {
                self.cluster_timecode(header)?;
                let block = Block::parse(payload, true, header.offset)?;
                events.push(ParseEvent::BlockComplete(block));
            }
            ids::BLOCK => {
                self.cluster_timecode(header)?;
                let block = Block::parse(payload, false, header.offset)?;
                let group = self.group.get_or_insert_with(OpenBlockGroup::default);
                if group.block.replace(block).is_some() {
                    return Err(ParseError::malformed("BlockGroup with more than one Block"));
                }
            }
            ids::BLOCK_DURATION => {
                let duration = read_uint(&payload)?;
                self.group.get_or_insert_with(OpenBlockGroup::default).duration = Some(duration);
            }
            ids::TIMESTAMP => {
                let timecode = read_uint(&payload)?;
                let Some(cluster) = self.cluster.as_mut() else {
                    return Ok(());
                };
                if cluster.timecode.replace(timecode).is_some() {
                    return Err(ParseError::malformed(format!(
                        "duplicate cluster Timestamp at offset {}",
                        header.offset
                    )));
                }
                self.document.last_cluster_timecode = Some(timecode);
                debug!(offset = cluster.offset, timecode, "cluster started");
                events.push(ParseEvent::ClusterStarted {
                    offset: cluster.offset,
                    timecode,
                });
            }
            ids::TIMESTAMP_SCALE => {
                let scale = read_uint(&payload)?;
                if scale == 0 {
                    return Err(ParseError::malformed("TimestampScale of zero"));
                }
                self.document.info.timestamp_scale = scale;
            }
            ids::DURATION => self.document.info.duration = Some(read_float(&payload)?),
            ids::MUXING_APP => self.document.info.muxing_app = Some(read_string(&payload)),
            ids::WRITING_APP => self.document.info.writing_app = Some(read_string(&payload)),
            ids::TITLE => self.document.info.title = Some(read_string(&payload)),
            id if is_header_field(id) => self.header_field(id, &payload)?,
            id => self.track_field(id, payload)?,
        }
        Ok(())
    }

    fn header_field(&mut self, id: u32, payload: &[u8]) -> Result<(), ParseError> {
        let Some(header) = self.document.header.as_mut() else {
            return Ok(());
        };
        match id {
            ids::EBML_VERSION => header.version = read_uint(payload)?,
            ids::EBML_READ_VERSION => header.read_version = read_uint(payload)?,
            ids::EBML_MAX_ID_LENGTH => header.max_id_length = read_uint(payload)?,
            ids::EBML_MAX_SIZE_LENGTH => header.max_size_length = read_uint(payload)?,
            ids::DOC_TYPE => header.doc_type = read_string(payload),
            ids::DOC_TYPE_VERSION => header.doc_type_version = read_uint(payload)?,
            ids::DOC_TYPE_READ_VERSION => header.doc_type_read_version = read_uint(payload)?,
            _ => {}
        }
        Ok(())
    }

    fn track_field(&mut self, id: u32, payload: Bytes) -> Result<(), ParseError> {
        let Some(track) = self.track.as_mut() else {
            return Ok(());
        };
        match id {
            ids::TRACK_NUMBER => track.number = read_uint(&payload)?,
            ids::TRACK_UID => track.uid = Some(read_uint(&payload)?),
            ids::TRACK_TYPE => track.track_type = Some(read_uint(&payload)?.into()),
            ids::CODEC_ID => track.codec_id = read_string(&payload),
            ids::CODEC_PRIVATE => track.codec_private = Some(payload.to_vec()),
            ids::CODEC_DELAY => track.codec_delay_ns = Some(read_uint(&payload)?),
            ids::SEEK_PRE_ROLL => track.seek_pre_roll_ns = Some(read_uint(&payload)?),
            ids::DEFAULT_DURATION => track.default_duration_ns = Some(read_uint(&payload)?),
            ids::LANGUAGE => track.language = Some(read_string(&payload)),
            ids::NAME => track.name = Some(read_string(&payload)),
            ids::SAMPLING_FREQUENCY | ids::OUTPUT_SAMPLING_FREQUENCY | ids::CHANNELS
            | ids::BIT_DEPTH => {
                let audio = track.audio.get_or_insert_with(AudioSettings::default);
                match id {
                    ids::SAMPLING_FREQUENCY => audio.sampling_frequency = read_float(&payload)?,
                    ids::OUTPUT_SAMPLING_FREQUENCY => {
                        audio.output_sampling_frequency = Some(read_float(&payload)?)
                    }
                    ids::CHANNELS => audio.channels = read_uint(&payload)?,
                    _ => audio.bit_depth = Some(read_uint(&payload)?),
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_header_field(id: u32) -> bool {
    matches!(
        id,
        ids::EBML_VERSION
            | ids::EBML_READ_VERSION
            | ids::EBML_MAX_ID_LENGTH
            | ids::EBML_MAX_SIZE_LENGTH
            | ids::DOC_TYPE
            | ids::DOC_TYPE_VERSION
            | ids::DOC_TYPE_READ_VERSION
    )
}

/// Leaves whose payload the builder interprets; everything else is skipped
/// without buffering.
fn wants_payload(id: u32) -> bool {
    is_header_field(id)
        || matches!(
            id,
            ids::SIMPLE_BLOCK
                | ids::BLOCK
                | ids::BLOCK_DURATION
                | ids::TIMESTAMP
                | ids::TIMESTAMP_SCALE
                | ids::DURATION
                | ids::MUXING_APP
                | ids::WRITING_APP
                | ids::TITLE
                | ids::TRACK_NUMBER
                | ids::TRACK_UID
                | ids::TRACK_TYPE
                | ids::CODEC_ID
                | ids::CODEC_PRIVATE
                | ids::CODEC_DELAY
                | ids::SEEK_PRE_ROLL
                | ids::DEFAULT_DURATION
                | ids::LANGUAGE
                | ids::NAME
                | ids::SAMPLING_FREQUENCY
                | ids::OUTPUT_SAMPLING_FREQUENCY
                | ids::CHANNELS
                | ids::BIT_DEPTH
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webm::fixture::{self, FixtureBlock, WebmStreamBuilder};

    fn parse_all(bytes: &[u8]) -> Vec<ParseEvent> {
        let mut builder = TreeBuilder::default();
        let mut events = builder.push(bytes).unwrap();
        events.extend(builder.finish().unwrap());
        events
    }

    fn parse_chunked(bytes: &[u8], chunk: usize) -> Vec<ParseEvent> {
        let mut builder = TreeBuilder::default();
        let mut events = Vec::new();
        for piece in bytes.chunks(chunk) {
            events.extend(builder.push(piece).unwrap());
        }
        events.extend(builder.finish().unwrap());
        events
    }

    fn two_cluster_stream() -> WebmStreamBuilder {
        WebmStreamBuilder::opus(1)
            .cluster(0, vec![FixtureBlock::simple(0, 3), FixtureBlock::simple(20, 3)])
            .cluster(40, vec![FixtureBlock::simple(0, 3)])
    }

    fn kinds(events: &[ParseEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                ParseEvent::HeaderParsed(_) => "header",
                ParseEvent::SegmentStarted { .. } => "segment",
                ParseEvent::InfoParsed(_) => "info",
                ParseEvent::TracksParsed(_) => "tracks",
                ParseEvent::ClusterStarted { .. } => "cluster",
                ParseEvent::BlockComplete(_) => "block",
                ParseEvent::ClusterEnded { .. } => "cluster_end",
                ParseEvent::SegmentEnded => "segment_end",
            })
            .collect()
    }

    #[test]
    fn test_live_stream_event_order() {
        let bytes = two_cluster_stream().build();
        let events = parse_all(&bytes);
        assert_eq!(
            kinds(&events),
            vec![
                "header",
                "segment",
                "info",
                "tracks",
                "cluster",
                "block",
                "block",
                "cluster_end",
                "cluster",
                "block",
                "cluster_end",
                "segment_end"
            ]
        );
    }

    #[test]
    fn test_known_size_stream_closes_without_finish() {
        let bytes = two_cluster_stream().known_sizes().build();
        let mut builder = TreeBuilder::default();
        let events = builder.push(&bytes).unwrap();
        assert_eq!(kinds(&events).last(), Some(&"segment_end"));
        assert_eq!(builder.depth(), 0);
        assert!(builder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_every_chunk_size_yields_identical_events() {
        let bytes = two_cluster_stream().build();
        let expected = parse_all(&bytes);
        for chunk in 1..=bytes.len() {
            assert_eq!(parse_chunked(&bytes, chunk), expected, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_unknown_size_cluster_closed_by_sibling_cluster() {
        let bytes = two_cluster_stream().build();
        let mut builder = TreeBuilder::default();
        let events = builder.push(&bytes).unwrap();
        // Second cluster is still open until the stream ends
        assert_eq!(kinds(&events).iter().filter(|k| **k == "cluster_end").count(), 1);
        assert_eq!(builder.depth(), 2);

        let tail = builder.finish().unwrap();
        assert_eq!(kinds(&tail), vec!["cluster_end", "segment_end"]);
    }

    #[test]
    fn test_document_is_populated() {
        let bytes = WebmStreamBuilder::opus(2).cluster(0, vec![]).build();
        let mut builder = TreeBuilder::default();
        builder.push(&bytes).unwrap();
        let doc = builder.document();
        assert_eq!(doc.header.as_ref().unwrap().doc_type, "webm");
        assert_eq!(doc.info.timestamp_scale, 1_000_000);
        assert_eq!(doc.tracks.len(), 1);
        let track = &doc.tracks[0];
        assert!(track.is_opus());
        assert_eq!(track.audio.as_ref().unwrap().channels, 2);
        assert_eq!(track.audio.as_ref().unwrap().sampling_frequency, 48000.0);
        assert_eq!(doc.clusters, 1);
        assert_eq!(doc.last_cluster_timecode, Some(0));
    }

    #[test]
    fn test_block_group_carries_duration() {
        let bytes = WebmStreamBuilder::opus(1)
            .cluster(0, vec![FixtureBlock::simple(0, 2).in_group(Some(20))])
            .build();
        let block = parse_all(&bytes)
            .into_iter()
            .find_map(|e| match e {
                ParseEvent::BlockComplete(b) => Some(b),
                _ => None,
            })
            .unwrap();
        assert_eq!(block.duration, Some(20));
        assert!(!block.keyframe);
    }

    #[test]
    fn test_void_and_unknown_elements_are_skipped() {
        let mut bytes = WebmStreamBuilder::opus(1).build();
        bytes.extend(fixture::element(ids::VOID, &[0u8; 300]));
        bytes.extend(fixture::element(0x4F4F, &[1, 2, 3]));
        bytes.extend(fixture::cluster(0, &[FixtureBlock::simple(0, 3)], false));
        let events = parse_chunked(&bytes, 7);
        assert_eq!(kinds(&events).iter().filter(|k| **k == "block").count(), 1);
    }

    #[test]
    fn test_block_before_timestamp_is_malformed() {
        let mut bytes = WebmStreamBuilder::opus(1).build();
        bytes.extend(fixture::unknown_size_header(ids::CLUSTER));
        bytes.extend(fixture::element(
            ids::SIMPLE_BLOCK,
            &fixture::block_payload(&FixtureBlock::simple(0, 3), 1),
        ));
        let mut builder = TreeBuilder::default();
        assert!(matches!(
            builder.push(&bytes),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_child_overflowing_parent_is_malformed() {
        let mut bytes = WebmStreamBuilder::opus(1).build();
        // Cluster declares 4 bytes but its Timestamp child needs 6
        bytes.extend(fixture::element_header(ids::CLUSTER, 4));
        bytes.extend(fixture::uint_element(ids::TIMESTAMP, 0x0102_0304));
        let mut builder = TreeBuilder::default();
        assert!(builder.push(&bytes).is_err());
    }

    #[test]
    fn test_sibling_inside_known_size_container_is_malformed() {
        let mut bytes = WebmStreamBuilder::opus(1).build();
        let timestamp = fixture::uint_element(ids::TIMESTAMP, 0);
        // Cluster claims 100 bytes but a new Cluster starts right after its Timestamp
        bytes.extend(fixture::element_header(ids::CLUSTER, 100));
        bytes.extend(&timestamp);
        bytes.extend(fixture::element_header(ids::CLUSTER, 20));
        let mut builder = TreeBuilder::default();
        assert!(matches!(
            builder.push(&bytes),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncated_stream_fails_on_finish() {
        let bytes = two_cluster_stream().build();
        let mut builder = TreeBuilder::default();
        builder.push(&bytes[..bytes.len() - 2]).unwrap();
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_wrong_doc_type_is_malformed() {
        let bytes = fixture::ebml_header("matroska");
        let mut builder = TreeBuilder::default();
        assert!(builder.push(&bytes).is_err());
    }

    #[test]
    fn test_element_over_limit_is_malformed() {
        let bytes = WebmStreamBuilder::opus(1)
            .cluster(0, vec![FixtureBlock::simple(0, 1).with_frame_len(600)])
            .build();
        let mut builder = TreeBuilder::new(256);
        assert!(builder.push(&bytes).is_err());
    }

    #[test]
    fn test_push_after_finish_is_rejected() {
        let bytes = two_cluster_stream().build();
        let mut builder = TreeBuilder::default();
        builder.push(&bytes).unwrap();
        builder.finish().unwrap();
        assert!(builder.push(&[0x1F]).is_err());
    }

    #[test]
    fn test_buffer_holds_only_incomplete_element() {
        let bytes = two_cluster_stream().build();
        let mut builder = TreeBuilder::default();
        builder.push(&bytes[..bytes.len() - 3]).unwrap();
        assert!(builder.buffered() > 0);
        assert!(builder.buffered() < 64);
        assert_eq!(builder.position() + builder.buffered() as u64, bytes.len() as u64 - 3);
    }
}
