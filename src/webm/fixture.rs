//! Builders for small WebM byte streams.
//!
//! Used by unit tests, the integration tests and the parse benchmark. The
//! output mirrors what browser recorders emit: an EBML header, a live
//! (unknown-size) Segment, Info, one Opus track and unknown-size Clusters of
//! SimpleBlocks. Known sizes, laced blocks, BlockGroups and forced size widths
//! can be switched on to exercise the parser.

use crate::ebml::document::OPUS_CODEC_ID;
use crate::ebml::element::ids;
use crate::ebml::vint;
use crate::webm::lacing::Lacing;

/// Opus TOC byte for a CELT fullband 20ms single-frame packet.
pub const OPUS_TOC_20MS: u8 = 0xF8;

/// Payload length of frames produced by [`FixtureBlock::simple`].
pub const DEFAULT_FRAME_LEN: usize = 16;

const KEYFRAME: u8 = 0x80;

fn size_bytes(value: u64, width: Option<usize>) -> Vec<u8> {
    width
        .and_then(|w| vint::encode_size_with_width(value, w))
        .or_else(|| vint::encode_size(value))
        .unwrap_or_else(|| vint::encode_unknown_size(vint::MAX_SIZE_WIDTH))
}

/// ID plus a known size, without payload.
pub fn element_header(id: u32, size: u64) -> Vec<u8> {
    let mut out = vint::encode_id(id);
    out.extend(size_bytes(size, None));
    out
}

/// ID plus an 8-byte unknown size marker.
pub fn unknown_size_header(id: u32) -> Vec<u8> {
    let mut out = vint::encode_id(id);
    out.extend(vint::encode_unknown_size(vint::MAX_SIZE_WIDTH));
    out
}

pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    element_with_size_width(id, payload, None)
}

/// Element whose size field is forced to `width` bytes when it fits.
pub fn element_with_size_width(id: u32, payload: &[u8], width: Option<usize>) -> Vec<u8> {
    let mut out = vint::encode_id(id);
    out.extend(size_bytes(payload.len() as u64, width));
    out.extend_from_slice(payload);
    out
}

pub fn uint_element(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
    element(id, &bytes[skip..])
}

pub fn float_element(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_bits().to_be_bytes())
}

pub fn string_element(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(uint_element(ids::EBML_VERSION, 1));
    body.extend(uint_element(ids::EBML_READ_VERSION, 1));
    body.extend(uint_element(ids::EBML_MAX_ID_LENGTH, 4));
    body.extend(uint_element(ids::EBML_MAX_SIZE_LENGTH, 8));
    body.extend(string_element(ids::DOC_TYPE, doc_type));
    body.extend(uint_element(ids::DOC_TYPE_VERSION, 4));
    body.extend(uint_element(ids::DOC_TYPE_READ_VERSION, 2));
    element(ids::EBML, &body)
}

/// OpusHead identification header used as CodecPrivate.
pub fn opus_head(channels: u8, input_sample_rate: u32) -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    head.push(1);
    head.push(channels);
    head.extend(312u16.to_le_bytes());
    head.extend(input_sample_rate.to_le_bytes());
    head.extend(0i16.to_le_bytes());
    head.push(0);
    head
}

/// An Opus packet of `len` bytes starting with a 20ms TOC byte.
pub fn opus_frame(len: usize, seed: u8) -> Vec<u8> {
    let mut frame = vec![OPUS_TOC_20MS];
    frame.extend((1..len.max(1)).map(|i| seed.wrapping_add(i as u8)));
    frame
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureBlock {
    /// Track number; `None` uses the builder's audio track.
    pub track: Option<u64>,
    pub relative_timecode: i16,
    pub lacing: Lacing,
    pub frames: Vec<Vec<u8>>,
    /// `Some` wraps the block in a BlockGroup with the given BlockDuration.
    pub group: Option<Option<u64>>,
}

impl FixtureBlock {
    /// A SimpleBlock holding one 20ms Opus frame.
    pub fn simple(relative_timecode: i16, seed: u8) -> Self {
        Self {
            track: None,
            relative_timecode,
            lacing: Lacing::No,
            frames: vec![opus_frame(DEFAULT_FRAME_LEN, seed)],
            group: None,
        }
    }

    pub fn laced(relative_timecode: i16, lacing: Lacing, frames: Vec<Vec<u8>>) -> Self {
        Self {
            track: None,
            relative_timecode,
            lacing,
            frames,
            group: None,
        }
    }

    pub fn on_track(mut self, track: u64) -> Self {
        self.track = Some(track);
        self
    }

    pub fn in_group(mut self, duration: Option<u64>) -> Self {
        self.group = Some(duration);
        self
    }

    pub fn with_frame_len(mut self, len: usize) -> Self {
        for frame in &mut self.frames {
            let seed = frame.get(1).copied().unwrap_or(0).wrapping_sub(1);
            *frame = opus_frame(len, seed);
        }
        self
    }
}

/// Block payload: track number, timecode, flags, lacing header and frames.
pub fn block_payload(block: &FixtureBlock, default_track: u64) -> Vec<u8> {
    let mut out = size_bytes(block.track.unwrap_or(default_track), None);
    out.extend(block.relative_timecode.to_be_bytes());

    let lacing_bits = match block.lacing {
        Lacing::No => 0x00,
        Lacing::Xiph => 0x02,
        Lacing::FixedSize => 0x04,
        Lacing::Ebml => 0x06,
    };
    let keyframe = if block.group.is_none() { KEYFRAME } else { 0 };
    out.push(keyframe | lacing_bits);

    if block.lacing != Lacing::No {
        out.push(block.frames.len().saturating_sub(1) as u8);
    }
    let sizes: Vec<usize> = block.frames.iter().map(Vec::len).collect();
    let laced = sizes.len().saturating_sub(1);
    match block.lacing {
        Lacing::Xiph => {
            for &size in &sizes[..laced] {
                out.extend(std::iter::repeat_n(0xFF, size / 255));
                out.push((size % 255) as u8);
            }
        }
        Lacing::Ebml if laced > 0 => {
            out.extend(size_bytes(sizes[0] as u64, None));
            for pair in sizes[..laced].windows(2) {
                let delta = pair[1] as i64 - pair[0] as i64;
                out.extend(vint::encode_signed(delta).unwrap_or_default());
            }
        }
        _ => {}
    }
    for frame in &block.frames {
        out.extend_from_slice(frame);
    }
    out
}

/// Block element bytes and the offset of the element that carries the block.
fn block_element(
    block: &FixtureBlock,
    default_track: u64,
    size_width: Option<usize>,
) -> (Vec<u8>, usize) {
    let payload = block_payload(block, default_track);
    match block.group {
        None => (
            element_with_size_width(ids::SIMPLE_BLOCK, &payload, size_width),
            0,
        ),
        Some(duration) => {
            let mut body = element_with_size_width(ids::BLOCK, &payload, size_width);
            if let Some(duration) = duration {
                body.extend(uint_element(ids::BLOCK_DURATION, duration));
            }
            let group = element(ids::BLOCK_GROUP, &body);
            let header_len = group.len() - body.len();
            (group, header_len)
        }
    }
}

fn cluster_with_offsets(
    timecode: u64,
    blocks: &[FixtureBlock],
    known_size: bool,
    default_track: u64,
    size_width: Option<usize>,
) -> (Vec<u8>, Vec<usize>) {
    let mut body = uint_element(ids::TIMESTAMP, timecode);
    let mut offsets = Vec::with_capacity(blocks.len());
    for block in blocks {
        let (bytes, inner) = block_element(block, default_track, size_width);
        offsets.push(body.len() + inner);
        body.extend(bytes);
    }
    let mut out = if known_size {
        element_header(ids::CLUSTER, body.len() as u64)
    } else {
        unknown_size_header(ids::CLUSTER)
    };
    let header_len = out.len();
    out.extend(body);
    (out, offsets.into_iter().map(|o| o + header_len).collect())
}

/// A Cluster of blocks on track 1.
pub fn cluster(timecode: u64, blocks: &[FixtureBlock], known_size: bool) -> Vec<u8> {
    cluster_with_offsets(timecode, blocks, known_size, 1, None).0
}

/// Built stream plus the absolute offset of every SimpleBlock/Block element.
#[derive(Debug, Clone)]
pub struct FixtureStream {
    pub bytes: Vec<u8>,
    pub block_offsets: Vec<usize>,
}

#[derive(Debug, Clone)]
struct ExtraTrack {
    number: u64,
    track_type: u64,
    codec_id: String,
}

/// Builds a complete WebM stream.
#[derive(Debug, Clone)]
pub struct WebmStreamBuilder {
    doc_type: String,
    track_number: u64,
    codec_id: String,
    channels: u64,
    sampling_frequency: f64,
    timestamp_scale: u64,
    default_duration_ns: Option<u64>,
    extra_tracks: Vec<ExtraTrack>,
    clusters: Vec<(u64, Vec<FixtureBlock>)>,
    known_sizes: bool,
    block_size_width: Option<usize>,
}

impl WebmStreamBuilder {
    /// Opus audio on track 1 at 48kHz with `channels` channels.
    pub fn opus(channels: u64) -> Self {
        Self {
            doc_type: "webm".to_string(),
            track_number: 1,
            codec_id: OPUS_CODEC_ID.to_string(),
            channels,
            sampling_frequency: 48000.0,
            timestamp_scale: 1_000_000,
            default_duration_ns: None,
            extra_tracks: Vec::new(),
            clusters: Vec::new(),
            known_sizes: false,
            block_size_width: None,
        }
    }

    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.doc_type = doc_type.to_string();
        self
    }

    pub fn codec(mut self, codec_id: &str) -> Self {
        self.codec_id = codec_id.to_string();
        self
    }

    pub fn track_number(mut self, number: u64) -> Self {
        self.track_number = number;
        self
    }

    pub fn sampling_frequency(mut self, hz: f64) -> Self {
        self.sampling_frequency = hz;
        self
    }

    pub fn timestamp_scale(mut self, scale: u64) -> Self {
        self.timestamp_scale = scale;
        self
    }

    pub fn default_duration_ns(mut self, ns: u64) -> Self {
        self.default_duration_ns = Some(ns);
        self
    }

    /// Declares another track, e.g. `(2, 1, "V_VP8")` for video.
    pub fn extra_track(mut self, number: u64, track_type: u64, codec_id: &str) -> Self {
        self.extra_tracks.push(ExtraTrack {
            number,
            track_type,
            codec_id: codec_id.to_string(),
        });
        self
    }

    pub fn cluster(mut self, timecode: u64, blocks: Vec<FixtureBlock>) -> Self {
        self.clusters.push((timecode, blocks));
        self
    }

    /// Appends `count` single-frame clusters, `per_cluster` 20ms blocks each.
    pub fn clusters_of(mut self, count: usize, per_cluster: usize) -> Self {
        let first = self.clusters.len();
        for c in first..first + count {
            let blocks = (0..per_cluster)
                .map(|b| FixtureBlock::simple((b * 20) as i16, (c * per_cluster + b) as u8))
                .collect();
            self.clusters
                .push((c as u64 * per_cluster as u64 * 20, blocks));
        }
        self
    }

    /// Gives the Segment and every Cluster a known size.
    pub fn known_sizes(mut self) -> Self {
        self.known_sizes = true;
        self
    }

    /// Forces the size field of every block element to `width` bytes.
    pub fn block_size_width(mut self, width: usize) -> Self {
        self.block_size_width = Some(width);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_indexed().bytes
    }

    pub fn build_indexed(&self) -> FixtureStream {
        let mut segment_body = self.info();
        segment_body.extend(self.tracks());

        let mut block_offsets = Vec::new();
        for (timecode, blocks) in &self.clusters {
            let (bytes, offsets) = cluster_with_offsets(
                *timecode,
                blocks,
                self.known_sizes,
                self.track_number,
                self.block_size_width,
            );
            let base = segment_body.len();
            block_offsets.extend(offsets.into_iter().map(|o| o + base));
            segment_body.extend(bytes);
        }

        let mut bytes = ebml_header(&self.doc_type);
        if self.known_sizes {
            bytes.extend(element_header(ids::SEGMENT, segment_body.len() as u64));
        } else {
            bytes.extend(unknown_size_header(ids::SEGMENT));
        }
        let base = bytes.len();
        bytes.extend(segment_body);

        FixtureStream {
            bytes,
            block_offsets: block_offsets.into_iter().map(|o| o + base).collect(),
        }
    }

    fn info(&self) -> Vec<u8> {
        let mut body = uint_element(ids::TIMESTAMP_SCALE, self.timestamp_scale);
        body.extend(string_element(ids::MUXING_APP, "webm-ingest-fixture"));
        body.extend(string_element(ids::WRITING_APP, "webm-ingest-fixture"));
        element(ids::INFO, &body)
    }

    fn tracks(&self) -> Vec<u8> {
        let mut entry = uint_element(ids::TRACK_NUMBER, self.track_number);
        entry.extend(uint_element(ids::TRACK_UID, self.track_number * 1000 + 7));
        entry.extend(uint_element(ids::TRACK_TYPE, 2));
        entry.extend(string_element(ids::CODEC_ID, &self.codec_id));
        if self.codec_id == OPUS_CODEC_ID {
            entry.extend(element(
                ids::CODEC_PRIVATE,
                &opus_head(self.channels as u8, self.sampling_frequency as u32),
            ));
        }
        if let Some(ns) = self.default_duration_ns {
            entry.extend(uint_element(ids::DEFAULT_DURATION, ns));
        }
        let mut audio = float_element(ids::SAMPLING_FREQUENCY, self.sampling_frequency);
        audio.extend(uint_element(ids::CHANNELS, self.channels));
        entry.extend(element(ids::AUDIO, &audio));

        let mut body = element(ids::TRACK_ENTRY, &entry);
        for extra in &self.extra_tracks {
            let mut entry = uint_element(ids::TRACK_NUMBER, extra.number);
            entry.extend(uint_element(ids::TRACK_TYPE, extra.track_type));
            entry.extend(string_element(ids::CODEC_ID, &extra.codec_id));
            body.extend(element(ids::TRACK_ENTRY, &entry));
        }
        element(ids::TRACKS, &body)
    }
}
