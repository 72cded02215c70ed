//! Turns parser events into timed, indexed audio parts.

use crate::audio::format::AudioFormat;
use crate::audio::opus;
use crate::audio::part::{AudioStreamPart, Discontinuity, PartMetadata, StreamId};
use crate::config::IngestConfig;
use crate::ebml::document::{DEFAULT_TIMESTAMP_SCALE_NS, OPUS_CODEC_ID, TrackEntry};
use crate::ebml::tree::ParseEvent;
use crate::error::ParseError;
use crate::webm::block::Block;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct SelectedTrack {
    number: u64,
    /// Seconds per frame from DefaultDuration.
    default_duration: Option<f64>,
}

/// Maps blocks of the negotiated Opus track to [`AudioStreamPart`]s.
#[derive(Debug)]
pub struct SegmentAssembler {
    stream_id: StreamId,
    format: AudioFormat,
    fallback_duration: f64,
    tolerance: f64,
    timestamp_scale: u64,
    declared_tracks: Option<Vec<u64>>,
    track: Option<SelectedTrack>,
    cluster_timecode: Option<i64>,
    previous_cluster_timecode: Option<i64>,
    previous_block_start: Option<i64>,
    expected_offset: Option<f64>,
    next_index: u32,
}

impl SegmentAssembler {
    pub fn new(stream_id: StreamId, format: AudioFormat, config: &IngestConfig) -> Self {
        Self {
            stream_id,
            format,
            fallback_duration: config.frame_duration_secs(),
            tolerance: config.discontinuity_tolerance_secs(),
            timestamp_scale: DEFAULT_TIMESTAMP_SCALE_NS,
            declared_tracks: None,
            track: None,
            cluster_timecode: None,
            previous_cluster_timecode: None,
            previous_block_start: None,
            expected_offset: None,
            next_index: 0,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Index the next part will carry; equals the number of parts emitted.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Track number of the selected Opus track, once Tracks has been parsed.
    pub fn audio_track(&self) -> Option<u64> {
        self.track.as_ref().map(|t| t.number)
    }

    /// Applies one parser event, returning the parts it completes.
    pub fn handle(&mut self, event: &ParseEvent) -> Result<Vec<AudioStreamPart>, ParseError> {
        match event {
            ParseEvent::InfoParsed(info) => {
                self.timestamp_scale = info.timestamp_scale;
            }
            ParseEvent::TracksParsed(tracks) => self.select_track(tracks)?,
            ParseEvent::ClusterStarted { offset, timecode } => {
                let timecode = i64::try_from(*timecode).map_err(|_| {
                    ParseError::malformed(format!(
                        "cluster timecode {} at offset {} out of range",
                        timecode, offset
                    ))
                })?;
                if let Some(previous) = self.previous_cluster_timecode
                    && timecode < previous
                {
                    return Err(ParseError::OutOfOrder {
                        previous,
                        current: timecode,
                    });
                }
                self.previous_cluster_timecode = Some(timecode);
                self.cluster_timecode = Some(timecode);
            }
            ParseEvent::ClusterEnded { .. } => self.cluster_timecode = None,
            ParseEvent::BlockComplete(block) => return self.block(block),
            ParseEvent::HeaderParsed(_)
            | ParseEvent::SegmentStarted { .. }
            | ParseEvent::SegmentEnded => {}
        }
        Ok(Vec::new())
    }

    fn select_track(&mut self, tracks: &[TrackEntry]) -> Result<(), ParseError> {
        self.declared_tracks = Some(tracks.iter().map(|t| t.number).collect());

        let Some(track) = tracks.iter().find(|t| t.is_opus()) else {
            if let Some(other) = tracks.iter().find(|t| t.is_audio()) {
                return Err(ParseError::UnsupportedCodec {
                    expected: OPUS_CODEC_ID.to_string(),
                    actual: other.codec_id.clone(),
                });
            }
            return Err(ParseError::UnsupportedTrack {
                track: tracks.first().map_or(0, |t| t.number),
                reason: "stream declares no audio track".to_string(),
            });
        };

        let channels = track.audio.as_ref().map_or(1, |a| a.channels);
        if channels != u64::from(self.format.channels) {
            return Err(ParseError::UnsupportedTrack {
                track: track.number,
                reason: format!(
                    "declares {} channels, session negotiated {}",
                    channels, self.format.channels
                ),
            });
        }

        if let Some(head) = track
            .codec_private
            .as_deref()
            .and_then(|data| opus::OpusHead::parse(data).ok())
        {
            debug!(
                pre_skip = head.pre_skip,
                input_sample_rate = head.input_sample_rate,
                "OpusHead"
            );
        }

        info!(
            stream_id = %self.stream_id,
            track = track.number,
            channels,
            "selected Opus track"
        );
        self.track = Some(SelectedTrack {
            number: track.number,
            default_duration: track
                .default_duration_ns
                .filter(|ns| *ns > 0)
                .map(|ns| ns as f64 / 1e9),
        });
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<Vec<AudioStreamPart>, ParseError> {
        let Some(declared) = self.declared_tracks.as_ref() else {
            return Err(ParseError::malformed(format!(
                "block at offset {} before Tracks",
                block.stream_offset
            )));
        };
        if !declared.contains(&block.track_number) {
            return Err(ParseError::UnsupportedTrack {
                track: block.track_number,
                reason: "block references an undeclared track".to_string(),
            });
        }
        let Some(track) = self.track.clone() else {
            return Ok(Vec::new());
        };
        if block.track_number != track.number {
            debug!(
                track = block.track_number,
                offset = block.stream_offset,
                "discarding block of non-audio track"
            );
            return Ok(Vec::new());
        }

        let cluster_timecode = self.cluster_timecode.ok_or_else(|| {
            ParseError::malformed(format!(
                "block at offset {} outside of a cluster",
                block.stream_offset
            ))
        })?;
        let start = cluster_timecode
            .checked_add(i64::from(block.relative_timecode))
            .ok_or_else(|| {
                ParseError::malformed(format!(
                    "block at offset {} overflows the timeline",
                    block.stream_offset
                ))
            })?;
        if start < 0 {
            return Err(ParseError::malformed(format!(
                "block at offset {} starts before the recording",
                block.stream_offset
            )));
        }
        if let Some(previous) = self.previous_block_start
            && start < previous
        {
            return Err(ParseError::OutOfOrder {
                previous,
                current: start,
            });
        }
        self.previous_block_start = Some(start);

        let block_offset = start as f64 * self.timestamp_scale as f64 / 1e9;
        let mut elapsed = 0.0;
        let mut parts = Vec::with_capacity(block.frames.len());

        for (frame_index, data) in block.frame_data().enumerate() {
            let duration = track
                .default_duration
                .or_else(|| opus::packet_duration(&data))
                .unwrap_or(self.fallback_duration);
            let offset = block_offset + elapsed;
            elapsed += duration;

            let discontinuity = self
                .expected_offset
                .filter(|expected| (offset - expected).abs() > self.tolerance)
                .map(|expected| Discontinuity {
                    expected,
                    actual: offset,
                });
            if let Some(d) = discontinuity {
                warn!(
                    stream_id = %self.stream_id,
                    index = self.next_index,
                    expected = d.expected,
                    actual = d.actual,
                    "audio discontinuity"
                );
            }
            self.expected_offset = Some(offset + duration);

            let mut metadata = PartMetadata::new();
            metadata.insert("block_offset", block.stream_offset);
            metadata.insert("cluster_timecode", cluster_timecode);
            if block.frames.len() > 1 {
                metadata.insert("lace_frame", frame_index);
            }
            if let Some(ticks) = block.duration {
                metadata.insert("block_duration", ticks);
            }

            let index = self.next_index;
            self.next_index = index
                .checked_add(1)
                .ok_or_else(|| ParseError::malformed("part index overflow"))?;

            parts.push(AudioStreamPart {
                index,
                stream_id: self.stream_id.clone(),
                data,
                source_offset: block.stream_offset,
                offset,
                duration,
                discontinuity,
                metadata,
            });
        }
        Ok(parts)
    }
}
