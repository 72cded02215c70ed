//! One recording: its pipeline, chunk log and output stream.

use crate::audio::format::AudioFormat;
use crate::audio::part::{AudioStreamPart, StreamId};
use crate::audio::pipeline::IngestPipeline;
use crate::config::IngestConfig;
use crate::error::{IngestError, ParseError, Result};
use crate::session::state::{ChunkRecord, SessionState};
use crate::streaming::router::{AudioStreamRouter, Subscription};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Parameters of an `Initialize` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    pub audio_format: AudioFormat,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub client_start_time: Option<DateTime<Utc>>,
}

/// Result of an `AppendAudio` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Chunk parsed; `parts` new parts were published.
    Accepted { parts: usize },
    /// Chunk index was already applied; nothing changed.
    Duplicate,
}

/// Totals reported when a session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub parts: u32,
    pub chunks: u32,
    pub bytes: u64,
}

pub struct IngestSession {
    id: String,
    params: SessionParams,
    created_at: DateTime<Utc>,
    state: SessionState,
    stream_id: StreamId,
    pipeline: IngestPipeline,
    router: Arc<AudioStreamRouter>,
    chunks: Vec<ChunkRecord>,
    abort_reason: Option<String>,
}

impl IngestSession {
    /// Creates a session with a fresh UUID v4 id and opens its output stream.
    pub fn new(
        params: SessionParams,
        router: Arc<AudioStreamRouter>,
        config: &IngestConfig,
    ) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), params, router, config)
    }

    pub fn with_id(
        id: String,
        params: SessionParams,
        router: Arc<AudioStreamRouter>,
        config: &IngestConfig,
    ) -> Result<Self> {
        params.audio_format.validate()?;
        let stream_id = StreamId::for_session(&id, 0);
        if !router.open(stream_id.clone()) {
            return Err(IngestError::Other(format!(
                "stream {} already exists",
                stream_id
            )));
        }
        let pipeline = IngestPipeline::new(stream_id.clone(), params.audio_format.clone(), config);

        info!(
            session_id = %id,
            stream_id = %stream_id,
            channels = params.audio_format.channels,
            sample_rate = params.audio_format.sample_rate,
            language = params.language.as_deref().unwrap_or("-"),
            "session created"
        );

        Ok(Self {
            id,
            params,
            created_at: Utc::now(),
            state: SessionState::Created,
            stream_id,
            pipeline,
            router,
            chunks: Vec::new(),
            abort_reason: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn parts_published(&self) -> u32 {
        self.pipeline.parts_emitted()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Subscribes to this session's output stream.
    pub fn subscribe(&self, from_index: u64) -> Result<Subscription<AudioStreamPart>> {
        Ok(self.router.subscribe(&self.stream_id, from_index)?)
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidState {
                state: self.state.to_string(),
                operation: format!("move to {}", next),
            });
        }
        debug!(session_id = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
        Ok(())
    }

    fn require(&self, allowed: bool, operation: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(IngestError::InvalidState {
                state: self.state.to_string(),
                operation: operation.to_string(),
            })
        }
    }

    /// Feeds one client chunk through the pipeline and publishes the parts it completes.
    ///
    /// A repeated index is ignored. A skipped index or any parse failure aborts
    /// the session.
    pub fn append(&mut self, index: u32, client_offset: f64, data: &[u8]) -> Result<AppendOutcome> {
        self.require(self.state.accepts_audio(), "append audio")?;

        let expected = self.chunks.len() as u32;
        if index < expected {
            warn!(session_id = %self.id, index, expected, "duplicate audio chunk ignored");
            return Ok(AppendOutcome::Duplicate);
        }
        if index > expected {
            let gap = IngestError::ChunkGap {
                expected,
                actual: index,
            };
            self.fail(&gap.to_string());
            return Err(gap);
        }

        if self.state == SessionState::Created {
            self.transition(SessionState::Appending)?;
        }
        self.chunks.push(ChunkRecord {
            index,
            client_offset,
            length: data.len(),
            stream_offset: self.pipeline.bytes_received(),
        });

        let mut parts = Vec::new();
        let parsed = self.pipeline.push_into(data, &mut parts);
        let count = parts.len();
        self.publish(parts)?;
        if let Err(e) = parsed {
            return Err(self.parse_failure(e));
        }
        debug!(session_id = %self.id, index, bytes = data.len(), parts = count, "chunk applied");
        Ok(AppendOutcome::Accepted { parts: count })
    }

    /// Ends the byte stream, flushes the final parts and closes the stream.
    pub fn complete(&mut self) -> Result<CompletionSummary> {
        self.require(self.state.accepts_audio(), "complete")?;
        self.transition(SessionState::Completing)?;

        let mut parts = Vec::new();
        let parsed = self.pipeline.finish_into(&mut parts);
        self.publish(parts)?;
        if let Err(e) = parsed {
            return Err(self.parse_failure(e));
        }
        self.router.close(&self.stream_id)?;
        self.transition(SessionState::Completed)?;

        let summary = CompletionSummary {
            parts: self.pipeline.parts_emitted(),
            chunks: self.chunks.len() as u32,
            bytes: self.pipeline.bytes_received(),
        };
        info!(
            session_id = %self.id,
            parts = summary.parts,
            chunks = summary.chunks,
            bytes = summary.bytes,
            "session completed"
        );
        Ok(summary)
    }

    /// Cancels the session on client request.
    pub fn abort(&mut self, reason: &str) -> Result<()> {
        self.require(
            self.state.can_transition_to(SessionState::Aborted),
            "abort",
        )?;
        self.fail(reason);
        Ok(())
    }

    fn parse_failure(&mut self, error: ParseError) -> IngestError {
        self.fail(&error.to_string());
        error.into()
    }

    /// Moves to Aborted and fails the stream so readers see the corruption.
    fn fail(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        error!(session_id = %self.id, state = %self.state, reason, "session aborted");
        self.state = SessionState::Aborted;
        self.abort_reason = Some(reason.to_string());
        if let Err(e) = self.router.fail(&self.stream_id, reason) {
            warn!(session_id = %self.id, error = %e, "failed to mark stream as aborted");
        }
    }

    fn publish(&mut self, parts: Vec<AudioStreamPart>) -> Result<()> {
        let last_chunk = self.chunks.last().map(|c| c.index);
        for mut part in parts {
            if let Some(first) = self.chunk_at(part.source_offset) {
                part.metadata.insert("chunk_first", first);
            }
            if let Some(last) = last_chunk {
                part.metadata.insert("chunk_last", last);
            }
            if let Err(e) = self.router.publish(&self.stream_id, part) {
                self.fail(&e.to_string());
                return Err(e);
            }
        }
        Ok(())
    }

    /// Index of the chunk that delivered the byte at `offset`.
    fn chunk_at(&self, offset: u64) -> Option<u32> {
        let after = self.chunks.partition_point(|c| c.stream_offset <= offset);
        after.checked_sub(1).map(|i| self.chunks[i].index)
    }
}
