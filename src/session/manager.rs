//! Registry of live sessions serving the ingest commands.

use crate::audio::part::StreamId;
use crate::command::{CommandResponse, IngestCommand};
use crate::config::{Config, IngestConfig};
use crate::error::{IngestError, Result};
use crate::session::ingest::{AppendOutcome, CompletionSummary, IngestSession, SessionParams};
use crate::session::state::SessionState;
use crate::streaming::router::{AudioStreamRouter, RetentionPolicy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Identifiers returned by `Initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub stream_id: StreamId,
}

/// Owns every live [`IngestSession`]. Each session has its own lock, so
/// different sessions are processed independently.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Mutex<IngestSession>>>>,
    router: Arc<AudioStreamRouter>,
    ingest: IngestConfig,
}

impl SessionManager {
    pub fn new(config: &Config) -> Self {
        let router = Arc::new(AudioStreamRouter::new(RetentionPolicy::from(&config.router)));
        Self::with_router(router, config.ingest.clone())
    }

    pub fn with_router(router: Arc<AudioStreamRouter>, ingest: IngestConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            router,
            ingest,
        }
    }

    pub fn router(&self) -> &Arc<AudioStreamRouter> {
        &self.router
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn state(&self, session_id: &str) -> Option<SessionState> {
        let session = self.sessions.lock().get(session_id).cloned()?;
        let state = session.lock().state();
        Some(state)
    }

    fn session(&self, session_id: &str) -> Result<Arc<Mutex<IngestSession>>> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| IngestError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Drops terminated sessions from the registry. Their streams stay in the
    /// router, bounded by `router.ended_streams`, so subscribers can drain them.
    fn release_if_terminal(&self, session_id: &str, state: SessionState) {
        if state.is_terminal() && self.sessions.lock().remove(session_id).is_some() {
            debug!(session_id, %state, "session released");
        }
    }

    pub fn initialize(&self, params: SessionParams) -> Result<SessionHandle> {
        let session = IngestSession::new(params, self.router.clone(), &self.ingest)?;
        let handle = SessionHandle {
            session_id: session.id().to_string(),
            stream_id: session.stream_id().clone(),
        };
        self.sessions
            .lock()
            .insert(handle.session_id.clone(), Arc::new(Mutex::new(session)));
        Ok(handle)
    }

    pub fn append_audio(
        &self,
        session_id: &str,
        index: u32,
        client_offset: f64,
        data: &[u8],
    ) -> Result<AppendOutcome> {
        let session = self.session(session_id)?;
        let mut session = session.lock();
        let result = session.append(index, client_offset, data);
        self.release_if_terminal(session_id, session.state());
        result
    }

    pub fn complete(&self, session_id: &str) -> Result<CompletionSummary> {
        let session = self.session(session_id)?;
        let mut session = session.lock();
        let result = session.complete();
        self.release_if_terminal(session_id, session.state());
        result
    }

    pub fn abort(&self, session_id: &str, reason: &str) -> Result<()> {
        let session = self.session(session_id)?;
        let mut session = session.lock();
        let result = session.abort(reason);
        self.release_if_terminal(session_id, session.state());
        result
    }

    /// Serves one protocol command. Failures become `CommandResponse::Error`.
    pub fn handle(&self, command: IngestCommand) -> CommandResponse {
        match self.dispatch(command) {
            Ok(response) => response,
            Err(e) => e.into(),
        }
    }

    fn dispatch(&self, command: IngestCommand) -> Result<CommandResponse> {
        match command {
            IngestCommand::Initialize {
                audio_format,
                language,
                client_start_time,
            } => {
                let handle = self.initialize(SessionParams {
                    audio_format,
                    language,
                    client_start_time,
                })?;
                Ok(CommandResponse::Initialized {
                    session_id: handle.session_id,
                    stream_id: handle.stream_id,
                })
            }
            IngestCommand::AppendAudio {
                session_id,
                index,
                client_offset,
                data,
            } => {
                let outcome = self.append_audio(&session_id, index, client_offset, &data)?;
                let (parts, duplicate) = match outcome {
                    AppendOutcome::Accepted { parts } => (parts, false),
                    AppendOutcome::Duplicate => (0, true),
                };
                Ok(CommandResponse::Appended {
                    session_id,
                    index,
                    parts,
                    duplicate,
                })
            }
            IngestCommand::Complete { session_id } => {
                let summary = self.complete(&session_id)?;
                Ok(CommandResponse::Completed {
                    session_id,
                    parts: summary.parts,
                    bytes: summary.bytes,
                })
            }
            IngestCommand::Abort { session_id, reason } => {
                self.abort(&session_id, &reason)?;
                Ok(CommandResponse::Aborted { session_id })
            }
        }
    }
}
