//! Recording sessions: the append/complete contract and its state machine.

pub mod ingest;
pub mod manager;
pub mod state;

pub use ingest::{AppendOutcome, CompletionSummary, IngestSession, SessionParams};
pub use manager::{SessionHandle, SessionManager};
pub use state::{ChunkRecord, SessionState};
