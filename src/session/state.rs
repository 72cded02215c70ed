use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one recording session.
///
/// ```text
/// Created ──▶ Appending ──▶ Completing ──▶ Completed
///    │            │
///    └────────────┴──────▶ Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Appending,
    Completing,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn accepts_audio(self) -> bool {
        matches!(self, SessionState::Created | SessionState::Appending)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Appending)
                | (Created, Completing)
                | (Appending, Completing)
                | (Completing, Completed)
                | (Created, Aborted)
                | (Appending, Aborted)
                | (Completing, Aborted)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "Created",
            SessionState::Appending => "Appending",
            SessionState::Completing => "Completing",
            SessionState::Completed => "Completed",
            SessionState::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// One accepted client chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub index: u32,
    /// Client-reported position of the chunk in the recording, in seconds.
    pub client_offset: f64,
    pub length: usize,
    /// Absolute byte offset of the chunk's first byte in the WebM stream.
    pub stream_offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_created_and_appending_accept_audio() {
        assert!(SessionState::Created.accepts_audio());
        assert!(SessionState::Appending.accepts_audio());
        assert!(!SessionState::Completing.accepts_audio());
        assert!(!SessionState::Completed.accepts_audio());
        assert!(!SessionState::Aborted.accepts_audio());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [SessionState::Completed, SessionState::Aborted] {
            assert!(from.is_terminal());
            for to in [
                SessionState::Created,
                SessionState::Appending,
                SessionState::Completing,
                SessionState::Completed,
                SessionState::Aborted,
            ] {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_no_going_back() {
        assert!(!SessionState::Appending.can_transition_to(SessionState::Created));
        assert!(!SessionState::Completing.can_transition_to(SessionState::Appending));
        assert!(SessionState::Created.can_transition_to(SessionState::Appending));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Completing).unwrap(),
            r#""completing""#
        );
    }
}
