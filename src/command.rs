//! JSON command protocol between the transport layer and the session manager.

use crate::audio::format::AudioFormat;
use crate::audio::part::StreamId;
use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commands received from the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestCommand {
    /// Start a recording session
    Initialize {
        audio_format: AudioFormat,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        client_start_time: Option<DateTime<Utc>>,
    },
    /// Deliver the next chunk of WebM bytes
    AppendAudio {
        session_id: String,
        index: u32,
        #[serde(default)]
        client_offset: f64,
        /// Raw bytes, base64 encoded on the wire
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Flush and close the session
    Complete { session_id: String },
    /// Cancel the session
    Abort { session_id: String, reason: String },
}

impl IngestCommand {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            IngestCommand::Initialize { .. } => None,
            IngestCommand::AppendAudio { session_id, .. }
            | IngestCommand::Complete { session_id }
            | IngestCommand::Abort { session_id, .. } => Some(session_id),
        }
    }
}

/// Responses sent back to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResponse {
    /// Session created
    Initialized {
        session_id: String,
        stream_id: StreamId,
    },
    /// Chunk handled; `duplicate` chunks were ignored
    Appended {
        session_id: String,
        index: u32,
        parts: usize,
        duplicate: bool,
    },
    /// Session flushed and closed
    Completed {
        session_id: String,
        parts: u32,
        bytes: u64,
    },
    /// Session cancelled
    Aborted { session_id: String },
    /// Command failed
    Error { code: String, message: String },
}

impl CommandResponse {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CommandResponse::Error { .. })
    }
}

impl From<IngestError> for CommandResponse {
    fn from(error: IngestError) -> Self {
        CommandResponse::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T: AsRef<[u8]>, S: Serializer>(data: &T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(data.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    #[test]
    fn test_append_audio_json_format() {
        let cmd = IngestCommand::AppendAudio {
            session_id: "abc".to_string(),
            index: 2,
            client_offset: 1.5,
            data: vec![0x1A, 0x45, 0xDF, 0xA3],
        };
        let json = cmd.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"append_audio","session_id":"abc","index":2,"client_offset":1.5,"data":"GkXfow=="}"#
        );
        assert_eq!(IngestCommand::from_json(&json).unwrap(), cmd);
    }

    #[test]
    fn test_initialize_accepts_minimal_format() {
        let json = r#"{"type":"initialize","audio_format":{"channels":1,"sample_rate":16000}}"#;
        match IngestCommand::from_json(json).unwrap() {
            IngestCommand::Initialize {
                audio_format,
                language,
                client_start_time,
            } => {
                assert_eq!(audio_format, AudioFormat::opus(1, 16000));
                assert_eq!(language, None);
                assert_eq!(client_start_time, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_initialize_parses_client_start_time() {
        let json = r#"{"type":"initialize","audio_format":{},"language":"de","client_start_time":"2026-03-01T10:00:00Z"}"#;
        let cmd = IngestCommand::from_json(json).unwrap();
        assert_eq!(cmd.session_id(), None);
        match cmd {
            IngestCommand::Initialize {
                client_start_time, ..
            } => assert_eq!(
                client_start_time.unwrap().to_rfc3339(),
                "2026-03-01T10:00:00+00:00"
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let json = r#"{"type":"append_audio","session_id":"a","index":0,"data":"***"}"#;
        assert!(IngestCommand::from_json(json).is_err());
    }

    #[test]
    fn test_invalid_json_returns_error() {
        assert!(IngestCommand::from_json(r#"{"type": "unknown_command"}"#).is_err());
        assert!(IngestCommand::from_json(r#"{"session_id": "x"}"#).is_err());
        assert!(IngestCommand::from_json("not json at all").is_err());
    }

    #[test]
    fn test_error_response_from_ingest_error() {
        let response: CommandResponse = IngestError::from(ParseError::malformed("bad size")).into();
        assert!(response.is_error());
        assert_eq!(
            response.to_json().unwrap(),
            r#"{"type":"error","code":"malformed","message":"Malformed input: bad size"}"#
        );
    }

    #[test]
    fn test_response_roundtrip() {
        let responses = vec![
            CommandResponse::Initialized {
                session_id: "s".to_string(),
                stream_id: StreamId::for_session("s", 0),
            },
            CommandResponse::Appended {
                session_id: "s".to_string(),
                index: 0,
                parts: 3,
                duplicate: false,
            },
            CommandResponse::Completed {
                session_id: "s".to_string(),
                parts: 3,
                bytes: 900,
            },
            CommandResponse::Aborted {
                session_id: "s".to_string(),
            },
        ];
        for response in responses {
            let json = response.to_json().unwrap();
            assert_eq!(CommandResponse::from_json(&json).unwrap(), response);
        }
    }
}
