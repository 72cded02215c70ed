//! webm-ingest - incremental WebM/Opus ingestion
//!
//! Parses live WebM byte chunks, cuts the Opus track into timed parts and
//! fans them out to any number of subscribers.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod command;
pub mod config;
pub mod defaults;
pub mod ebml;
pub mod error;
pub mod session;
pub mod storage;
pub mod streaming;
pub mod webm;

// Container parsing
pub use ebml::document::MatroskaDocument;
pub use ebml::tree::{ParseEvent, TreeBuilder};
pub use webm::{Block, Lacing};

// Parts
pub use audio::format::AudioFormat;
pub use audio::part::{AudioStreamPart, Discontinuity, PartMetadata, StreamId};
pub use audio::pipeline::IngestPipeline;

// Fan-out
pub use streaming::router::{AudioStreamRouter, RetentionPolicy, StreamRouter, Subscription};

// Sessions and protocol
pub use command::{CommandResponse, IngestCommand};
pub use session::{IngestSession, SessionManager, SessionState};

// Persistence
pub use storage::{FsPartStore, MemoryPartStore, PartStore, persist_stream};

// Error handling
pub use error::{IngestError, ParseError, Result, StreamError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_suffix_only_with_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "unexpected hash in {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
