use crate::defaults;
use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub router: RouterConfig,
    pub storage: StorageConfig,
}

/// Parser and assembler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Frame duration used when neither the track nor the packet states one.
    pub frame_duration_ms: u32,
    /// Allowed offset drift before a part is marked discontinuous.
    pub discontinuity_tolerance_ms: u32,
    /// Largest single element buffered by the parser.
    pub max_element_bytes: usize,
}

/// Retention window of every published stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub retention_parts: usize,
    pub retention_bytes: usize,
    /// Finished streams kept for late subscribers before the oldest is dropped.
    pub ended_streams: usize,
}

/// Persistence of finished parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for persisted parts; `None` disables persistence.
    pub root: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: defaults::FRAME_DURATION_MS,
            discontinuity_tolerance_ms: defaults::DISCONTINUITY_TOLERANCE_MS,
            max_element_bytes: defaults::MAX_ELEMENT_BYTES,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retention_parts: defaults::RETENTION_PARTS,
            retention_bytes: defaults::RETENTION_BYTES,
            ended_streams: defaults::ENDED_STREAMS,
        }
    }
}

impl IngestConfig {
    pub fn frame_duration_secs(&self) -> f64 {
        f64::from(self.frame_duration_ms) / 1000.0
    }

    pub fn discontinuity_tolerance_secs(&self) -> f64 {
        f64::from(self.discontinuity_tolerance_ms) / 1000.0
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(IngestError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - WEBM_INGEST_STORAGE_ROOT → storage.root
    /// - WEBM_INGEST_RETENTION_PARTS → router.retention_parts
    /// - WEBM_INGEST_FRAME_MS → ingest.frame_duration_ms
    ///
    /// Values that are empty or fail to parse are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("WEBM_INGEST_STORAGE_ROOT")
            && !root.is_empty()
        {
            self.storage.root = Some(PathBuf::from(root));
        }

        if let Ok(parts) = std::env::var("WEBM_INGEST_RETENTION_PARTS")
            && let Ok(parts) = parts.parse()
        {
            self.router.retention_parts = parts;
        }

        if let Ok(ms) = std::env::var("WEBM_INGEST_FRAME_MS")
            && let Ok(ms) = ms.parse()
        {
            self.ingest.frame_duration_ms = ms;
        }

        self
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| {
            Err(IngestError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.ingest.frame_duration_ms == 0 || self.ingest.frame_duration_ms > 120 {
            return invalid(
                "ingest.frame_duration_ms",
                "must be between 1 and 120 (Opus packet limit)",
            );
        }
        if self.ingest.max_element_bytes < 1024 {
            return invalid("ingest.max_element_bytes", "must be at least 1024");
        }
        if self.router.retention_parts == 0 {
            return invalid("router.retention_parts", "must be at least 1");
        }
        if self.router.retention_bytes == 0 {
            return invalid("router.retention_bytes", "must be at least 1");
        }
        if self.router.ended_streams == 0 {
            return invalid("router.ended_streams", "must be at least 1");
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/webm-ingest/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("webm-ingest").join("config.toml"))
    }
}
