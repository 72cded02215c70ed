//! Audio format negotiated by the client at session start.

use crate::defaults;
use crate::error::ParseError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_codec() -> String {
    defaults::CODEC.to_string()
}

fn default_channels() -> u16 {
    defaults::CHANNELS
}

fn default_sample_rate() -> u32 {
    defaults::SAMPLE_RATE
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            channels: default_channels(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl AudioFormat {
    pub fn opus(channels: u16, sample_rate: u32) -> Self {
        Self {
            codec: default_codec(),
            channels,
            sample_rate,
        }
    }

    /// Checks that the format is something the pipeline can ingest.
    pub fn validate(&self) -> Result<(), ParseError> {
        if !self.codec.eq_ignore_ascii_case(defaults::CODEC) {
            return Err(ParseError::UnsupportedCodec {
                expected: defaults::CODEC.to_string(),
                actual: self.codec.clone(),
            });
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(ParseError::UnsupportedTrack {
                track: 0,
                reason: format!("{} channels requested, only mono and stereo", self.channels),
            });
        }
        if self.sample_rate == 0 {
            return Err(ParseError::UnsupportedTrack {
                track: 0,
                reason: "sample rate of zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let format: AudioFormat = serde_json::from_str(r#"{"sample_rate":16000}"#).unwrap();
        assert_eq!(format, AudioFormat::opus(1, 16000));
        assert!(format.validate().is_ok());
    }

    #[test]
    fn test_rejects_other_codecs() {
        let format = AudioFormat {
            codec: "vorbis".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            format.validate(),
            Err(ParseError::UnsupportedCodec { .. })
        ));
        assert!(AudioFormat::opus(0, 48000).validate().is_err());
        assert!(AudioFormat::opus(1, 0).validate().is_err());
        assert!(
            AudioFormat {
                codec: "OPUS".to_string(),
                ..Default::default()
            }
            .validate()
            .is_ok()
        );
    }
}
