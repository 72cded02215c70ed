//! Command-line interface for webm-ingest
//!
//! Provides argument parsing using clap derive macros.

use crate::defaults;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental WebM/Opus ingestion
#[derive(Parser, Debug)]
#[command(name = "webm-ingest", version, about = "Incremental WebM/Opus ingestion")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a WebM file and print its document model and parts
    Inspect {
        /// WebM file to read
        file: PathBuf,

        /// Expected channel count of the Opus track
        #[arg(long, default_value_t = defaults::CHANNELS)]
        channels: u16,

        /// Print every part, not only the summary
        #[arg(long)]
        parts: bool,
    },

    /// Run a full ingest session over a file delivered in chunks
    Replay {
        /// WebM file to read
        file: PathBuf,

        /// Bytes per appended chunk
        #[arg(long, short = 'c', value_name = "BYTES", default_value_t = defaults::REPLAY_CHUNK_SIZE, value_parser = parse_chunk_size)]
        chunk_size: usize,

        /// Expected channel count of the Opus track
        #[arg(long, default_value_t = defaults::CHANNELS)]
        channels: u16,

        /// Declared sample rate of the recording
        #[arg(long, default_value_t = defaults::SAMPLE_RATE)]
        sample_rate: u32,

        /// Persist parts under this directory
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,
    },
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("chunk size must be at least 1 byte".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Log filter directive for the given verbosity flags.
pub fn log_directive(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["webm-ingest", "inspect", "rec.webm"]).unwrap();
        match cli.command {
            Commands::Inspect {
                file,
                channels,
                parts,
            } => {
                assert_eq!(file, PathBuf::from("rec.webm"));
                assert_eq!(channels, 1);
                assert!(!parts);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_replay_defaults() {
        let cli = Cli::try_parse_from(["webm-ingest", "replay", "rec.webm"]).unwrap();
        match cli.command {
            Commands::Replay {
                chunk_size,
                channels,
                sample_rate,
                store,
                ..
            } => {
                assert_eq!(chunk_size, 4096);
                assert_eq!(channels, 1);
                assert_eq!(sample_rate, 48000);
                assert!(store.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_replay_options() {
        let cli = Cli::try_parse_from([
            "webm-ingest",
            "replay",
            "rec.webm",
            "-c",
            "17",
            "--store",
            "/tmp/parts",
            "--config",
            "/etc/ingest.toml",
            "-vv",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay {
                chunk_size, store, ..
            } => {
                assert_eq!(chunk_size, 17);
                assert_eq!(store, Some(PathBuf::from("/tmp/parts")));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ingest.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(Cli::try_parse_from(["webm-ingest", "replay", "a.webm", "-c", "0"]).is_err());
        assert!(Cli::try_parse_from(["webm-ingest", "replay", "a.webm", "-c", "x"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["webm-ingest"]).is_err());
    }

    #[test]
    fn test_log_directive() {
        assert_eq!(log_directive(false, 0), "info");
        assert_eq!(log_directive(false, 1), "debug");
        assert_eq!(log_directive(false, 5), "trace");
        assert_eq!(log_directive(true, 2), "warn");
    }
}
