use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webm_ingest::audio::format::AudioFormat;
use webm_ingest::audio::part::{AudioStreamPart, StreamId};
use webm_ingest::cli::{Cli, Commands, log_directive};
use webm_ingest::config::Config;
use webm_ingest::session::{SessionManager, SessionParams};
use webm_ingest::storage::{FsPartStore, PersistSummary, persist_stream};
use webm_ingest::streaming::router::Subscription;
use webm_ingest::{IngestPipeline, version_string};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);
    let config = load_config(cli.config.as_deref())?;
    info!(version = %version_string(), "webm-ingest starting");

    match cli.command {
        Commands::Inspect {
            file,
            channels,
            parts,
        } => inspect(&config, &file, channels, parts, cli.quiet),
        Commands::Replay {
            file,
            chunk_size,
            channels,
            sample_rate,
            store,
        } => {
            let store_root = store.or_else(|| config.storage.root.clone());
            replay(
                config,
                &file,
                chunk_size,
                AudioFormat::opus(channels, sample_rate),
                store_root.as_deref(),
                cli.quiet,
            )
            .await
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(quiet: bool, verbose: u8) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_directive(quiet, verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else if let Some(default_path) = Config::default_path() {
        Config::load_or_default(&default_path)?
    } else {
        Config::default()
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn inspect(
    config: &Config,
    file: &Path,
    channels: u16,
    print_parts: bool,
    quiet: bool,
) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let stream_id = StreamId::from(
        file.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("inspect"),
    );
    let mut pipeline = IngestPipeline::new(
        stream_id,
        AudioFormat::opus(channels, webm_ingest::defaults::SAMPLE_RATE),
        &config.ingest,
    );

    let mut parts = pipeline.push(&bytes)?;
    parts.extend(pipeline.finish()?);

    println!("{}", serde_json::to_string_pretty(pipeline.document())?);
    if print_parts {
        for part in &parts {
            println!("{}", serde_json::to_string(&part.sidecar())?);
        }
    }
    if !quiet {
        print_summary(&parts);
    }
    Ok(())
}

fn print_summary(parts: &[AudioStreamPart]) {
    let bytes: usize = parts.iter().map(|p| p.data.len()).sum();
    let duration = parts.last().map(AudioStreamPart::end).unwrap_or(0.0);
    let gaps = parts.iter().filter(|p| p.discontinuity.is_some()).count();
    eprintln!(
        "{} parts, {} bytes, {:.3}s, {} discontinuities",
        parts.len(),
        bytes,
        duration,
        gaps
    );
}

async fn replay(
    config: Config,
    file: &Path,
    chunk_size: usize,
    audio_format: AudioFormat,
    store_root: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let manager = SessionManager::new(&config);
    let handle = manager.initialize(SessionParams {
        audio_format,
        language: None,
        client_start_time: Some(chrono::Utc::now()),
    })?;
    let subscription = manager.router().subscribe(&handle.stream_id, 0)?;
    info!(session_id = %handle.session_id, stream_id = %handle.stream_id, "replay session started");

    let consumer = {
        let session_id = handle.session_id.clone();
        let store = store_root.map(FsPartStore::new);
        tokio::spawn(async move {
            match store {
                Some(store) => persist_stream(&store, &session_id, subscription).await,
                None => drain(subscription).await,
            }
        })
    };

    let started = Instant::now();
    for (index, chunk) in bytes.chunks(chunk_size).enumerate() {
        let index = u32::try_from(index).context("too many chunks")?;
        let client_offset = started.elapsed().as_secs_f64();
        if let Err(e) = manager.append_audio(&handle.session_id, index, client_offset, chunk) {
            warn!(error = %e, chunk = index, "replay aborted");
            if let Ok(Err(stream_error)) = consumer.await {
                warn!(error = %stream_error, "consumer stopped");
            }
            bail!("session {} aborted: {}", handle.session_id, e);
        }
    }
    let completion = manager.complete(&handle.session_id)?;
    let persisted = consumer.await.context("consumer task panicked")??;

    if !quiet {
        eprintln!(
            "session {}: {} chunks, {} parts, {} bytes",
            handle.session_id,
            completion.chunks,
            completion.parts,
            completion.bytes
        );
        if let Some(root) = store_root {
            eprintln!(
                "stored {} parts under {}",
                persisted.parts,
                root.join(&handle.session_id).display()
            );
        }
    }
    manager.router().remove(&handle.stream_id);
    Ok(())
}

async fn drain(
    mut subscription: Subscription<AudioStreamPart>,
) -> webm_ingest::Result<PersistSummary> {
    let mut summary = PersistSummary { parts: 0, bytes: 0 };
    while let Some(part) = subscription.recv().await? {
        println!(
            "{:>6}  {:>10.3}s  {:>6.3}s  {:>5} bytes",
            part.index,
            part.offset,
            part.duration,
            part.data.len()
        );
        summary.parts += 1;
        summary.bytes += part.data.len() as u64;
    }
    Ok(summary)
}
