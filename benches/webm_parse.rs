use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use webm_ingest::audio::part::StreamId;
use webm_ingest::config::IngestConfig;
use webm_ingest::ebml::tree::TreeBuilder;
use webm_ingest::session::{IngestSession, SessionParams};
use webm_ingest::streaming::router::{AudioStreamRouter, RetentionPolicy};
use webm_ingest::webm::fixture::WebmStreamBuilder;
use webm_ingest::{AudioFormat, IngestPipeline};

/// One minute of 20ms Opus packets in 1s clusters.
fn one_minute() -> Vec<u8> {
    WebmStreamBuilder::opus(1).clusters_of(60, 50).build()
}

fn bench_tree(c: &mut Criterion) {
    let bytes = one_minute();
    let mut group = c.benchmark_group("tree_builder");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for chunk_size in [64usize, 1024, 16 * 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut tree = TreeBuilder::default();
                    let mut events = 0;
                    for chunk in bytes.chunks(chunk_size) {
                        events += tree.push(black_box(chunk)).map(|e| e.len()).unwrap_or(0);
                    }
                    black_box(events)
                })
            },
        );
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let bytes = one_minute();
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("parts_4k_chunks", |b| {
        b.iter(|| {
            let mut pipeline = IngestPipeline::new(
                StreamId::from("bench-0000"),
                AudioFormat::opus(1, 48000),
                &IngestConfig::default(),
            );
            let mut parts = 0;
            for chunk in bytes.chunks(4096) {
                parts += pipeline.push(chunk).map(|p| p.len()).unwrap_or(0);
            }
            black_box(parts)
        })
    });
    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let bytes = one_minute();
    let mut group = c.benchmark_group("session");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("append_and_publish", |b| {
        let mut run = 0u64;
        b.iter(|| {
            run += 1;
            let router = Arc::new(AudioStreamRouter::new(RetentionPolicy {
                max_items: 256,
                max_bytes: 1 << 20,
                ..RetentionPolicy::default()
            }));
            let Ok(mut session) = IngestSession::with_id(
                format!("bench-{}", run),
                SessionParams::default(),
                router,
                &IngestConfig::default(),
            ) else {
                return;
            };
            for (index, chunk) in bytes.chunks(4096).enumerate() {
                if session.append(index as u32, 0.0, chunk).is_err() {
                    return;
                }
            }
            black_box(session.complete().map(|s| s.parts).unwrap_or(0));
        })
    });
    group.finish();
}

criterion_group!(benches, bench_tree, bench_pipeline, bench_session);
criterion_main!(benches);
