//! Fan-out of one session's parts to concurrent subscribers.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use webm_ingest::config::{IngestConfig, RouterConfig};
use webm_ingest::error::{IngestError, ParseError, StreamError};
use webm_ingest::session::{IngestSession, SessionParams, SessionState};
use webm_ingest::streaming::router::{AudioStreamRouter, RetentionPolicy};
use webm_ingest::webm::fixture::{FixtureBlock, WebmStreamBuilder};
use webm_ingest::AudioFormat;

fn session(router: &Arc<AudioStreamRouter>, id: &str) -> IngestSession {
    IngestSession::with_id(
        id.to_string(),
        SessionParams {
            audio_format: AudioFormat::opus(1, 48000),
            ..Default::default()
        },
        router.clone(),
        &IngestConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn early_and_late_subscribers_see_the_same_sequence() {
    let router = Arc::new(AudioStreamRouter::default());
    let mut s = session(&router, "fan");
    let early = s.subscribe(0).unwrap();

    let bytes = WebmStreamBuilder::opus(1).clusters_of(4, 10).build();
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    s.append(0, 0.0, head).unwrap();

    // Joins mid-stream but asks for the full history.
    let late = s.subscribe(0).unwrap();
    // Joins mid-stream and only wants what comes next.
    let live_from = u64::from(s.parts_published());
    let live = s.subscribe(live_from).unwrap();

    let readers = [early, late, live].map(|sub| {
        tokio::spawn(async move {
            sub.into_stream()
                .map(|item| item.map(|part| part.index))
                .collect::<Vec<_>>()
                .await
        })
    });

    s.append(1, 0.5, tail).unwrap();
    s.complete().unwrap();

    let mut results = Vec::new();
    for reader in readers {
        let indices: Vec<u32> = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        results.push(indices);
    }

    let all: Vec<u32> = (0..40).collect();
    assert_eq!(results[0], all);
    assert_eq!(results[1], all);
    assert_eq!(results[2], (live_from as u32..40).collect::<Vec<_>>());
    assert!(live_from > 0 && live_from < 40);
}

#[tokio::test]
async fn slow_reader_falls_behind_without_affecting_others() {
    let config = RouterConfig {
        retention_parts: 5,
        ..Default::default()
    };
    let router = Arc::new(AudioStreamRouter::new(RetentionPolicy::from(&config)));
    let mut s = session(&router, "slow");
    let mut slow = s.subscribe(0).unwrap();
    let mut fast = s.subscribe(0).unwrap();

    let stream = WebmStreamBuilder::opus(1)
        .cluster(0, (0..3).map(|i| FixtureBlock::simple(i * 20, i as u8)).collect())
        .cluster(60, (0..9).map(|i| FixtureBlock::simple(i * 20, 3 + i as u8)).collect())
        .build_indexed();

    // One chunk per block so the fast reader can keep pace.
    let mut cuts: Vec<usize> = stream.block_offsets[1..].to_vec();
    cuts.push(stream.bytes.len());
    let mut start = 0;
    let mut received = Vec::new();
    for (index, cut) in cuts.into_iter().enumerate() {
        s.append(index as u32, 0.0, &stream.bytes[start..cut]).unwrap();
        start = cut;
        while let Some(part) = fast.try_recv().unwrap() {
            received.push(part.index);
        }
    }
    assert_eq!(s.parts_published(), 12);
    assert_eq!(received, (0..12).collect::<Vec<u32>>());

    let err = slow.recv().await.unwrap_err();
    assert_eq!(
        err,
        StreamError::FellBehind {
            requested: 0,
            oldest: 7
        }
    );
    assert_eq!(fast.cursor(), 12);
    assert_eq!(s.state(), SessionState::Appending);
    assert!(s.subscribe(7).is_ok());
}

#[tokio::test]
async fn decreasing_cluster_timecode_aborts_the_stream() {
    let router = Arc::new(AudioStreamRouter::default());
    let mut s = session(&router, "ooo");
    let mut sub = s.subscribe(0).unwrap();

    let bytes = WebmStreamBuilder::opus(1)
        .cluster(1000, vec![FixtureBlock::simple(0, 0), FixtureBlock::simple(20, 1)])
        .cluster(980, vec![FixtureBlock::simple(0, 2)])
        .build();
    let err = s.append(0, 0.0, &bytes).unwrap_err();
    assert!(matches!(
        err,
        IngestError::Parse(ParseError::OutOfOrder {
            previous: 1000,
            current: 980
        })
    ));
    assert_eq!(s.state(), SessionState::Aborted);
    assert_eq!(s.parts_published(), 2);

    assert_eq!(sub.recv().await.unwrap().unwrap().index, 0);
    assert_eq!(sub.recv().await.unwrap().unwrap().index, 1);
    assert!(matches!(
        sub.recv().await,
        Err(StreamError::Aborted { .. })
    ));

    // The session refuses further input and publishes nothing more.
    assert!(s.append(1, 0.0, &bytes).is_err());
    assert!(s.complete().is_err());
    assert_eq!(router.stats(s.stream_id()).unwrap().next, 2);
}

#[tokio::test]
async fn client_abort_reaches_waiting_subscriber() {
    let router = Arc::new(AudioStreamRouter::default());
    let mut s = session(&router, "cancel");
    let mut sub = s.subscribe(0).unwrap();

    let waiter = tokio::spawn(async move { sub.recv().await });
    tokio::task::yield_now().await;
    s.abort("client closed the tab").unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        result.unwrap_err(),
        StreamError::Aborted {
            reason: "client closed the tab".to_string()
        }
    );
    assert_eq!(s.abort_reason(), Some("client closed the tab"));
}
