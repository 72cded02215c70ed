//! Persistence of published parts.
//!
//! A [`PartStore`] receives every part of a finished or live stream keyed by
//! `(session id, index)`. [`persist_stream`] drains a subscription into a store.

pub mod fs;
pub mod memory;

pub use fs::FsPartStore;
pub use memory::MemoryPartStore;

use crate::audio::part::{AudioStreamPart, PartSidecar};
use crate::error::{IngestError, Result};
use crate::streaming::router::Subscription;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

#[async_trait]
pub trait PartStore: Send + Sync {
    /// Stores the payload and sidecar of one part.
    async fn put(&self, session_id: &str, part: &AudioStreamPart) -> Result<()>;

    /// Loads a stored part, or `None` if it was never stored.
    async fn get(&self, session_id: &str, index: u32) -> Result<Option<(PartSidecar, Bytes)>>;

    /// Indices stored for a session, ascending.
    async fn list(&self, session_id: &str) -> Result<Vec<u32>>;
}

/// Outcome of [`persist_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    pub parts: u32,
    pub bytes: u64,
}

/// Copies every part of a subscription into `store` until the stream ends.
///
/// Returns the stream error if the stream was aborted or the reader fell
/// behind; parts received before that are kept in the store.
pub async fn persist_stream<S: PartStore + ?Sized>(
    store: &S,
    session_id: &str,
    mut subscription: Subscription<AudioStreamPart>,
) -> Result<PersistSummary> {
    let mut summary = PersistSummary { parts: 0, bytes: 0 };
    loop {
        match subscription.recv().await {
            Ok(Some(part)) => {
                store.put(session_id, &part).await?;
                summary.parts += 1;
                summary.bytes += part.data.len() as u64;
                debug!(session_id, index = part.index, "part persisted");
            }
            Ok(None) => break,
            Err(e) => return Err(IngestError::Stream(e)),
        }
    }
    info!(
        session_id,
        stream_id = %subscription.stream_id(),
        parts = summary.parts,
        bytes = summary.bytes,
        "stream persisted"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::part::{PartMetadata, StreamId};
    use crate::error::StreamError;
    use crate::streaming::router::AudioStreamRouter;
    use std::sync::Arc;

    fn part(index: u32) -> AudioStreamPart {
        AudioStreamPart {
            index,
            stream_id: StreamId::from("s-0000"),
            data: Bytes::from(vec![0xF8, index as u8]),
            source_offset: 0,
            offset: f64::from(index) * 0.02,
            duration: 0.02,
            discontinuity: None,
            metadata: PartMetadata::new(),
        }
    }

    #[tokio::test]
    async fn test_persist_stream_until_close() {
        let router = Arc::new(AudioStreamRouter::default());
        let id = StreamId::from("s-0000");
        router.open(id.clone());
        let sub = router.subscribe(&id, 0).unwrap();
        let store = MemoryPartStore::new();

        let writer = {
            let router = router.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for i in 0..3 {
                    router.publish(&id, part(i)).unwrap();
                    tokio::task::yield_now().await;
                }
                router.close(&id).unwrap();
            })
        };

        let summary = persist_stream(&store, "s", sub).await.unwrap();
        writer.await.unwrap();
        assert_eq!(summary, PersistSummary { parts: 3, bytes: 6 });
        assert_eq!(store.list("s").await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_persist_stream_reports_abort() {
        let router = AudioStreamRouter::default();
        let id = StreamId::from("s-0000");
        router.open(id.clone());
        let sub = router.subscribe(&id, 0).unwrap();
        router.publish(&id, part(0)).unwrap();
        router.fail(&id, "corrupt").unwrap();

        let store = MemoryPartStore::new();
        let result = persist_stream(&store, "s", sub).await;
        assert!(matches!(
            result,
            Err(IngestError::Stream(StreamError::Aborted { .. }))
        ));
        assert_eq!(store.list("s").await.unwrap(), vec![0]);
    }
}
