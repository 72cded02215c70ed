use crate::audio::part::{AudioStreamPart, PartSidecar};
use crate::error::Result;
use crate::storage::PartStore;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryPartStore {
    sessions: Mutex<HashMap<String, BTreeMap<u32, (PartSidecar, Bytes)>>>,
}

impl MemoryPartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total parts across all sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PartStore for MemoryPartStore {
    async fn put(&self, session_id: &str, part: &AudioStreamPart) -> Result<()> {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .insert(part.index, (part.sidecar(), part.data.clone()));
        Ok(())
    }

    async fn get(&self, session_id: &str, index: u32) -> Result<Option<(PartSidecar, Bytes)>> {
        Ok(self
            .sessions
            .lock()
            .get(session_id)
            .and_then(|parts| parts.get(&index))
            .cloned())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<u32>> {
        Ok(self
            .sessions
            .lock()
            .get(session_id)
            .map(|parts| parts.keys().copied().collect())
            .unwrap_or_default())
    }
}
