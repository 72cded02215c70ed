//! Directory-backed part store.
//!
//! Layout: `<root>/<session id>/<index:08>.opus` holds the raw packet and a
//! `.json` file next to it holds the [`PartSidecar`].

use crate::audio::part::{AudioStreamPart, PartSidecar};
use crate::defaults;
use crate::error::{IngestError, Result};
use crate::storage::PartStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct FsPartStore {
    root: PathBuf,
}

impl FsPartStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        if session_id.is_empty()
            || session_id.contains(['/', '\\'])
            || session_id.starts_with('.')
        {
            return Err(IngestError::Other(format!(
                "invalid session id for storage: {:?}",
                session_id
            )));
        }
        Ok(self.root.join(session_id))
    }

    fn payload_path(dir: &Path, index: u32) -> PathBuf {
        dir.join(format!("{:08}.{}", index, defaults::PART_EXTENSION))
    }

    fn sidecar_path(dir: &Path, index: u32) -> PathBuf {
        dir.join(format!("{:08}.json", index))
    }
}

#[async_trait]
impl PartStore for FsPartStore {
    async fn put(&self, session_id: &str, part: &AudioStreamPart) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir).await?;
        fs::write(Self::payload_path(&dir, part.index), &part.data).await?;
        let sidecar = serde_json::to_vec_pretty(&part.sidecar())?;
        fs::write(Self::sidecar_path(&dir, part.index), sidecar).await?;
        Ok(())
    }

    async fn get(&self, session_id: &str, index: u32) -> Result<Option<(PartSidecar, Bytes)>> {
        let dir = self.session_dir(session_id)?;
        let sidecar = match fs::read(Self::sidecar_path(&dir, index)).await {
            Ok(raw) => serde_json::from_slice::<PartSidecar>(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let data = fs::read(Self::payload_path(&dir, index)).await?;
        if data.len() != sidecar.length {
            return Err(IngestError::Other(format!(
                "part {} of {} is {} bytes, sidecar says {}",
                index,
                session_id,
                data.len(),
                sidecar.length
            )));
        }
        Ok(Some((sidecar, Bytes::from(data))))
    }

    async fn list(&self, session_id: &str) -> Result<Vec<u32>> {
        let dir = self.session_dir(session_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut indices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(index) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::part::{Discontinuity, PartMetadata, StreamId};
    use tempfile::TempDir;

    fn part(index: u32) -> AudioStreamPart {
        let mut metadata = PartMetadata::new();
        metadata.insert("cluster_timecode", 0);
        AudioStreamPart {
            index,
            stream_id: StreamId::from("rec-0000"),
            data: Bytes::from(vec![0xF8; 10 + index as usize]),
            source_offset: 0,
            offset: f64::from(index) * 0.02,
            duration: 0.02,
            discontinuity: None,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_put_writes_payload_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let store = FsPartStore::new(dir.path());
        store.put("rec", &part(7)).await.unwrap();

        let payload = dir.path().join("rec").join("00000007.opus");
        let sidecar = dir.path().join("rec").join("00000007.json");
        assert_eq!(std::fs::read(&payload).unwrap().len(), 17);
        let json = std::fs::read_to_string(&sidecar).unwrap();
        assert!(json.contains("\"stream_id\": \"rec-0000\""));
        assert!(json.contains("cluster_timecode"));
    }

    #[tokio::test]
    async fn test_get_roundtrips_sidecar() {
        let dir = TempDir::new().unwrap();
        let store = FsPartStore::new(dir.path());
        let mut original = part(2);
        original.discontinuity = Some(Discontinuity {
            expected: 0.04,
            actual: 0.1,
        });
        store.put("rec", &original).await.unwrap();

        let (sidecar, data) = store.get("rec", 2).await.unwrap().unwrap();
        assert_eq!(sidecar, original.sidecar());
        assert_eq!(data, original.data);
        assert!(store.get("rec", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let store = FsPartStore::new(dir.path());
        for index in [10, 0, 2] {
            store.put("rec", &part(index)).await.unwrap();
        }
        std::fs::write(dir.path().join("rec").join("notes.json"), "{}").unwrap();

        assert_eq!(store.list("rec").await.unwrap(), vec![0, 2, 10]);
        assert!(store.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FsPartStore::new(dir.path());
        store.put("rec", &part(0)).await.unwrap();
        std::fs::write(dir.path().join("rec").join("00000000.opus"), [0xF8]).unwrap();
        assert!(store.get("rec", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_like_session_ids() {
        let dir = TempDir::new().unwrap();
        let store = FsPartStore::new(dir.path());
        assert!(store.put("../escape", &part(0)).await.is_err());
        assert!(store.put("", &part(0)).await.is_err());
        assert!(store.list(".hidden").await.is_err());
    }
}
