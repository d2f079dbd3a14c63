use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use super::{expected_chunk_len, total_chunks};
use crate::dtos::MediaCollection;

/// Every hour on the hour (sec min hour day month weekday).
const PURGE_UPLOADS_AT: &str = "0 0 * * * *";
const STALE_AFTER_HOURS: i64 = 24;

/// Session metadata, persisted as `meta.json` next to the chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadMeta {
    pub user_id: Uuid,
    pub property_id: i64,
    pub collection: MediaCollection,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ChunkError {
    IndexOutOfRange { index: u64, total: u64 },
    WrongLength { expected: u64, actual: u64 },
    Incomplete(Vec<u64>),
    Io(std::io::Error),
    Corrupt(serde_json::Error),
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkError::IndexOutOfRange { index, total } => {
                write!(f, "Chunk {} is out of range, upload has {} chunks", index, total)
            }
            ChunkError::WrongLength { expected, actual } => {
                write!(f, "Chunk must be {} bytes, got {}", expected, actual)
            }
            ChunkError::Incomplete(missing) => write!(f, "Missing chunks: {:?}", missing),
            ChunkError::Io(e) => write!(f, "Chunk storage error: {}", e),
            ChunkError::Corrupt(e) => write!(f, "Upload metadata is unreadable: {}", e),
        }
    }
}

impl std::error::Error for ChunkError {}

impl From<std::io::Error> for ChunkError {
    fn from(e: std::io::Error) -> Self {
        ChunkError::Io(e)
    }
}

impl From<serde_json::Error> for ChunkError {
    fn from(e: serde_json::Error) -> Self {
        ChunkError::Corrupt(e)
    }
}

/// On-disk layout: `{root}/{upload_id}/meta.json` and
/// `{root}/{upload_id}/{index}.part`.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
    chunk_size: u64,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>, chunk_size: u64) -> Self {
        Self {
            root: root.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn dir(&self, upload_id: Uuid) -> PathBuf {
        self.root.join(upload_id.to_string())
    }

    fn part(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("{}.part", index))
    }

    /// Opens a new session and returns its id with the stored metadata.
    pub async fn init(
        &self,
        user_id: Uuid,
        property_id: i64,
        collection: MediaCollection,
        file_name: String,
        mime_type: String,
        size: u64,
    ) -> Result<(Uuid, UploadMeta), ChunkError> {
        let upload_id = Uuid::new_v4();
        let meta = UploadMeta {
            user_id,
            property_id,
            collection,
            file_name,
            mime_type,
            size,
            chunk_size: self.chunk_size,
            total_chunks: total_chunks(size, self.chunk_size),
            created_at: Utc::now(),
        };
        let dir = self.dir(upload_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("meta.json"), serde_json::to_vec(&meta)?).await?;
        tracing::debug!(%upload_id, total_chunks = meta.total_chunks, "Upload session opened");
        Ok((upload_id, meta))
    }

    /// `None` when the session does not exist.
    pub async fn load(&self, upload_id: Uuid) -> Result<Option<UploadMeta>, ChunkError> {
        match tokio::fs::read(self.dir(upload_id).join("meta.json")).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores one chunk, overwriting an earlier attempt at the same index.
    /// Returns how many chunks have been received so far.
    pub async fn put_chunk(
        &self,
        upload_id: Uuid,
        meta: &UploadMeta,
        index: u64,
        bytes: &[u8],
    ) -> Result<u64, ChunkError> {
        let expected = expected_chunk_len(meta.size, meta.chunk_size, index).ok_or(
            ChunkError::IndexOutOfRange {
                index,
                total: meta.total_chunks,
            },
        )?;
        if bytes.len() as u64 != expected {
            return Err(ChunkError::WrongLength {
                expected,
                actual: bytes.len() as u64,
            });
        }

        let dir = self.dir(upload_id);
        let tmp = dir.join(format!("{}.tmp", index));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, Self::part(&dir, index)).await?;

        Ok(meta.total_chunks - self.missing(upload_id, meta).await?.len() as u64)
    }

    pub async fn missing(&self, upload_id: Uuid, meta: &UploadMeta) -> Result<Vec<u64>, ChunkError> {
        let dir = self.dir(upload_id);
        let mut missing = Vec::new();
        for index in 0..meta.total_chunks {
            if !tokio::fs::try_exists(Self::part(&dir, index)).await? {
                missing.push(index);
            }
        }
        Ok(missing)
    }

    /// Concatenates every chunk in order. Fails with the missing indexes
    /// if any chunk has not arrived.
    pub async fn assemble(&self, upload_id: Uuid, meta: &UploadMeta) -> Result<Vec<u8>, ChunkError> {
        let missing = self.missing(upload_id, meta).await?;
        if !missing.is_empty() {
            return Err(ChunkError::Incomplete(missing));
        }
        let dir = self.dir(upload_id);
        let mut out = Vec::with_capacity(meta.size as usize);
        for index in 0..meta.total_chunks {
            out.extend(tokio::fs::read(Self::part(&dir, index)).await?);
        }
        Ok(out)
    }

    pub async fn discard(&self, upload_id: Uuid) {
        if let Err(e) = tokio::fs::remove_dir_all(self.dir(upload_id)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%upload_id, "Failed to discard upload session: {}", e);
            }
        }
    }

    /// Removes sessions opened more than `max_age` ago.
    pub async fn purge_stale(&self, max_age: chrono::Duration) -> Result<usize, ChunkError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let cutoff = Utc::now() - max_age;
        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(upload_id) = entry.file_name().to_string_lossy().parse::<Uuid>() else {
                continue;
            };
            let stale = match self.load(upload_id).await {
                Ok(Some(meta)) => meta.created_at < cutoff,
                // Orphaned or unreadable sessions are removed too
                Ok(None) | Err(_) => true,
            };
            if stale {
                self.discard(upload_id).await;
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Hourly job that drops sessions left unfinished for a day.
    pub async fn schedule_purge(&self, sched: &JobScheduler) -> Result<(), JobSchedulerError> {
        let store = self.clone();
        let job = Job::new_async(PURGE_UPLOADS_AT, move |uuid, _l| {
            let store = store.clone();
            Box::pin(async move {
                match store.purge_stale(chrono::Duration::hours(STALE_AFTER_HOURS)).await {
                    Ok(purged) => tracing::info!(%uuid, purged, "Stale uploads purged"),
                    Err(e) => tracing::error!(%uuid, "Purging stale uploads failed: {}", e),
                }
            })
        })?;
        sched.add(job).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(chunk_size: u64) -> (ChunkStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("chunk-store-{}", Uuid::new_v4()));
        (ChunkStore::new(root.clone(), chunk_size), root)
    }

    async fn open(store: &ChunkStore, size: u64) -> (Uuid, UploadMeta) {
        store
            .init(
                Uuid::new_v4(),
                1,
                MediaCollection::Images,
                "a.jpg".into(),
                "image/jpeg".into(),
                size,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn chunks_assemble_in_order() {
        let (store, root) = temp_store(4);
        let (id, meta) = open(&store, 10).await;
        assert_eq!(meta.total_chunks, 3);
        assert_eq!(store.load(id).await.unwrap(), Some(meta.clone()));

        assert_eq!(store.put_chunk(id, &meta, 2, b"ij").await.unwrap(), 1);
        assert_eq!(store.put_chunk(id, &meta, 0, b"abcd").await.unwrap(), 2);

        match store.assemble(id, &meta).await {
            Err(ChunkError::Incomplete(missing)) => assert_eq!(missing, vec![1]),
            other => panic!("expected incomplete, got {:?}", other.map(|b| b.len())),
        }

        assert_eq!(store.put_chunk(id, &meta, 1, b"efgh").await.unwrap(), 3);
        assert_eq!(store.assemble(id, &meta).await.unwrap(), b"abcdefghij");

        store.discard(id).await;
        assert_eq!(store.load(id).await.unwrap(), None);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn rejects_bad_index_and_length() {
        let (store, root) = temp_store(4);
        let (id, meta) = open(&store, 10).await;

        assert!(matches!(
            store.put_chunk(id, &meta, 3, b"x").await,
            Err(ChunkError::IndexOutOfRange { index: 3, total: 3 })
        ));
        assert!(matches!(
            store.put_chunk(id, &meta, 0, b"abc").await,
            Err(ChunkError::WrongLength { expected: 4, actual: 3 })
        ));
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn purge_removes_old_sessions() {
        let (store, root) = temp_store(4);
        let (id, _) = open(&store, 4).await;

        assert_eq!(store.purge_stale(chrono::Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(store.purge_stale(chrono::Duration::seconds(-1)).await.unwrap(), 1);
        assert_eq!(store.load(id).await.unwrap(), None);
        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
