//! Lazily read `index.tfi`

use super::{ArchiveFileRecord, GameBlob, archive_ordinal, parse_index};
use crate::{ARCHIVE_EXTENSION, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::debug;
use trovekit_formats::hash::content_hash;

/// One `index.tfi` file
///
/// Nothing is read until an accessor is awaited. Raw bytes, the record list
/// and the content hash are each computed once and cached until
/// [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct GameIndex {
    path: PathBuf,
    directory: PathBuf,
    raw: OnceCell<Arc<[u8]>>,
    hash: OnceCell<String>,
    records: OnceCell<Vec<ArchiveFileRecord>>,
}

impl GameIndex {
    /// Bind to an index file without reading it
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            path,
            directory,
            raw: OnceCell::new(),
            hash: OnceCell::new(),
            records: OnceCell::new(),
        }
    }

    /// Path of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the index and its archives
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn shared_content(&self) -> Result<&Arc<[u8]>> {
        self.raw
            .get_or_try_init(|| async {
                debug!("Reading index {}", self.path.display());
                let data = fs::read(&self.path).await?;
                Ok(Arc::from(data))
            })
            .await
    }

    /// Raw bytes of the index
    pub async fn content(&self) -> Result<&[u8]> {
        self.shared_content().await.map(|data| &**data)
    }

    /// Lowercase hex MD5 of the raw bytes
    pub async fn content_hash(&self) -> Result<&str> {
        let hash = self
            .hash
            .get_or_try_init(|| async {
                let data = Arc::clone(self.shared_content().await?);
                Ok::<_, crate::StorageError>(
                    tokio::task::spawn_blocking(move || content_hash(&data)).await?,
                )
            })
            .await?;
        Ok(hash)
    }

    /// Every record in the index
    pub async fn files_list(&self) -> Result<&[ArchiveFileRecord]> {
        let records = self
            .records
            .get_or_try_init(|| async {
                let data = self.shared_content().await?;
                let records = parse_index(data, &self.path, &self.directory)?;
                debug!(
                    "Decoded {} records from {}",
                    records.len(),
                    self.path.display()
                );
                Ok::<_, crate::StorageError>(records)
            })
            .await?;
        Ok(records)
    }

    /// Total size of every record
    pub async fn total_size(&self) -> Result<u64> {
        Ok(self
            .files_list()
            .await?
            .iter()
            .map(|r| u64::from(r.size))
            .sum())
    }

    /// Sibling `archiveN.tfa` blobs, ordered by N
    pub async fn archives(self: &Arc<Self>) -> Result<Vec<GameBlob>> {
        self.archives_with_extension(ARCHIVE_EXTENSION).await
    }

    /// Sibling `archiveN.<extension>` blobs, ordered by N
    pub async fn archives_with_extension(self: &Arc<Self>, extension: &str) -> Result<Vec<GameBlob>> {
        let mut blobs = Vec::new();
        let mut entries = fs::read_dir(&self.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(ordinal) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(archive_ordinal)
            else {
                debug!("Ignoring unnumbered archive {}", path.display());
                continue;
            };
            blobs.push(GameBlob::new(Arc::clone(self), path, ordinal));
        }

        blobs.sort_by_key(GameBlob::ordinal);
        Ok(blobs)
    }

    /// Drop every cached value so the next access reads the file again
    pub fn refresh(&mut self) {
        self.raw.take();
        self.hash.take();
        self.records.take();
    }
}

impl PartialEq for GameIndex {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for GameIndex {}
