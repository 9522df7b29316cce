//! Lazily decompressed `archiveN.tfa`

use super::{ArchiveFile, GameIndex};
use crate::{Result, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::debug;
use trovekit_formats::compression::decompress_standard;
use trovekit_formats::hash::content_hash;

/// One compressed archive blob belonging to an index
///
/// The blob is decompressed once, on first access, and held until it is
/// dropped. Archives are first-party files, so only the standard decoder is
/// used.
#[derive(Debug)]
pub struct GameBlob {
    index: Arc<GameIndex>,
    path: PathBuf,
    ordinal: u32,
    content: OnceCell<Arc<[u8]>>,
    hash: OnceCell<String>,
}

impl GameBlob {
    pub(crate) fn new(index: Arc<GameIndex>, path: PathBuf, ordinal: u32) -> Self {
        Self {
            index,
            path,
            ordinal,
            content: OnceCell::new(),
            hash: OnceCell::new(),
        }
    }

    /// Index the blob belongs to
    pub fn index(&self) -> &Arc<GameIndex> {
        &self.index
    }

    /// Path of the blob
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number parsed from the file name, matched against record archive indexes
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub(crate) async fn shared_content(&self) -> Result<&Arc<[u8]>> {
        self.content
            .get_or_try_init(|| async {
                let raw = fs::read(&self.path).await?;
                let compressed_len = raw.len();
                let data = tokio::task::spawn_blocking(move || decompress_standard(&raw))
                    .await?
                    .map_err(|e| StorageError::CorruptArchive {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
                debug!(
                    "Decompressed {} ({} -> {} bytes)",
                    self.path.display(),
                    compressed_len,
                    data.len()
                );
                Ok(Arc::from(data))
            })
            .await
    }

    /// Decompressed content
    pub async fn content(&self) -> Result<&[u8]> {
        self.shared_content().await.map(|data| &**data)
    }

    /// Lowercase hex MD5 of the decompressed content
    pub async fn content_hash(&self) -> Result<&str> {
        let hash = self
            .hash
            .get_or_try_init(|| async {
                let data = Arc::clone(self.shared_content().await?);
                Ok::<_, StorageError>(
                    tokio::task::spawn_blocking(move || content_hash(&data)).await?,
                )
            })
            .await?;
        Ok(hash)
    }

    /// Files stored in this blob, in index order
    pub async fn files(self: &Arc<Self>) -> Result<Vec<ArchiveFile>> {
        Ok(self
            .index
            .files_list()
            .await?
            .iter()
            .filter(|record| record.archive_index == self.ordinal)
            .map(|record| ArchiveFile::new(record.clone(), Arc::clone(self)))
            .collect())
    }
}
