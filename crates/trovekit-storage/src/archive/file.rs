//! Index records and per-file content access

use super::GameBlob;
use crate::{Result, StorageError};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use trovekit_formats::hash::content_hash;

/// One record of an `index.tfi`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFileRecord {
    /// Name relative to the index directory
    pub name: String,
    /// Index directory joined with `name`
    pub path: PathBuf,
    /// Ordinal of the archive holding the content
    pub archive_index: u32,
    /// Offset in the decompressed archive
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Native 32-bit hash stored by the game
    pub hash: u32,
}

impl ArchiveFileRecord {
    /// Byte range of the content in the decompressed archive
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// Content accessor for one file of a blob
#[derive(Debug)]
pub struct ArchiveFile {
    record: ArchiveFileRecord,
    blob: Arc<GameBlob>,
    hash: OnceCell<String>,
}

impl ArchiveFile {
    pub(crate) fn new(record: ArchiveFileRecord, blob: Arc<GameBlob>) -> Self {
        Self {
            record,
            blob,
            hash: OnceCell::new(),
        }
    }

    /// Index record
    pub fn record(&self) -> &ArchiveFileRecord {
        &self.record
    }

    /// Blob holding the content
    pub fn blob(&self) -> &Arc<GameBlob> {
        &self.blob
    }

    /// Absolute path of the file inside the installation
    pub fn path(&self) -> &Path {
        &self.record.path
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        u64::from(self.record.size)
    }

    /// Path relative to `root`
    ///
    /// Names that climb out of the index directory are rejected, so the
    /// result is always safe to join onto an extraction target.
    pub fn relative_path(&self, root: &Path) -> Result<&Path> {
        let relative = self.record.path.strip_prefix(root).map_err(|_| {
            StorageError::InvalidPath(format!(
                "{} is not under {}",
                self.record.path.display(),
                root.display()
            ))
        })?;
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(format!(
                "{} escapes {}",
                self.record.name,
                root.display()
            )));
        }
        Ok(relative)
    }

    fn check_range(&self, available: usize) -> Result<std::ops::Range<usize>> {
        let range = self.record.range();
        if range.end > available {
            return Err(StorageError::CorruptArchive {
                path: self.record.path.clone(),
                reason: format!(
                    "record {}..{} lies past the end of {} ({} bytes)",
                    range.start,
                    range.end,
                    self.blob.path().display(),
                    available
                ),
            });
        }
        Ok(range)
    }

    /// File content, sliced from the decompressed blob
    ///
    /// A record that points past the end of the blob fails for this file
    /// only; other files of the same blob stay readable.
    pub async fn content(&self) -> Result<&[u8]> {
        let data = self.blob.content().await?;
        let range = self.check_range(data.len())?;
        Ok(&data[range])
    }

    /// Lowercase hex MD5 of the content
    pub async fn content_hash(&self) -> Result<&str> {
        let hash = self
            .hash
            .get_or_try_init(|| async {
                let data = Arc::clone(self.blob.shared_content().await?);
                let range = self.check_range(data.len())?;
                Ok::<_, StorageError>(
                    tokio::task::spawn_blocking(move || content_hash(&data[range])).await?,
                )
            })
            .await?;
        Ok(hash)
    }
}
