//! Change detection against a previous extraction
//!
//! Every comparison uses MD5 of the live decompressed bytes. The native
//! 32-bit hash stored in indexes is never used to decide whether a file
//! changed.
//!
//! Scanning is incremental at two levels. An index whose raw bytes hash to
//! the value recorded in [`KnownHashes`] is not opened at all, and an archive
//! whose decompressed content matches its recorded hash is skipped with all
//! of its files. Only the remaining files are compared one by one.
//!
//! The engine never writes; recording hashes and copying bytes is the job of
//! the [`Extractor`](crate::Extractor).

use crate::archive::{ArchiveFile, GameBlob, GameIndex};
use crate::cancel::CancelFlag;
use crate::config::ExtractorConfig;
use crate::known_hashes::{KnownHashes, relative_key};
use crate::{Result, StorageError};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use trovekit_formats::hash::content_hash;
use walkdir::WalkDir;

/// Classification of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Same bytes as the previous extraction
    Unchanged,
    /// Not present in the previous extraction
    Added,
    /// Present with different bytes
    Changed,
    /// Present before, gone from the live archives
    Removed,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// An added or changed file
#[derive(Debug)]
pub struct Change {
    /// Live file, with its archive and index
    pub file: ArchiveFile,
    /// `Added` or `Changed`
    pub status: DiffStatus,
}

/// A file whose content could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    /// Path inside the installation
    pub path: PathBuf,
    /// Why it could not be read
    pub reason: String,
}

/// An archive whose every file was compared
///
/// Only the key and hash are kept, so the archive's decompressed content is
/// released once scanning moves on unless a [`Change`] still needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArchive {
    /// Path relative to the installation
    pub key: String,
    /// MD5 of the decompressed content
    pub hash: String,
}

/// Result of [`DiffEngine::find_changes`]
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Added and changed files, in index, archive and record order
    pub changes: Vec<Change>,
    /// Previously extracted paths missing from the scanned indexes
    pub removed: Vec<String>,
    /// Files in corrupt archives or with out-of-range records
    pub unresolved: Vec<Unresolved>,
    /// Scanned indexes with every file resolved
    pub indexes: Vec<Arc<GameIndex>>,
    /// Scanned archives with every file resolved
    pub archives: Vec<ResolvedArchive>,
}

impl ChangeSet {
    /// Whether nothing needs extracting or deleting
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.removed.is_empty()
    }

    /// Bytes of every added and changed file
    pub fn total_size(&self) -> u64 {
        self.changes.iter().map(|c| c.file.size()).sum()
    }

    /// Changes stored in `blob`
    pub fn changes_in<'a>(&'a self, blob: &'a Arc<GameBlob>) -> impl Iterator<Item = &'a Change> {
        self.changes
            .iter()
            .filter(move |c| Arc::ptr_eq(c.file.blob(), blob))
    }

    /// The fully resolved archive stored at `key`
    pub fn resolved_archive(&self, key: &str) -> Option<&ResolvedArchive> {
        self.archives.iter().find(|a| a.key == key)
    }
}

/// Compares live archives with a previous extraction
#[derive(Debug, Clone)]
pub struct DiffEngine {
    archive_root: PathBuf,
    previous_root: PathBuf,
    config: ExtractorConfig,
}

impl DiffEngine {
    /// Engine over a game installation and the directory of a previous extraction
    pub fn new(
        archive_root: impl Into<PathBuf>,
        previous_root: impl Into<PathBuf>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            archive_root: archive_root.into(),
            previous_root: previous_root.into(),
            config,
        }
    }

    /// Installation root
    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Previous extraction root
    pub fn previous_root(&self) -> &Path {
        &self.previous_root
    }

    /// Configuration in use
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Classify one live file against its mirrored path in the previous extraction
    ///
    /// Never returns [`DiffStatus::Removed`]; removals come from comparing
    /// path sets.
    pub async fn compare(&self, file: &ArchiveFile) -> Result<DiffStatus> {
        let mirrored = self
            .previous_root
            .join(file.relative_path(&self.archive_root)?);

        let previous = match fs::read(&mirrored).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DiffStatus::Added),
            Err(e) => return Err(e.into()),
        };

        let live = file.content_hash().await?;
        let previous = tokio::task::spawn_blocking(move || content_hash(&previous)).await?;

        if live == previous {
            Ok(DiffStatus::Unchanged)
        } else {
            Ok(DiffStatus::Changed)
        }
    }

    /// Configured category directories that exist under the root
    async fn category_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&self.archive_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if self.config.is_category(name) && entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Every index under the configured categories
    ///
    /// With `track_changes`, indexes whose hash matches `known` are left out.
    /// Indexes that cannot be read are logged and left out.
    pub async fn find_all_indexes(
        &self,
        known: &KnownHashes,
        track_changes: bool,
    ) -> Result<Vec<Arc<GameIndex>>> {
        let categories = self.category_dirs().await?;
        let index_file = self.config.index_file.clone();

        let paths = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for dir in categories {
                for entry in WalkDir::new(&dir).sort_by_file_name() {
                    match entry {
                        Ok(entry)
                            if entry.file_type().is_file()
                                && entry.file_name() == index_file.as_str() =>
                        {
                            found.push(entry.into_path());
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
                    }
                }
            }
            found
        })
        .await?;

        debug!("Found {} indexes under {}", paths.len(), self.archive_root.display());
        let indexes = paths.into_iter().map(|p| Arc::new(GameIndex::open(p)));
        if !track_changes {
            return Ok(indexes.collect());
        }

        let hashed: Vec<(Arc<GameIndex>, Result<String>)> = stream::iter(indexes)
            .map(|index| async move {
                let hash = index.content_hash().await.map(str::to_string);
                (index, hash)
            })
            .buffered(self.config.max_concurrent_scans.max(1))
            .collect()
            .await;

        let mut selected = Vec::new();
        for (index, hash) in hashed {
            let hash = match hash {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Skipping index {}: {}", index.path().display(), e);
                    continue;
                }
            };
            let key = relative_key(&self.archive_root, index.path())?;
            if known.matches(&key, &hash) {
                debug!("Index {} unchanged", key);
                continue;
            }
            selected.push(index);
        }
        Ok(selected)
    }

    /// Every added, changed, removed and unreadable file since the previous extraction
    ///
    /// `previous` holds the relative paths of the previous extraction, see
    /// [`previous_listing`]. A removal is only reported for paths in the
    /// directory of an index that was scanned in this run.
    pub async fn find_changes(
        &self,
        known: &KnownHashes,
        previous: &BTreeSet<String>,
        cancel: &CancelFlag,
    ) -> Result<ChangeSet> {
        let mut set = ChangeSet::default();
        let mut seen = HashSet::new();
        let mut live = BTreeSet::new();
        let mut scanned_dirs = BTreeSet::new();

        for index in self.find_all_indexes(known, true).await? {
            cancel.check()?;

            let records = match index.files_list().await {
                Ok(records) => records,
                Err(e) if e.is_item_error() => {
                    warn!("Skipping index {}: {}", index.path().display(), e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for record in records {
                match relative_key(&self.archive_root, &record.path) {
                    Ok(key) => {
                        live.insert(key);
                    }
                    Err(e) => warn!("Ignoring record {}: {}", record.name, e),
                }
            }
            scanned_dirs.insert(relative_key(&self.archive_root, index.directory())?);

            let mut index_resolved = true;
            for blob in index
                .archives_with_extension(&self.config.archive_extension)
                .await?
            {
                cancel.check()?;
                let blob = Arc::new(blob);
                match self.scan_archive(&blob, known, &mut set, &mut seen, cancel).await? {
                    Some(resolved) => set.archives.push(resolved),
                    None => index_resolved = false,
                }
            }
            if index_resolved {
                set.indexes.push(index);
            }
        }

        set.removed = removed_files(previous, &live)
            .into_iter()
            .filter(|path| scanned_dirs.contains(parent_key(path)))
            .collect();

        info!(
            "{} changed, {} removed, {} unresolved",
            set.changes.len(),
            set.removed.len(),
            set.unresolved.len()
        );
        Ok(set)
    }

    /// Compare every file of one archive; `Ok(None)` when something was unresolved
    ///
    /// An archive already known is skipped and counts as resolved.
    async fn scan_archive(
        &self,
        blob: &Arc<GameBlob>,
        known: &KnownHashes,
        set: &mut ChangeSet,
        seen: &mut HashSet<PathBuf>,
        cancel: &CancelFlag,
    ) -> Result<Option<ResolvedArchive>> {
        let key = relative_key(&self.archive_root, blob.path())?;
        let files = blob.files().await?;

        let hash = match blob.content_hash().await {
            Ok(hash) if known.matches(&key, hash) => {
                debug!("Archive {} unchanged", key);
                return Ok(Some(ResolvedArchive {
                    key,
                    hash: hash.to_string(),
                }));
            }
            Ok(hash) => hash.to_string(),
            Err(e) if e.is_item_error() => {
                warn!("Archive {} unreadable: {}", key, e);
                let reason = e.to_string();
                set.unresolved.extend(files.iter().map(|f| Unresolved {
                    path: f.path().to_path_buf(),
                    reason: reason.clone(),
                }));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut resolved = true;
        for file in files {
            cancel.check()?;
            if !seen.insert(file.path().to_path_buf()) {
                continue;
            }
            match self.compare(&file).await {
                Ok(DiffStatus::Unchanged) => {}
                Ok(status) => set.changes.push(Change { file, status }),
                Err(e) if e.is_item_error() => {
                    warn!("File {} unreadable: {}", file.path().display(), e);
                    resolved = false;
                    set.unresolved.push(Unresolved {
                        path: file.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolved.then_some(ResolvedArchive { key, hash }))
    }
}

fn parent_key(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Paths in `previous` that are not in `live`
pub fn removed_files(previous: &BTreeSet<String>, live: &BTreeSet<String>) -> Vec<String> {
    previous.difference(live).cloned().collect()
}

/// Relative, `/`-separated paths of every file under a previous extraction
///
/// A missing root gives an empty listing.
pub async fn previous_listing(root: impl Into<PathBuf>) -> Result<BTreeSet<String>> {
    let root = root.into();
    tokio::task::spawn_blocking(move || {
        let mut listing = BTreeSet::new();
        if !root.exists() {
            return Ok(listing);
        }
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| {
                StorageError::Io(std::io::Error::other(format!(
                    "walking {}: {}",
                    root.display(),
                    e
                )))
            })?;
            if entry.file_type().is_file() {
                listing.insert(relative_key(&root, entry.path())?);
            }
        }
        Ok(listing)
    })
    .await?
}
