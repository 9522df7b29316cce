//! Extraction of archive files to disk
//!
//! Files land under the target root at their path relative to the
//! installation. Every write goes through a temporary sibling and a rename,
//! so a cancelled or failed run leaves only complete files behind.
//!
//! Known hashes are updated as work completes: an archive once all of its
//! changed files are written, an index once the whole run succeeded. The
//! store is saved to `<target>/hashes.json` whether the run finished or not.

use crate::archive::{GameBlob, GameIndex};
use crate::atomic::write_atomic;
use crate::cancel::CancelFlag;
use crate::config::ExtractorConfig;
use crate::diff::{Change, ChangeSet, DiffStatus};
use crate::known_hashes::{KnownHashes, relative_key};
use crate::{Result, StorageError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

/// Progress of a running extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionProgress {
    /// Files written so far
    pub done: usize,
    /// Files to write in this run
    pub total: usize,
    /// File just written
    pub current: PathBuf,
}

/// One file listed in an [`ExtractionReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedFile {
    /// Path relative to the installation
    pub path: String,
    /// Classification, when the run was change-driven
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DiffStatus>,
    /// Size in bytes
    pub size: u64,
}

/// Summary of one extraction, written as `report.json` in the change folder
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    /// Installation root
    pub extracted_from: PathBuf,
    /// Target root
    pub extracted_to: PathBuf,
    /// Previous extraction the changes were computed against
    pub compared_with: Option<PathBuf>,
    /// Change folder
    pub changes_to: Option<PathBuf>,
    /// Bytes written to the target
    pub bytes_written: u64,
    /// Bytes of scanned indexes that did not need writing
    pub bytes_saved: u64,
    /// Wall time of the run
    pub elapsed_seconds: f64,
    /// Indexes covered, relative to the installation
    pub indexes: Vec<String>,
    /// Archives written from, relative to the installation
    pub archives: Vec<String>,
    /// Files written
    pub files: Vec<ReportedFile>,
    /// Paths present in the previous extraction and gone now
    pub removed: Vec<String>,
    /// Paths that could not be read
    pub unresolved: Vec<String>,
}

type ProgressFn = Box<dyn Fn(&ExtractionProgress) + Send + Sync>;

#[derive(Debug, Clone)]
struct ChangeFolder {
    dir: PathBuf,
    previous_root: PathBuf,
}

impl ChangeFolder {
    fn old_dir(&self) -> PathBuf {
        self.dir.join("old")
    }

    fn new_dir(&self) -> PathBuf {
        self.dir.join("new")
    }
}

/// Writes archive files under a target root
pub struct Extractor {
    archive_root: PathBuf,
    target_root: PathBuf,
    known: Arc<KnownHashes>,
    config: ExtractorConfig,
    changes: Option<ChangeFolder>,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("archive_root", &self.archive_root)
            .field("target_root", &self.target_root)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    /// Extractor from an installation into `target_root`
    pub fn new(
        archive_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
        known: Arc<KnownHashes>,
    ) -> Self {
        Self {
            archive_root: archive_root.into(),
            target_root: target_root.into(),
            known,
            config: ExtractorConfig::default(),
            changes: None,
            progress: None,
        }
    }

    /// Also keep old and new copies of every changed file under `changes_dir`
    ///
    /// Old copies are read from `previous_root`.
    #[must_use]
    pub fn with_changes_dir(
        mut self,
        changes_dir: impl Into<PathBuf>,
        previous_root: impl Into<PathBuf>,
    ) -> Self {
        self.changes = Some(ChangeFolder {
            dir: changes_dir.into(),
            previous_root: previous_root.into(),
        });
        self
    }

    /// Call `progress` after every written file
    #[must_use]
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(&ExtractionProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Use `config` for file names
    #[must_use]
    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Known-hash store updated by this extractor
    pub fn known_hashes(&self) -> &Arc<KnownHashes> {
        &self.known
    }

    fn hashes_path(&self) -> PathBuf {
        self.target_root.join(&self.config.hashes_file)
    }

    fn key(&self, path: &Path) -> Result<String> {
        relative_key(&self.archive_root, path)
    }

    fn report_progress(&self, done: usize, total: usize, current: &Path) {
        if let Some(progress) = &self.progress {
            progress(&ExtractionProgress {
                done,
                total,
                current: current.to_path_buf(),
            });
        }
    }

    fn base_report(&self) -> ExtractionReport {
        ExtractionReport {
            extracted_from: self.archive_root.clone(),
            extracted_to: self.target_root.clone(),
            compared_with: self.changes.as_ref().map(|c| c.previous_root.clone()),
            changes_to: self.changes.as_ref().map(|c| c.dir.clone()),
            ..ExtractionReport::default()
        }
    }

    /// Persist known hashes, then hand back the run's outcome
    async fn finish(
        &self,
        outcome: Result<()>,
        mut report: ExtractionReport,
        start: Instant,
    ) -> Result<ExtractionReport> {
        self.known.save(self.hashes_path()).await?;
        if let Err(e) = outcome {
            if matches!(e, StorageError::Cancelled) {
                info!(
                    "Extraction cancelled after {} files",
                    report.files.len()
                );
            }
            return Err(e);
        }

        report.elapsed_seconds = start.elapsed().as_secs_f64();
        if let Some(folder) = &self.changes {
            let json = serde_json::to_vec_pretty(&report)?;
            write_atomic(&folder.new_dir().join("report.json"), &json).await?;
        }
        info!(
            "Extracted {} files ({} bytes) in {:.2}s",
            report.files.len(),
            report.bytes_written,
            report.elapsed_seconds
        );
        Ok(report)
    }

    /// Write every added and changed file of `changes`
    pub async fn extract_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancelFlag,
    ) -> Result<ExtractionReport> {
        let start = Instant::now();
        let mut report = self.base_report();
        report.removed.clone_from(&changes.removed);
        report.unresolved = changes
            .unresolved
            .iter()
            .map(|u| u.path.display().to_string())
            .collect();

        if let Some(folder) = &self.changes {
            let json = serde_json::to_vec_pretty(&self.known.snapshot())?;
            write_atomic(&folder.old_dir().join(&self.config.hashes_file), &json).await?;
        }

        let outcome = self.write_changes(changes, cancel, &mut report).await;
        self.finish(outcome, report, start).await
    }

    async fn write_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancelFlag,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        let total = changes.changes.len();
        let mut groups: Vec<(&Arc<GameBlob>, Vec<&Change>)> = Vec::new();
        for change in &changes.changes {
            match groups.last_mut() {
                Some((blob, group)) if Arc::ptr_eq(*blob, change.file.blob()) => {
                    group.push(change);
                }
                _ => groups.push((change.file.blob(), vec![change])),
            }
        }

        for (blob, group) in groups {
            for change in group {
                cancel.check()?;
                let written = self.write_change(change).await?;
                report.bytes_written += written;
                report.files.push(ReportedFile {
                    path: self.key(change.file.path())?,
                    status: Some(change.status),
                    size: written,
                });
                self.report_progress(report.files.len(), total, change.file.path());
            }

            let key = self.key(blob.path())?;
            if let Some(resolved) = changes.resolved_archive(&key) {
                self.known.insert(key.clone(), resolved.hash.clone());
            }
            report.archives.push(key);
        }

        // Fully compared archives with nothing to write
        for archive in &changes.archives {
            self.known.insert(archive.key.clone(), archive.hash.clone());
        }

        let mut scanned = 0u64;
        for index in &changes.indexes {
            let key = self.key(index.path())?;
            self.known.insert(key.clone(), index.content_hash().await?);
            scanned += index.total_size().await?;
            report.indexes.push(key);
        }
        report.bytes_saved = scanned.saturating_sub(report.bytes_written);
        Ok(())
    }

    async fn write_change(&self, change: &Change) -> Result<u64> {
        let relative = change.file.relative_path(&self.archive_root)?;
        let content = change.file.content().await?;

        if let Some(folder) = &self.changes {
            if change.status == DiffStatus::Changed {
                match fs::read(folder.previous_root.join(relative)).await {
                    Ok(old) => write_atomic(&folder.old_dir().join(relative), &old).await?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!("No previous copy of {}", relative.display());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            write_atomic(&folder.new_dir().join(relative), content).await?;
        }

        write_atomic(&self.target_root.join(relative), content).await?;
        Ok(content.len() as u64)
    }

    /// Write every file of `indexes`
    ///
    /// Indexes that cannot be parsed and archives that cannot be decompressed
    /// are logged, listed as unresolved and skipped. An index with a skipped
    /// archive is not recorded as extracted.
    pub async fn extract_indexes(
        &self,
        indexes: &[Arc<GameIndex>],
        cancel: &CancelFlag,
    ) -> Result<ExtractionReport> {
        let start = Instant::now();
        let mut report = self.base_report();
        let outcome = self.write_indexes(indexes, cancel, &mut report).await;
        self.finish(outcome, report, start).await
    }

    async fn write_indexes(
        &self,
        indexes: &[Arc<GameIndex>],
        cancel: &CancelFlag,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        let mut total = 0;
        let mut readable = Vec::with_capacity(indexes.len());
        for index in indexes {
            match index.files_list().await {
                Ok(records) => {
                    total += records.len();
                    readable.push(index);
                }
                Err(e) if e.is_item_error() => {
                    warn!("Skipping index {}: {}", index.path().display(), e);
                    report.unresolved.push(index.path().display().to_string());
                }
                Err(e) => return Err(e),
            }
        }

        for index in readable {
            let mut complete = true;
            for blob in index
                .archives_with_extension(&self.config.archive_extension)
                .await?
            {
                let blob = Arc::new(blob);
                match self.write_archive(&blob, total, cancel, report).await {
                    Ok(()) => {}
                    Err(e) if e.is_item_error() => {
                        warn!("Skipping archive {}: {}", blob.path().display(), e);
                        report.unresolved.push(blob.path().display().to_string());
                        complete = false;
                    }
                    Err(e) => return Err(e),
                }
            }

            let key = self.key(index.path())?;
            if complete {
                self.known.insert(key.clone(), index.content_hash().await?);
            }
            report.indexes.push(key);
        }
        Ok(())
    }

    async fn write_archive(
        &self,
        blob: &Arc<GameBlob>,
        total: usize,
        cancel: &CancelFlag,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        let hash = blob.content_hash().await?.to_string();

        for file in blob.files().await? {
            cancel.check()?;
            let relative = file.relative_path(&self.archive_root)?;
            let content = file.content().await?;
            write_atomic(&self.target_root.join(relative), content).await?;

            report.bytes_written += content.len() as u64;
            report.files.push(ReportedFile {
                path: self.key(file.path())?,
                status: None,
                size: content.len() as u64,
            });
            self.report_progress(report.files.len(), total, file.path());
        }

        let key = self.key(blob.path())?;
        self.known.insert(key.clone(), hash);
        report.archives.push(key);
        Ok(())
    }
}
