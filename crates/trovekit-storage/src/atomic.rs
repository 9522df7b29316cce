//! Temp-file-and-rename writes
//!
//! Readers never observe a partially written file: data goes to a hidden
//! sibling first, is synced, then renamed over the destination.

use crate::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const MAX_ATTEMPTS: usize = 3;

/// Hidden sibling used while writing `path`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `data` to `path`, creating parent directories
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp = temp_path(path);
    let mut last_error = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match write_then_rename(&temp, path, data).await {
            Ok(()) => {
                debug!("Wrote {} ({} bytes, attempt {})", path.display(), data.len(), attempt);
                return Ok(());
            }
            Err(e) => {
                warn!("Write of {} failed on attempt {}: {}", path.display(), attempt, e);
                let _ = fs::remove_file(&temp).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| std::io::Error::other("write failed"))
        .into())
}

async fn write_then_rename(temp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp, path).await
}
