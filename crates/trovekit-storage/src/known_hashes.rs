//! Persisted hashes of extracted indexes and archives
//!
//! Keys are paths relative to the archive root with `/` separators, values
//! are lowercase hex MD5 digests. The file is plain pretty-printed JSON.

use crate::atomic::write_atomic;
use crate::{Result, StorageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Path-keyed MD5 map shared between scanners and the extractor
#[derive(Debug, Default)]
pub struct KnownHashes {
    entries: Mutex<BTreeMap<String, String>>,
}

impl KnownHashes {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file
    ///
    /// A missing file gives an empty store. A malformed file is logged and
    /// also gives an empty store, so the next extraction starts from scratch.
    pub async fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No known hashes at {}", path.display());
                return Self::new();
            }
            Err(e) => {
                warn!("Failed to read known hashes {}: {}", path.display(), e);
                return Self::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, String>>(&text) {
            Ok(entries) => {
                debug!("Loaded {} known hashes from {}", entries.len(), path.display());
                Self {
                    entries: Mutex::new(entries),
                }
            }
            Err(e) => {
                warn!("Ignoring malformed known hashes {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Write to a JSON file through a temporary sibling
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        write_atomic(path.as_ref(), &json).await
    }

    /// Recorded hash for `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Whether `key` is recorded with exactly `hash`
    pub fn matches(&self, key: &str, hash: &str) -> bool {
        self.entries.lock().get(key).is_some_and(|h| h == hash)
    }

    /// Record a hash, returning the previous one
    pub fn insert(&self, key: impl Into<String>, hash: impl Into<String>) -> Option<String> {
        self.entries.lock().insert(key.into(), hash.into())
    }

    /// Forget a key
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.lock().remove(key)
    }

    /// Number of recorded keys
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.lock().clone()
    }
}

/// Store key of `path`: relative to `root`, `/`-separated
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        StorageError::InvalidPath(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return Err(StorageError::InvalidPath(format!(
            "{} is the root itself",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().expect("temp dir");
        let known = KnownHashes::load(dir.path().join("hashes.json")).await;
        assert!(known.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("hashes.json");
        std::fs::write(&path, b"{ not json").expect("write");
        let known = KnownHashes::load(&path).await;
        assert!(known.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested/hashes.json");

        let known = KnownHashes::new();
        known.insert("ui/index.tfi", "aa");
        known.insert("ui/archive0.tfa", "bb");
        assert_eq!(known.insert("ui/index.tfi", "cc"), Some("aa".to_string()));
        known.save(&path).await.expect("save");

        let reloaded = KnownHashes::load(&path).await;
        assert_eq!(reloaded.snapshot(), known.snapshot());
        assert!(reloaded.matches("ui/index.tfi", "cc"));
        assert!(!reloaded.matches("ui/index.tfi", "aa"));
        assert!(!reloaded.matches("missing", "cc"));
    }

    #[test]
    fn test_relative_key() {
        let root = Path::new("/games/trove");
        assert_eq!(
            relative_key(root, &root.join("ui").join("index.tfi")).expect("key"),
            "ui/index.tfi"
        );
        assert!(relative_key(root, Path::new("/elsewhere/index.tfi")).is_err());
        assert!(relative_key(root, root).is_err());
    }
}
