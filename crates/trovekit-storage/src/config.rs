//! Configuration for extraction and the mod library

use crate::{ARCHIVE_EXTENSION, HASHES_FILE, INDEX_FILE, Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Asset category directories the game keeps archives in
pub const DEFAULT_CATEGORIES: [&str; 11] = [
    "audio",
    "blueprints",
    "fonts",
    "languages",
    "models",
    "movies",
    "particles",
    "prefabs",
    "shadersunified",
    "textures",
    "ui",
];

/// Configuration for archive scanning and extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Top-level directories searched for indexes
    pub categories: Vec<String>,

    /// Index file name
    pub index_file: String,

    /// Archive blob extension, without the dot
    pub archive_extension: String,

    /// Known-hash file name at the extraction root
    pub hashes_file: String,

    /// Indexes hashed concurrently while scanning
    pub max_concurrent_scans: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| (*c).to_string()).collect(),
            index_file: INDEX_FILE.to_string(),
            archive_extension: ARCHIVE_EXTENSION.to_string(),
            hashes_file: HASHES_FILE.to_string(),
            max_concurrent_scans: 8,
        }
    }
}

impl ExtractorConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_scans == 0 {
            return Err(StorageError::Config(
                "max_concurrent_scans must be at least 1".to_string(),
            ));
        }
        if self.index_file.is_empty() || self.archive_extension.is_empty() {
            return Err(StorageError::Config(
                "index file and archive extension must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the category allow-list
    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Set the scan concurrency
    #[must_use]
    pub const fn with_max_concurrent_scans(mut self, limit: usize) -> Self {
        self.max_concurrent_scans = limit;
        self
    }

    /// Set the known-hash file name
    #[must_use]
    pub fn with_hashes_file(mut self, name: impl Into<String>) -> Self {
        self.hashes_file = name.into();
        self
    }

    /// Set the archive blob extension, without the dot
    #[must_use]
    pub fn with_archive_extension(mut self, extension: impl Into<String>) -> Self {
        self.archive_extension = extension.into();
        self
    }

    /// Whether `name` is an allowed category directory
    pub fn is_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c == name)
    }
}

/// Options for [`ModLibrary::load`](crate::ModLibrary::load)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryOptions {
    /// Read only TMod headers, skipping payload decompression
    pub partial: bool,

    /// Rename TMods whose file name differs from their title
    pub fix_names: bool,

    /// Rename `.tmod` files that are really zips, and the reverse
    pub fix_extensions: bool,

    /// Game's mod config directory (`ModCfgs`); interface mods get a
    /// `<title>.cfg` there when set
    pub configs_dir: Option<PathBuf>,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            partial: false,
            fix_names: true,
            fix_extensions: true,
            configs_dir: None,
        }
    }
}

impl LibraryOptions {
    /// Read headers only
    #[must_use]
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Enable or disable name correction
    #[must_use]
    pub fn with_fix_names(mut self, enable: bool) -> Self {
        self.fix_names = enable;
        self
    }

    /// Enable or disable extension correction
    #[must_use]
    pub fn with_fix_extensions(mut self, enable: bool) -> Self {
        self.fix_extensions = enable;
        self
    }

    /// Keep mod configs in `dir` up to date
    #[must_use]
    pub fn with_configs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.configs_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ExtractorConfig::default();
        assert_eq!(config.categories.len(), 11);
        assert!(config.is_category("shadersunified"));
        assert!(!config.is_category("extracted"));
        assert_eq!(config.index_file, "index.tfi");
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_json_partial_override() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("extractor.json");
        std::fs::write(&path, r#"{ "categories": ["ui"], "max_concurrent_scans": 2 }"#)
            .expect("write config");

        let config = ExtractorConfig::from_json_file(&path).expect("load");
        assert_eq!(config.categories, vec!["ui".to_string()]);
        assert_eq!(config.max_concurrent_scans, 2);
        assert_eq!(config.archive_extension, "tfa");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = ExtractorConfig::default().with_max_concurrent_scans(0);
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));
    }

    #[test]
    fn test_library_options_builders() {
        let options = LibraryOptions::default()
            .with_partial(true)
            .with_fix_names(false);
        assert!(options.partial);
        assert!(!options.fix_names);
        assert!(options.fix_extensions);
        assert!(options.configs_dir.is_none());
    }

    #[test]
    fn test_library_options_json() {
        let options: LibraryOptions =
            serde_json::from_str(r#"{ "configs_dir": "/cfg" }"#).expect("parse");
        assert_eq!(options.configs_dir, Some(PathBuf::from("/cfg")));
        assert!(options.fix_names);
    }
}
