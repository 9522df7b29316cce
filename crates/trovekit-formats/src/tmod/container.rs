//! In-memory mod container

use super::error::{ContainerError, ContainerResult};
use super::header::{CONTAINER_VERSION, FileEntry};
use super::property::{Properties, Property};
use crate::hash::native_hash;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Alignment of each file in the payload stream
pub const FILE_ALIGNMENT: usize = 4;

/// Longest virtual path a header record can hold
pub const MAX_PATH_LEN: usize = u8::MAX as usize;

/// Required properties checked by [`ModContainer::validate`]
pub const REQUIRED_PROPERTIES: [&str; 2] = ["title", "author"];

/// Well-known property names
pub mod keys {
    /// Mod title
    pub const TITLE: &str = "title";
    /// Comma-separated author list
    pub const AUTHOR: &str = "author";
    /// Path of the embedded preview image
    pub const PREVIEW_PATH: &str = "previewPath";
    /// Path of the embedded configuration file
    pub const CONFIG_PATH: &str = "configPath";
    /// Game version the mod was built for
    pub const GAME_VERSION: &str = "gameVersion";
    /// Free-form notes
    pub const NOTES: &str = "notes";
    /// Steam workshop identifier
    pub const STEAM_ID: &str = "SteamId";
    /// Comma-separated tag list
    pub const TAGS: &str = "tags";
}

/// Container flavour a [`ModContainer`] was read from or will be written as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// Binary TMod container
    #[default]
    TMod,
    /// Plain zip archive
    ZMod,
}

impl ContainerFormat {
    /// File extension without the leading dot
    pub const fn extension(self) -> &'static str {
        match self {
            Self::TMod => "tmod",
            Self::ZMod => "zip",
        }
    }
}

/// Normalize a virtual path: forward slashes, lowercase
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// One embedded file
#[derive(Debug, Clone)]
pub struct ContainerFile {
    path: String,
    content: Vec<u8>,
    /// Stream index, reset to 0 before every write
    pub index: u64,
    /// Offset in the payload, reassigned before every write
    pub offset: u64,
    stored_checksum: Option<u64>,
    checksum: OnceLock<u32>,
}

impl ContainerFile {
    /// Create a file, normalizing its virtual path
    pub fn new(path: &str, content: impl Into<Vec<u8>>) -> ContainerResult<Self> {
        let path = normalize_path(path);
        if path.len() > MAX_PATH_LEN {
            return Err(ContainerError::PathTooLong(path));
        }
        Ok(Self {
            path,
            content: content.into(),
            index: 0,
            offset: 0,
            stored_checksum: None,
            checksum: OnceLock::new(),
        })
    }

    /// Rebuild a file from a parsed header record and its content
    pub(crate) fn from_entry(entry: &FileEntry, content: Vec<u8>) -> Self {
        Self {
            path: normalize_path(&entry.path),
            content,
            index: entry.index,
            offset: entry.offset,
            stored_checksum: Some(entry.checksum),
            checksum: OnceLock::new(),
        }
    }

    /// Normalized virtual path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File content
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Replace the content, dropping the cached checksum
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
        self.checksum = OnceLock::new();
        self.stored_checksum = None;
    }

    /// Unpadded size in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Size after padding to [`FILE_ALIGNMENT`]
    pub fn padded_size(&self) -> usize {
        self.content.len().next_multiple_of(FILE_ALIGNMENT)
    }

    /// Content padded with NULs to [`FILE_ALIGNMENT`]
    pub fn padded_content(&self) -> Vec<u8> {
        let mut padded = Vec::with_capacity(self.padded_size());
        padded.extend_from_slice(&self.content);
        padded.resize(self.padded_size(), 0);
        padded
    }

    /// Native checksum of the content, computed once
    pub fn checksum(&self) -> u32 {
        *self.checksum.get_or_init(|| native_hash(&self.content))
    }

    /// Checksum recorded in the header this file was parsed from
    pub fn stored_checksum(&self) -> Option<u64> {
        self.stored_checksum
    }

    /// Whether the recorded checksum disagrees with the content
    pub fn checksum_mismatch(&self) -> bool {
        self.stored_checksum
            .is_some_and(|stored| stored != u64::from(self.checksum()))
    }

    /// Header record describing this file at its current offset
    pub fn entry(&self) -> FileEntry {
        FileEntry {
            path: self.path.clone(),
            index: self.index,
            // Empty files are always written at offset 0
            offset: if self.content.is_empty() { 0 } else { self.offset },
            size: self.content.len() as u64,
            checksum: u64::from(self.checksum()),
        }
    }
}

/// A mod: properties plus embedded files
#[derive(Debug, Clone)]
pub struct ModContainer {
    /// Container version
    pub version: u16,
    /// Format the container was read from
    pub format: ContainerFormat,
    /// Where the container was read from, if anywhere
    pub source_path: Option<PathBuf>,
    properties: Properties,
    files: Vec<ContainerFile>,
    entries: Vec<FileEntry>,
    source_hash: Option<String>,
}

impl Default for ModContainer {
    fn default() -> Self {
        Self {
            version: CONTAINER_VERSION,
            format: ContainerFormat::TMod,
            source_path: None,
            properties: Properties::default(),
            files: Vec::new(),
            entries: Vec::new(),
            source_hash: None,
        }
    }
}

impl ModContainer {
    /// Empty TMod container
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty container with `title` and `author` set
    pub fn with_identity(title: &str, author: &str) -> Self {
        let mut container = Self::new();
        container.set_name(title);
        container.set_author(author);
        container
    }

    pub(crate) fn from_parts(
        format: ContainerFormat,
        source_path: &Path,
        version: u16,
        properties: Properties,
        files: Vec<ContainerFile>,
        entries: Vec<FileEntry>,
        source_hash: String,
    ) -> Self {
        Self {
            version,
            format,
            source_path: Some(source_path.to_path_buf()),
            properties,
            files,
            entries,
            source_hash: Some(source_hash),
        }
    }

    /// Property table
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Last property named `name`
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Value of the last property named `name`
    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties.value(name)
    }

    /// Set a property, replacing any existing entries with the same name
    pub fn add_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.set(name, value);
    }

    /// Remove a property
    pub fn remove_property(&mut self, name: &str) -> bool {
        self.properties.remove(name)
    }

    /// Mod title
    pub fn name(&self) -> Option<&str> {
        self.property_value(keys::TITLE)
    }

    /// Set the mod title
    pub fn set_name(&mut self, value: &str) {
        self.add_property(keys::TITLE, value);
    }

    /// Author list as stored
    pub fn author(&self) -> Option<&str> {
        self.property_value(keys::AUTHOR)
    }

    /// Set the author list
    pub fn set_author(&mut self, value: &str) {
        self.add_property(keys::AUTHOR, value);
    }

    /// Preview image path, normalized
    pub fn preview_path(&self) -> Option<String> {
        self.property_value(keys::PREVIEW_PATH).map(normalize_path)
    }

    /// Set the preview image path
    pub fn set_preview_path(&mut self, path: &str) {
        self.add_property(keys::PREVIEW_PATH, path.replace('\\', "/"));
    }

    /// Configuration file path, normalized
    pub fn config_path(&self) -> Option<String> {
        self.property_value(keys::CONFIG_PATH).map(normalize_path)
    }

    /// Set the configuration file path
    pub fn set_config_path(&mut self, path: &str) {
        self.add_property(keys::CONFIG_PATH, path.replace('\\', "/"));
    }

    /// Game version the mod targets
    pub fn game_version(&self) -> Option<&str> {
        self.property_value(keys::GAME_VERSION)
    }

    /// Set the targeted game version
    pub fn set_game_version(&mut self, value: &str) {
        self.add_property(keys::GAME_VERSION, value);
    }

    /// Free-form notes
    pub fn notes(&self) -> Option<&str> {
        self.property_value(keys::NOTES)
    }

    /// Set the notes
    pub fn set_notes(&mut self, value: &str) {
        self.add_property(keys::NOTES, value);
    }

    /// Steam workshop identifier
    pub fn steam_id(&self) -> Option<&str> {
        self.property_value(keys::STEAM_ID)
    }

    /// Set the Steam workshop identifier
    pub fn set_steam_id(&mut self, value: &str) {
        self.add_property(keys::STEAM_ID, value);
    }

    /// Tags, split on commas as stored
    ///
    /// An absent or empty property has no tags. Whitespace is kept.
    pub fn tags(&self) -> Vec<String> {
        self.property_value(keys::TAGS)
            .filter(|tags| !tags.is_empty())
            .map(|tags| tags.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Append a tag
    pub fn add_tag(&mut self, tag: &str) {
        let mut tags = self.tags();
        tags.push(tag.to_string());
        self.add_property(keys::TAGS, tags.join(","));
    }

    /// Remove the first occurrence of a tag, returning whether it was present
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let mut tags = self.tags();
        let Some(position) = tags.iter().position(|t| t == tag) else {
            return false;
        };
        tags.remove(position);
        self.add_property(keys::TAGS, tags.join(","));
        true
    }

    /// Embedded files in payload order
    pub fn files(&self) -> &[ContainerFile] {
        &self.files
    }

    /// Mutable access to the files
    ///
    /// Offsets are reassigned on the next write, so reordering is allowed.
    pub fn files_mut(&mut self) -> &mut Vec<ContainerFile> {
        self.source_hash = None;
        &mut self.files
    }

    /// File with the given virtual path
    pub fn file(&self, path: &str) -> Option<&ContainerFile> {
        let path = normalize_path(path);
        self.files.iter().find(|f| f.path == path)
    }

    /// Append a file and reassign offsets
    pub fn add_file(&mut self, file: ContainerFile) {
        self.files.push(file);
        self.source_hash = None;
        self.reorder_files();
    }

    /// Remove the file at `path`, returning it
    pub fn remove_file(&mut self, path: &str) -> Option<ContainerFile> {
        let path = normalize_path(path);
        let position = self.files.iter().position(|f| f.path == path)?;
        let removed = self.files.remove(position);
        self.source_hash = None;
        self.reorder_files();
        Some(removed)
    }

    /// Header records as read from the source, or as last written
    ///
    /// Partial parses populate this without resolving any content.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub(crate) fn set_entries(&mut self, entries: Vec<FileEntry>) {
        self.entries = entries;
    }

    /// Assign index 0 and cumulative padded offsets in list order
    pub fn reorder_files(&mut self) {
        let mut offset = 0u64;
        for file in &mut self.files {
            file.index = 0;
            file.offset = offset;
            offset += file.padded_size() as u64;
        }
    }

    /// Virtual paths of every game file: the preview image and a zip's
    /// `metadata.toml` are left out
    pub fn content_files(&self) -> Vec<&str> {
        let preview = self.preview_path();
        let metadata = (self.format == ContainerFormat::ZMod).then_some(crate::zmod::METADATA_FILE);
        let paths = if self.files.is_empty() {
            self.entries.iter().map(|e| e.path.as_str()).collect::<Vec<_>>()
        } else {
            self.files.iter().map(ContainerFile::path).collect()
        };
        paths
            .into_iter()
            .filter(|path| preview.as_deref() != Some(*path) && metadata != Some(*path))
            .collect()
    }

    /// Whether the mod replaces any interface movie
    pub fn is_ui_mod(&self) -> bool {
        self.files.iter().any(|f| f.path.ends_with(".swf"))
            || self.entries.iter().any(|e| e.path.ends_with(".swf"))
    }

    /// File name the container should have on disk when enabled
    pub fn expected_file_name(&self) -> Option<String> {
        self.name()
            .map(|title| format!("{title}.{}", self.format.extension()))
    }

    /// Lowercase hex MD5 of the bytes the container was parsed from
    ///
    /// Cleared by any change to the file list.
    pub fn content_hash(&self) -> Option<&str> {
        self.source_hash.as_deref()
    }

    /// Check everything [`compile`](Self::compile) requires
    pub fn validate(&self) -> ContainerResult<()> {
        if self.files.is_empty() {
            return Err(ContainerError::NoFiles);
        }

        for required in REQUIRED_PROPERTIES {
            match self.property_value(required) {
                None => return Err(ContainerError::MissingProperty(required.to_string())),
                Some("") => {
                    return Err(ContainerError::PropertyMalformed(required.to_string()));
                }
                Some(_) => {}
            }
        }

        for (property, path) in [
            (keys::PREVIEW_PATH, self.preview_path()),
            (keys::CONFIG_PATH, self.config_path()),
        ] {
            if let Some(path) = path
                && self.file(&path).is_none()
            {
                return Err(ContainerError::DanglingPath {
                    property: property.to_string(),
                    path,
                });
            }
        }

        Ok(())
    }

    /// Validate and serialize to the TMod format
    pub fn compile(&mut self) -> ContainerResult<Vec<u8>> {
        self.validate()?;
        super::serialize(self)
    }
}
