//! Mod packs
//!
//! A pack bundles whole compiled mod files (TMods or zips) behind the same
//! header layout as a TMod. Records name each mod file; offsets address an
//! unpadded concatenation of the mods, and checksums are the native hash of
//! each mod's bytes.

use crate::compression::{self, CompressionError};
use crate::hash::native_hash;
use crate::tmod::{
    self, CONTAINER_VERSION, ContainerError, FileEntry, MAX_PATH_LEN, ModContainer, Properties,
    header,
};
use crate::zmod;
use std::path::Path;
use thiserror::Error;

/// Errors produced by pack operations
#[derive(Debug, Error)]
pub enum PackError {
    /// Compiling a pack with no mods
    #[error("pack contains no mods")]
    Empty,

    /// A required property is absent or empty
    #[error("property \"{0}\" is missing")]
    MissingProperty(String),

    /// Header-level failure, shared with containers
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Payload compression failed
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// A bundled mod could not be opened
    #[error("mod {name} in pack is invalid: {source}")]
    InvalidMod {
        /// File name of the mod in the pack
        name: String,
        /// Underlying failure
        #[source]
        source: ContainerError,
    },
}

/// Result type for pack operations
pub type PackResult<T> = Result<T, PackError>;

/// One mod file inside a pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    /// File name of the mod, e.g. `Cool Hat.tmod`
    pub name: String,
    /// Raw bytes of the mod file
    pub content: Vec<u8>,
}

impl PackEntry {
    /// Open the bundled mod as a container
    pub fn open(&self) -> PackResult<ModContainer> {
        let path = Path::new(&self.name);
        let opened = if self.name.to_lowercase().ends_with(".zip") {
            zmod::parse_zip(path, &self.content)
        } else {
            tmod::parse(path, &self.content, false)
        };
        opened.map_err(|source| PackError::InvalidMod {
            name: self.name.clone(),
            source,
        })
    }
}

/// A bundle of mod files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModPack {
    /// Pack properties
    pub properties: Properties,
    /// Bundled mods in payload order
    pub entries: Vec<PackEntry>,
}

impl ModPack {
    /// Empty pack by `author`
    pub fn new(author: &str) -> Self {
        let mut pack = Self::default();
        pack.set_author(author);
        pack
    }

    /// Pack author
    pub fn author(&self) -> Option<&str> {
        self.properties.value(tmod::keys::AUTHOR)
    }

    /// Set the pack author
    pub fn set_author(&mut self, author: &str) {
        self.properties.set(tmod::keys::AUTHOR, author);
    }

    /// Add a mod file; its name must fit a one-byte length
    pub fn add_mod(&mut self, name: &str, content: Vec<u8>) -> PackResult<()> {
        if name.len() > MAX_PATH_LEN {
            return Err(ContainerError::PathTooLong(name.to_string()).into());
        }
        self.entries.push(PackEntry {
            name: name.to_string(),
            content,
        });
        Ok(())
    }

    /// Validate and serialize the pack
    pub fn compile(&self) -> PackResult<Vec<u8>> {
        if self.entries.is_empty() {
            return Err(PackError::Empty);
        }
        if self.author().is_none_or(|author| author.trim().is_empty()) {
            return Err(PackError::MissingProperty(tmod::keys::AUTHOR.to_string()));
        }

        let mut offset = 0u64;
        let mut records = Vec::with_capacity(self.entries.len());
        let mut payload = Vec::new();
        for entry in &self.entries {
            records.push(FileEntry {
                path: entry.name.clone(),
                index: 0,
                offset,
                size: entry.content.len() as u64,
                checksum: u64::from(native_hash(&entry.content)),
            });
            offset += entry.content.len() as u64;
            payload.extend_from_slice(&entry.content);
        }

        let mut output = header::write_header(CONTAINER_VERSION, &self.properties, &records)?;
        output.extend_from_slice(&compression::compress(&payload));
        Ok(output)
    }

    /// Parse a pack
    pub fn parse(data: &[u8]) -> PackResult<Self> {
        let header = header::read_header(data)?;
        let required = header.required_payload()?;

        let stream = if required == 0 {
            Vec::new()
        } else {
            compression::decompress_at_least(&data[header.header_size..], required)?.data
        };

        let entries = header
            .entries
            .iter()
            .map(|record| {
                let start = record.offset as usize;
                let end = start + record.size as usize;
                PackEntry {
                    name: record.path.clone(),
                    content: stream[start..end].to_vec(),
                }
            })
            .collect();

        Ok(Self {
            properties: header.properties,
            entries,
        })
    }

    /// Open every bundled mod
    pub fn containers(&self) -> PackResult<Vec<ModContainer>> {
        self.entries.iter().map(PackEntry::open).collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tmod::ContainerFile;
    use pretty_assertions::assert_eq;

    fn compiled_mod(title: &str, path: &str, content: &[u8]) -> Vec<u8> {
        let mut container = ModContainer::with_identity(title, "Alice");
        container.add_file(ContainerFile::new(path, content.to_vec()).expect("path"));
        container.compile().expect("compile")
    }

    #[test]
    fn test_pack_round_trip() {
        let mut pack = ModPack::new("Bob");
        pack.add_mod("Hat.tmod", compiled_mod("Hat", "models/hat.blueprint", b"hat"))
            .expect("add");
        pack.add_mod("Hud.tmod", compiled_mod("Hud", "ui/hud.swf", b"hud!!"))
            .expect("add");

        let bytes = pack.compile().expect("compile");
        let parsed = ModPack::parse(&bytes).expect("parse");
        assert_eq!(parsed, pack);

        let containers = parsed.containers().expect("containers");
        let names: Vec<_> = containers.iter().filter_map(ModContainer::name).collect();
        assert_eq!(names, vec!["Hat", "Hud"]);
        assert!(containers[1].is_ui_mod());
    }

    #[test]
    fn test_records_are_unpadded_with_whole_mod_checksums() {
        let mut pack = ModPack::new("Bob");
        pack.add_mod("a.tmod", b"abc".to_vec()).expect("add");
        pack.add_mod("b.tmod", b"defgh".to_vec()).expect("add");

        let bytes = pack.compile().expect("compile");
        let header = header::read_header(&bytes).expect("header");

        assert_eq!(header.entries[0].offset, 0);
        assert_eq!(header.entries[1].offset, 3);
        assert_eq!(header.entries[0].checksum, 0x7F59_7252);
    }

    #[test]
    fn test_compile_requires_mods_and_author() {
        assert!(matches!(ModPack::new("Bob").compile(), Err(PackError::Empty)));

        let mut pack = ModPack::default();
        pack.add_mod("a.tmod", b"x".to_vec()).expect("add");
        assert!(matches!(
            pack.compile(),
            Err(PackError::MissingProperty(name)) if name == "author"
        ));
    }

    #[test]
    fn test_invalid_bundled_mod() {
        let mut pack = ModPack::new("Bob");
        pack.add_mod("broken.tmod", vec![0xFF; 16]).expect("add");
        let parsed = ModPack::parse(&pack.compile().expect("compile")).expect("parse");

        assert!(matches!(
            parsed.containers(),
            Err(PackError::InvalidMod { name, .. }) if name == "broken.tmod"
        ));
    }
}
