//! Zip mod containers
//!
//! A ZMod is a plain zip archive. Every non-directory entry is a file of the
//! mod; there is no property table, so the title comes from the archive's
//! file name. Compiled zips carry an informational `metadata.toml`.

use crate::hash::content_hash;
use crate::tmod::{
    CONTAINER_VERSION, ContainerError, ContainerFile, ContainerFormat, ContainerResult,
    ModContainer, Properties,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the metadata entry written by [`compile_zip`]
pub const METADATA_FILE: &str = "metadata.toml";

const DISABLED_SUFFIX: &str = ".disabled";
const ZIP_SUFFIX: &str = ".zip";

/// Contents of `metadata.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipMetadata {
    /// Mod title
    pub name: String,
    /// Virtual paths of the embedded files
    pub files: Vec<String>,
    /// Property table
    pub properties: BTreeMap<String, String>,
}

/// Title of a zip mod derived from its file name
///
/// `Cool Hat.zip.disabled` and `Cool Hat.zip` both give `Cool Hat`.
pub fn zip_title(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(DISABLED_SUFFIX).unwrap_or(&name);
    name.strip_suffix(ZIP_SUFFIX).unwrap_or(name).to_string()
}

/// Parse a zip mod
pub fn parse_zip(path: &Path, data: &[u8]) -> ContainerResult<ModContainer> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let mut files = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| ContainerError::Zip(e.into()))?;
        files.push(ContainerFile::new(entry.name(), content)?);
    }

    let mut properties = Properties::default();
    properties.set(crate::tmod::keys::TITLE, zip_title(path));

    let mut container = ModContainer::from_parts(
        ContainerFormat::ZMod,
        path,
        CONTAINER_VERSION,
        properties,
        files,
        Vec::new(),
        content_hash(data),
    );
    container.reorder_files();

    Ok(container)
}

/// Build the metadata document for `container`
pub fn metadata(container: &ModContainer) -> ContainerResult<String> {
    let document = ZipMetadata {
        name: container.name().unwrap_or_default().to_string(),
        files: container
            .files()
            .iter()
            .map(ContainerFile::path)
            .filter(|path| *path != METADATA_FILE)
            .map(str::to_string)
            .collect(),
        properties: container
            .properties()
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect(),
    };
    toml::to_string(&document).map_err(|e| ContainerError::Metadata(e.to_string()))
}

/// Validate and write `container` as a deflated zip with `metadata.toml`
pub fn compile_zip(container: &ModContainer) -> ContainerResult<Vec<u8>> {
    container.validate()?;
    let metadata = metadata(container)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for file in container.files() {
        if file.path() == METADATA_FILE {
            continue;
        }
        writer.start_file(file.path(), options)?;
        writer
            .write_all(file.content())
            .map_err(|e| ContainerError::Zip(e.into()))?;
    }

    writer.start_file(METADATA_FILE, options)?;
    writer
        .write_all(metadata.as_bytes())
        .map_err(|e| ContainerError::Zip(e.into()))?;

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> ModContainer {
        let mut container = ModContainer::with_identity("Cool Hat", "Alice");
        container.add_file(ContainerFile::new("models/hat.blueprint", b"blueprint".to_vec()).expect("path"));
        container.add_file(ContainerFile::new("ui/hud.swf", b"swf".to_vec()).expect("path"));
        container
    }

    #[test]
    fn test_zip_title() {
        assert_eq!(zip_title(Path::new("mods/Cool Hat.zip")), "Cool Hat");
        assert_eq!(zip_title(Path::new("Cool Hat.zip.disabled")), "Cool Hat");
        assert_eq!(zip_title(Path::new("plain")), "plain");
    }

    #[test]
    fn test_compile_and_parse() {
        let bytes = compile_zip(&sample()).expect("compile");
        let parsed = parse_zip(Path::new("Cool Hat.zip"), &bytes).expect("parse");

        assert_eq!(parsed.format, ContainerFormat::ZMod);
        assert_eq!(parsed.name(), Some("Cool Hat"));
        assert_eq!(parsed.properties().len(), 1);

        let paths: Vec<&str> = parsed.files().iter().map(ContainerFile::path).collect();
        assert_eq!(
            paths,
            vec!["models/hat.blueprint", "ui/hud.swf", METADATA_FILE]
        );
        assert_eq!(parsed.file("ui/hud.swf").expect("swf").content(), b"swf");
        assert!(!parsed.content_files().contains(&METADATA_FILE));
        assert_eq!(parsed.content_hash(), Some(content_hash(&bytes).as_str()));
    }

    #[test]
    fn test_metadata_document() {
        let bytes = compile_zip(&sample()).expect("compile");
        let parsed = parse_zip(Path::new("x.zip"), &bytes).expect("parse");
        let raw = parsed.file(METADATA_FILE).expect("metadata entry").content();

        let document: ZipMetadata =
            toml::from_str(std::str::from_utf8(raw).expect("utf-8")).expect("toml");
        assert_eq!(document.name, "Cool Hat");
        assert_eq!(document.files.len(), 2);
        assert_eq!(document.properties.get("author").map(String::as_str), Some("Alice"));
    }

    #[test]
    fn test_compile_requires_author() {
        let mut container = sample();
        container.remove_property("author");
        assert!(matches!(
            compile_zip(&container),
            Err(ContainerError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_directories_skipped() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.add_directory("UI/", options).expect("dir");
        writer.start_file("UI/Hud.swf", options).expect("file");
        writer.write_all(b"x").expect("write");
        let bytes = writer.finish().expect("finish").into_inner();

        let parsed = parse_zip(Path::new("a.zip"), &bytes).expect("parse");
        assert_eq!(parsed.files().len(), 1);
        assert_eq!(parsed.files()[0].path(), "ui/hud.swf");
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            parse_zip(Path::new("a.zip"), b"definitely not a zip"),
            Err(ContainerError::Zip(_))
        ));
    }
}
