//! TMod binary mod containers
//!
//! A TMod is a header (properties plus one record per file) followed by a
//! compressed payload holding every file's content, each padded to a 4-byte
//! boundary. See [`header`] for the header layout and
//! [`compression`](crate::compression) for the payload framing.

mod container;
pub mod error;
pub mod header;
mod property;

pub use container::{
    ContainerFile, ContainerFormat, FILE_ALIGNMENT, MAX_PATH_LEN, ModContainer,
    REQUIRED_PROPERTIES, keys, normalize_path,
};
pub use error::{ContainerError, ContainerResult};
pub use header::{CONTAINER_VERSION, FileEntry, Header};
pub use property::{Properties, Property};

use crate::compression::{self, Framing};
use crate::hash::content_hash;
use std::path::Path;
use tracing::debug;

/// Parse a TMod container
///
/// With `partial` set only the header is decoded: properties and
/// [`entries`](ModContainer::entries) are available, but no file content is
/// resolved and the payload is never decompressed. `data` may then be just
/// the header bytes.
pub fn parse(path: &Path, data: &[u8], partial: bool) -> ContainerResult<ModContainer> {
    let header = header::read_header(data)?;

    let files = if partial {
        Vec::new()
    } else {
        resolve_files(path, &header, &data[header.header_size..])?
    };

    Ok(ModContainer::from_parts(
        ContainerFormat::TMod,
        path,
        header.version,
        header.properties,
        files,
        header.entries,
        content_hash(data),
    ))
}

fn resolve_files(
    path: &Path,
    header: &Header,
    payload: &[u8],
) -> ContainerResult<Vec<ContainerFile>> {
    let required = header.required_payload()?;

    let stream = if required == 0 {
        Vec::new()
    } else {
        let inflated = compression::decompress_at_least(payload, required).map_err(|e| {
            ContainerError::Malformed(format!(
                "payload cannot supply {required} bytes: {e}"
            ))
        })?;
        if inflated.framing == Framing::Manual {
            debug!("Read {} with manual payload framing", path.display());
        }
        inflated.data
    };

    header
        .entries
        .iter()
        .map(|entry| {
            // Bounded by `required`, which fits in usize
            let start = entry.offset as usize;
            let end = start + entry.size as usize;
            Ok(ContainerFile::from_entry(entry, stream[start..end].to_vec()))
        })
        .collect()
}

/// Serialize a container to the TMod format
///
/// Offsets are reassigned from the current file order first. No validation is
/// performed; use [`ModContainer::compile`] for the checked build path.
pub fn serialize(container: &mut ModContainer) -> ContainerResult<Vec<u8>> {
    container.reorder_files();

    let entries: Vec<FileEntry> = container.files().iter().map(ContainerFile::entry).collect();
    let header = header::write_header(container.version, container.properties(), &entries)?;

    let payload_len: usize = container.files().iter().map(ContainerFile::padded_size).sum();
    let mut payload = Vec::with_capacity(payload_len);
    for file in container.files() {
        payload.extend_from_slice(&file.padded_content());
    }
    let compressed = compression::compress(&payload);

    let mut output = header;
    output.extend_from_slice(&compressed);

    container.set_entries(entries);
    Ok(output)
}
