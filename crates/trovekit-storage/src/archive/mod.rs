//! Game archive reader
//!
//! Every asset directory of the game holds one `index.tfi` and a set of
//! `archiveN.tfa` blobs. The index is a run of records with no count or
//! framing:
//!
//! ```text
//! repeated until EOF:
//!   varint  name_length
//!   bytes   name
//!   varint  archive_index
//!   varint  offset
//!   varint  size
//!   varint  hash
//! ```
//!
//! Each blob is a deflate stream holding the concatenated contents of the
//! records whose `archive_index` matches the blob's number. Everything is
//! read lazily and cached; see [`GameIndex`] and [`GameBlob`].

mod blob;
mod file;
mod index;

pub use blob::GameBlob;
pub use file::{ArchiveFile, ArchiveFileRecord};
pub use index::GameIndex;

use crate::{Result, StorageError};
use std::path::Path;
use trovekit_formats::reader::{ByteReader, ReadError};
use trovekit_formats::varint::VarIntError;

/// Decode every record of an index
///
/// `index_path` is used for error reporting; record paths are `directory`
/// joined with each name. Varint fields are masked to 32 bits, matching the
/// game's own reader.
pub fn parse_index(
    data: &[u8],
    index_path: &Path,
    directory: &Path,
) -> Result<Vec<ArchiveFileRecord>> {
    let mut reader = ByteReader::new(data);
    let mut records = Vec::new();

    while !reader.is_at_end() {
        let start = reader.pos();
        let record = read_record(&mut reader, directory).map_err(|e| match e {
            ReadError::VarInt(source @ VarIntError::Malformed { .. }) => StorageError::VarInt {
                path: index_path.to_path_buf(),
                source,
            },
            _ => StorageError::TruncatedIndex {
                path: index_path.to_path_buf(),
                offset: start,
            },
        })?;
        records.push(record);
    }

    Ok(records)
}

fn read_record(
    reader: &mut ByteReader<'_>,
    directory: &Path,
) -> std::result::Result<ArchiveFileRecord, ReadError> {
    let name_len = reader.read_varint_len()?;
    let name = String::from_utf8_lossy(reader.read_bytes(name_len)?).into_owned();
    let archive_index = reader.read_varint()? as u32;
    let offset = reader.read_varint()? as u32;
    let size = reader.read_varint()? as u32;
    let hash = reader.read_varint()? as u32;

    Ok(ArchiveFileRecord {
        path: directory.join(&name),
        name,
        archive_index,
        offset,
        size,
        hash,
    })
}

/// Ordinal of an archive from its file stem: `archive3` gives 3
pub fn archive_ordinal(stem: &str) -> Option<u32> {
    let digits = stem.strip_prefix("archive")?;
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for index and archive fixtures

    use trovekit_formats::varint;

    /// One index record: name, archive, offset, size, hash
    pub fn record(name: &str, archive: u64, offset: u64, size: u64, hash: u64) -> Vec<u8> {
        let mut out = Vec::new();
        varint::encode_into(name.len() as u64, &mut out);
        out.extend_from_slice(name.as_bytes());
        for value in [archive, offset, size, hash] {
            varint::encode_into(value, &mut out);
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::test_support::record;
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_parse_records() {
        let mut data = record("a.dds", 0, 0, 5, 0xDEAD_BEEF);
        data.extend(record("b.dds", 1, 8, 3, 1));

        let records = parse_index(&data, Path::new("ui/index.tfi"), Path::new("ui")).expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a.dds");
        assert_eq!(records[0].path, PathBuf::from("ui/a.dds"));
        assert_eq!(records[0].hash, 0xDEAD_BEEF);
        assert_eq!(records[1].archive_index, 1);
        assert_eq!(records[1].offset, 8);
    }

    #[test]
    fn test_hash_masked_to_32_bits() {
        let data = record("a", 0, 0, 0, 0x1_0000_0007);
        let records = parse_index(&data, Path::new("index.tfi"), Path::new("")).expect("parse");
        assert_eq!(records[0].hash, 7);
    }

    #[test]
    fn test_trailing_partial_record() {
        let mut data = record("a.dds", 0, 0, 5, 1);
        let first_len = data.len();
        let second = record("b.dds", 0, 8, 3, 2);
        data.extend_from_slice(&second[..second.len() - 1]);

        let err = parse_index(&data, Path::new("index.tfi"), Path::new("")).unwrap_err();
        assert!(matches!(
            err,
            StorageError::TruncatedIndex { offset, .. } if offset == first_len
        ));
    }

    #[test]
    fn test_overlong_varint() {
        let data = [0xFFu8; 11];
        let err = parse_index(&data, Path::new("index.tfi"), Path::new("")).unwrap_err();
        assert!(matches!(err, StorageError::VarInt { .. }));
    }

    #[test]
    fn test_empty_index() {
        let records = parse_index(&[], Path::new("index.tfi"), Path::new("")).expect("parse");
        assert!(records.is_empty());
    }

    #[test]
    fn test_archive_ordinal() {
        assert_eq!(archive_ordinal("archive0"), Some(0));
        assert_eq!(archive_ordinal("archive12"), Some(12));
        assert_eq!(archive_ordinal("archive3_old"), Some(3));
        assert_eq!(archive_ordinal("archive"), None);
        assert_eq!(archive_ordinal("index"), None);
    }
}
