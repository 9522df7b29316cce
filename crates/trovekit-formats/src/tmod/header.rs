//! TMod header codec
//!
//! The header is shared by mod containers and packs:
//!
//! ```text
//! u64 LE   header_size (whole header, including this field)
//! u16 LE   version
//! u16 LE   property_count
//! property_count x (varint name_len, name, varint value_len, value)
//! until header_size: (u8 name_len, name, varint index, offset, size, checksum)
//! ```

use super::error::{ContainerError, ContainerResult};
use super::property::{Properties, Property};
use crate::reader::ByteReader;
use crate::varint;
use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};

/// Current container version
pub const CONTAINER_VERSION: u16 = 1;

/// Fixed-size start of every header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Preamble {
    /// Total header length in bytes
    pub header_size: u64,
    /// Container version
    pub version: u16,
    /// Number of properties that follow
    pub property_count: u16,
}

impl Preamble {
    /// Encoded size of the preamble
    pub const SIZE: usize = 12;

    /// Decode the preamble from the start of `data`
    pub fn parse(data: &[u8]) -> ContainerResult<Self> {
        if data.len() < Self::SIZE {
            return Err(ContainerError::Malformed(format!(
                "{} bytes is too short for a header",
                data.len()
            )));
        }
        Ok(Self::read(&mut Cursor::new(&data[..Self::SIZE]))?)
    }

    /// Encode the preamble
    pub fn build(&self) -> ContainerResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// One file record as stored in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Virtual path of the file
    pub path: String,
    /// Stream index, always 0 on write
    pub index: u64,
    /// Offset in the decompressed payload
    pub offset: u64,
    /// Unpadded size in bytes
    pub size: u64,
    /// Native checksum of the content
    pub checksum: u64,
}

impl FileEntry {
    /// End of the file's content in the decompressed payload
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }
}

/// Decoded header region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Total header length in bytes
    pub header_size: usize,
    /// Container version
    pub version: u16,
    /// Properties in stored order
    pub properties: Properties,
    /// File records in stored order
    pub entries: Vec<FileEntry>,
}

impl Header {
    /// Bytes of payload the entries require after decompression
    pub fn required_payload(&self) -> ContainerResult<usize> {
        let mut required = 0u64;
        for entry in &self.entries {
            let end = entry.end().ok_or_else(|| {
                ContainerError::Malformed(format!("entry {} overflows", entry.path))
            })?;
            required = required.max(end);
        }
        usize::try_from(required).map_err(|_| {
            ContainerError::Malformed(format!("payload of {required} bytes cannot be addressed"))
        })
    }
}

/// Read the header at the start of `data`
pub fn read_header(data: &[u8]) -> ContainerResult<Header> {
    let preamble = Preamble::parse(data)?;

    let header_size = usize::try_from(preamble.header_size)
        .ok()
        .filter(|&size| size >= Preamble::SIZE && size <= data.len())
        .ok_or_else(|| {
            ContainerError::Malformed(format!(
                "header size {} does not fit a buffer of {} bytes",
                preamble.header_size,
                data.len()
            ))
        })?;

    // Every read is confined to the declared header region
    let mut reader = ByteReader::at(&data[..header_size], Preamble::SIZE);

    let mut properties = Properties::with_capacity(usize::from(preamble.property_count));
    for _ in 0..preamble.property_count {
        let name = reader.read_varint_str()?;
        let value = reader.read_varint_str()?;
        properties.push(Property::new(name, value));
    }

    let mut entries = Vec::new();
    while !reader.is_at_end() {
        let name_len = usize::from(reader.read_u8()?);
        let path = reader.read_str(name_len)?.to_string();
        entries.push(FileEntry {
            path,
            index: reader.read_varint()?,
            offset: reader.read_varint()?,
            size: reader.read_varint()?,
            checksum: reader.read_varint()?,
        });
    }

    Ok(Header {
        header_size,
        version: preamble.version,
        properties,
        entries,
    })
}

/// Build a header for `properties` and `entries`
///
/// The length field is written as zero, then patched once the header is
/// complete.
pub fn write_header(
    version: u16,
    properties: &Properties,
    entries: &[FileEntry],
) -> ContainerResult<Vec<u8>> {
    let property_count = u16::try_from(properties.len())
        .map_err(|_| ContainerError::TooManyProperties(properties.len()))?;

    let mut buffer = Preamble {
        header_size: 0,
        version,
        property_count,
    }
    .build()?;

    for property in properties.iter() {
        write_varint_str(&property.name, &mut buffer);
        write_varint_str(&property.value, &mut buffer);
    }

    for entry in entries {
        let name_len = u8::try_from(entry.path.len())
            .map_err(|_| ContainerError::PathTooLong(entry.path.clone()))?;
        buffer.push(name_len);
        buffer.extend_from_slice(entry.path.as_bytes());
        varint::encode_into(entry.index, &mut buffer);
        varint::encode_into(entry.offset, &mut buffer);
        varint::encode_into(entry.size, &mut buffer);
        varint::encode_into(entry.checksum, &mut buffer);
    }

    let header_size = buffer.len() as u64;
    buffer[..8].copy_from_slice(&header_size.to_le_bytes());

    Ok(buffer)
}

fn write_varint_str(value: &str, out: &mut Vec<u8>) {
    varint::encode_into(value.len() as u64, out);
    out.extend_from_slice(value.as_bytes());
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_properties() -> Properties {
        let mut properties = Properties::default();
        properties.set("title", "Test Mod");
        properties.set("author", "Alice");
        properties
    }

    fn sample_entry() -> FileEntry {
        FileEntry {
            path: "ui/config.cfg".to_string(),
            index: 0,
            offset: 0,
            size: 5,
            checksum: 0xBA32_4028,
        }
    }

    #[test]
    fn test_preamble_layout() {
        let bytes = Preamble {
            header_size: 0x1234,
            version: 1,
            property_count: 2,
        }
        .build()
        .expect("preamble should encode");

        assert_eq!(
            bytes,
            vec![0x34, 0x12, 0, 0, 0, 0, 0, 0, 0x01, 0x00, 0x02, 0x00]
        );
        assert_eq!(Preamble::parse(&bytes).expect("decode").header_size, 0x1234);
    }

    #[test]
    fn test_header_round_trip() {
        let properties = sample_properties();
        let entries = vec![sample_entry()];

        let bytes = write_header(CONTAINER_VERSION, &properties, &entries).expect("write");
        let header = read_header(&bytes).expect("read");

        assert_eq!(header.header_size, bytes.len());
        assert_eq!(header.version, CONTAINER_VERSION);
        assert_eq!(header.properties, properties);
        assert_eq!(header.entries, entries);
    }

    #[test]
    fn test_header_size_is_patched() {
        let bytes = write_header(CONTAINER_VERSION, &sample_properties(), &[]).expect("write");
        let declared = u64::from_le_bytes(bytes[..8].try_into().expect("eight bytes"));
        assert_eq!(declared, bytes.len() as u64);
    }

    #[test]
    fn test_header_size_past_end() {
        let mut bytes = write_header(CONTAINER_VERSION, &sample_properties(), &[]).expect("write");
        let too_big = (bytes.len() as u64 + 1).to_le_bytes();
        bytes[..8].copy_from_slice(&too_big);

        assert!(matches!(
            read_header(&bytes),
            Err(ContainerError::Malformed(_))
        ));
    }

    #[test]
    fn test_entry_crossing_header_end() {
        let mut bytes =
            write_header(CONTAINER_VERSION, &sample_properties(), &[sample_entry()]).expect("write");
        // Shrink the declared header so the record is cut in half
        let short = (bytes.len() as u64 - 3).to_le_bytes();
        bytes[..8].copy_from_slice(&short);

        assert!(matches!(
            read_header(&bytes),
            Err(ContainerError::Malformed(_))
        ));
    }

    #[test]
    fn test_path_too_long() {
        let mut entry = sample_entry();
        entry.path = "a".repeat(256);

        assert!(matches!(
            write_header(CONTAINER_VERSION, &Properties::default(), &[entry]),
            Err(ContainerError::PathTooLong(_))
        ));
    }

    #[test]
    fn test_short_buffer() {
        assert!(matches!(
            read_header(&[0u8; 4]),
            Err(ContainerError::Malformed(_))
        ));
    }
}
