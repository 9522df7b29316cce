//! Container error types

use crate::compression::CompressionError;
use crate::reader::ReadError;
use crate::varint::VarIntError;
use thiserror::Error;

/// Errors produced while reading, validating or writing mod containers
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Header or payload does not describe a valid container
    #[error("malformed container: {0}")]
    Malformed(String),

    /// A varint in the header exceeds 64 bits
    #[error("malformed varint in container header: {0}")]
    VarInt(#[from] VarIntError),

    /// A required property is absent
    #[error("property \"{0}\" is missing")]
    MissingProperty(String),

    /// A required property is present but empty
    #[error("property \"{0}\" has no value")]
    PropertyMalformed(String),

    /// Compiling a container with no files
    #[error("no files to compile")]
    NoFiles,

    /// A path property names a file the container does not hold
    #[error("property \"{property}\" points to \"{path}\", which is not in the container")]
    DanglingPath {
        /// Property name
        property: String,
        /// Path stored in the property
        path: String,
    },

    /// File names are stored with a one-byte length
    #[error("path is longer than 255 bytes: {0}")]
    PathTooLong(String),

    /// Property count is stored as a u16
    #[error("too many properties: {0}")]
    TooManyProperties(usize),

    /// Zip container could not be read or written
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Zip metadata could not be produced
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Payload compression failed
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// Fixed-size preamble could not be encoded or decoded
    #[error("binary format error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl From<ReadError> for ContainerError {
    fn from(error: ReadError) -> Self {
        match error {
            ReadError::VarInt(e @ VarIntError::Malformed { .. }) => Self::VarInt(e),
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// Result type for container operations
pub type ContainerResult<T> = Result<T, ContainerError>;
