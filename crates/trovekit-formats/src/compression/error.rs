//! Compression error types

use thiserror::Error;

/// Errors produced while inflating a stream
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The standard inflate decoder rejected the stream
    #[error("inflate failed: {0}")]
    Inflate(String),

    /// Neither the standard decoder nor the manual framing could read the stream
    #[error("corrupt archive stream: {0}")]
    CorruptArchive(String),

    /// The stream decoded, but to fewer bytes than the caller requires
    #[error("stream decoded to {available} bytes, {needed} required")]
    Insufficient {
        /// Bytes required by the caller
        needed: usize,
        /// Bytes the best decoding produced
        available: usize,
    },

    /// Output exceeded [`super::MAX_DECOMPRESSION_SIZE`]
    #[error("decompressed size exceeds limit of {0} bytes")]
    SizeLimit(usize),
}

/// Result type for compression operations
pub type CompressionResult<T> = Result<T, CompressionError>;
