//! Chunked deflate streams
//!
//! TMod payloads and game archives are zlib-framed deflate streams with a
//! particular shape: every 32 KiB chunk of input is one non-final stored
//! block, and the stream ends with a single sync flush instead of a final
//! block and Adler-32 trailer. The game's loader expects exactly this framing,
//! so [`compress`] writes the blocks itself, byte for byte.
//!
//! Decoding tries a standard inflate first and only falls back to the
//! [manual framing](manual) when the standard decoder rejects the stream (or,
//! for containers, cannot produce enough bytes).
//!
//! ```
//! use trovekit_formats::compression::{Framing, compress, decompress};
//!
//! let stream = compress(b"hello\0\0\0");
//! let inflated = decompress(&stream)?;
//! assert_eq!(inflated.data, b"hello\0\0\0");
//! assert_eq!(inflated.framing, Framing::Standard);
//! # Ok::<(), trovekit_formats::compression::CompressionError>(())
//! ```

mod error;
pub mod manual;

pub use error::{CompressionError, CompressionResult};
pub use manual::{manual_compress, manual_decompress};

use flate2::{Decompress, FlushDecompress, Status};
use tracing::debug;

/// Input chunk size fed to the compressor
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Maximum allowed decompression size (1 GB)
///
/// Limits output so a hostile container cannot exhaust memory.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Output growth step while streaming
const RESERVE_STEP: usize = CHUNK_SIZE + 1024;

/// zlib header of a stored-level stream
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0x01];

/// Empty non-final stored block written by a sync flush
pub const SYNC_FLUSH: [u8; 5] = [0x00, 0x00, 0x00, 0xFF, 0xFF];

/// Non-final stored block header byte (BFINAL 0, BTYPE 00, padding)
const STORED_BLOCK: u8 = 0x00;

/// LEN/NLEN pair plus the leading header byte
const STORED_BLOCK_OVERHEAD: usize = 5;

/// Which decoder produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Standard zlib/deflate decoding
    Standard,
    /// Positional recovery of manually framed stored blocks
    Manual,
}

/// Decompressed payload and the framing that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inflated {
    /// Decompressed bytes
    pub data: Vec<u8>,
    /// Decoder that produced `data`
    pub framing: Framing,
}

/// Compress `data` into the game's chunked, sync-flush-terminated framing
///
/// Each chunk of up to [`CHUNK_SIZE`] bytes becomes one stored block, which is
/// what a level-0 zlib compressor emits when fed one chunk per call and
/// sync-flushed at the end.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let blocks = data.len().div_ceil(CHUNK_SIZE);
    let mut output = Vec::with_capacity(
        ZLIB_HEADER.len() + data.len() + blocks * STORED_BLOCK_OVERHEAD + SYNC_FLUSH.len(),
    );

    output.extend_from_slice(&ZLIB_HEADER);
    for chunk in data.chunks(CHUNK_SIZE) {
        // CHUNK_SIZE fits LEN's 16 bits
        let len = chunk.len() as u16;
        output.push(STORED_BLOCK);
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&(!len).to_le_bytes());
        output.extend_from_slice(chunk);
    }
    output.extend_from_slice(&SYNC_FLUSH);

    output
}

/// Inflate with the standard decoder only
///
/// Streams without a final block are accepted; decoding stops when the input
/// is exhausted.
pub fn decompress_standard(data: &[u8]) -> CompressionResult<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut output = Vec::with_capacity(data.len().saturating_mul(2).max(RESERVE_STEP));

    loop {
        if output.capacity() - output.len() < RESERVE_STEP {
            output.reserve(RESERVE_STEP);
        }

        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let status = inflater
            .decompress_vec(&data[consumed..], &mut output, FlushDecompress::None)
            .map_err(|e| CompressionError::Inflate(e.to_string()))?;

        if output.len() > MAX_DECOMPRESSION_SIZE {
            return Err(CompressionError::SizeLimit(MAX_DECOMPRESSION_SIZE));
        }

        let progressed =
            inflater.total_in() as usize != consumed || inflater.total_out() != produced;
        let input_done = inflater.total_in() as usize >= data.len();

        if status == Status::StreamEnd
            || !progressed
            || (input_done && output.len() < output.capacity())
        {
            break;
        }
    }

    Ok(output)
}

/// Inflate, falling back to the manual framing when the standard decoder fails
pub fn decompress(data: &[u8]) -> CompressionResult<Inflated> {
    decompress_at_least(data, 0)
}

/// Inflate and require at least `min_len` bytes of output
///
/// A standard decoding that errors or comes up short is retried with the
/// manual framing. The standard result always wins when it is long enough.
pub fn decompress_at_least(data: &[u8], min_len: usize) -> CompressionResult<Inflated> {
    let standard_failure = match decompress_standard(data) {
        Ok(output) if output.len() >= min_len => {
            return Ok(Inflated {
                data: output,
                framing: Framing::Standard,
            });
        }
        Ok(output) => {
            debug!(
                "Standard inflate produced {} of {} required bytes, trying manual framing",
                output.len(),
                min_len
            );
            StandardFailure::Short(output.len())
        }
        Err(e) => {
            debug!("Standard inflate failed ({}), trying manual framing", e);
            StandardFailure::Rejected(e)
        }
    };

    let output = manual_decompress(data).map_err(|manual| {
        CompressionError::CorruptArchive(format!("{standard_failure}; manual framing: {manual}"))
    })?;

    if output.len() < min_len {
        return Err(CompressionError::Insufficient {
            needed: min_len,
            available: output.len().max(standard_failure.produced()),
        });
    }

    Ok(Inflated {
        data: output,
        framing: Framing::Manual,
    })
}

enum StandardFailure {
    Short(usize),
    Rejected(CompressionError),
}

impl StandardFailure {
    const fn produced(&self) -> usize {
        match self {
            Self::Short(len) => *len,
            Self::Rejected(_) => 0,
        }
    }
}

impl std::fmt::Display for StandardFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short(len) => write!(f, "standard inflate produced only {len} bytes"),
            Self::Rejected(e) => write!(f, "standard {e}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31) % 253) as u8).collect()
    }

    #[test]
    fn test_round_trip_chunk_boundaries() {
        for len in [0, 1, 32767, 32768, 32769, 100_000] {
            let data = pattern(len);
            let stream = compress(&data);
            let inflated = decompress(&stream).expect("decompress should succeed");

            assert_eq!(inflated.framing, Framing::Standard, "length {len}");
            assert_eq!(inflated.data.len(), len);
            assert!(inflated.data == data, "content mismatch for length {len}");
        }
    }

    /// Stream a level-0 zlib compressor writes for `data` fed in 32 KiB calls
    /// and then sync-flushed
    fn reference_stream(data: &[u8], block_headers: &[[u8; 5]]) -> Vec<u8> {
        let mut expected = vec![0x78, 0x01];
        for (chunk, header) in data.chunks(CHUNK_SIZE).zip(block_headers) {
            expected.extend_from_slice(header);
            expected.extend_from_slice(chunk);
        }
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0xFF, 0xFF]);
        expected
    }

    #[test]
    fn test_empty_stream_bytes() {
        assert_eq!(compress(b""), vec![0x78, 0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_single_byte_stream_bytes() {
        assert_eq!(
            compress(&[0xAB]),
            vec![
                0x78, 0x01, 0x00, 0x01, 0x00, 0xFE, 0xFF, 0xAB, 0x00, 0x00, 0x00, 0xFF, 0xFF
            ]
        );
    }

    #[test]
    fn test_stream_bytes_at_chunk_boundaries() {
        let cases: [(usize, &[[u8; 5]]); 3] = [
            (32767, &[[0x00, 0xFF, 0x7F, 0x00, 0x80]]),
            (32768, &[[0x00, 0x00, 0x80, 0xFF, 0x7F]]),
            (
                32769,
                &[[0x00, 0x00, 0x80, 0xFF, 0x7F], [0x00, 0x01, 0x00, 0xFE, 0xFF]],
            ),
        ];

        for (len, headers) in cases {
            let data = pattern(len);
            let stream = compress(&data);
            assert_eq!(stream.len(), 2 + len + 5 * headers.len() + 5, "length {len}");
            assert!(
                stream == reference_stream(&data, headers),
                "stream bytes differ for length {len}"
            );
        }
    }

    #[test]
    fn test_full_chunk_matches_manual_header() {
        let stream = compress(&pattern(CHUNK_SIZE * 3));
        assert_eq!(&stream[..7], &manual::MANUAL_HEADER);
        let second = 7 + CHUNK_SIZE;
        assert_eq!(&stream[second..second + 5], &manual::CHUNK_MARKER);
    }

    #[test]
    fn test_manual_fallback_only_on_failure() {
        let data = pattern(CHUNK_SIZE * 2 + 77);
        let mut framed = manual_compress(&data);
        // Break the zlib header so the standard decoder refuses the stream
        framed[0] = 0x00;

        let inflated = decompress(&framed).expect("manual fallback should recover");
        assert_eq!(inflated.framing, Framing::Manual);
        assert!(inflated.data == data);
    }

    #[test]
    fn test_standard_preferred_when_sufficient() {
        let stream = compress(b"payload");
        let inflated = decompress_at_least(&stream, 7).expect("decompress");
        assert_eq!(inflated.framing, Framing::Standard);
    }

    #[test]
    fn test_short_final_chunk_reads_without_error() {
        // The last stored block declares a full chunk, so the standard decoder
        // runs out of input instead of failing
        let data = pattern(CHUNK_SIZE + 100);
        let framed = manual_compress(&data);

        let standard = decompress_standard(&framed).expect("no hard error");
        assert!(standard.starts_with(&data));
    }

    #[test]
    fn test_insufficient_output() {
        let stream = compress(b"short");
        let needed = 1_000_000;
        assert!(matches!(
            decompress_at_least(&stream, needed),
            Err(CompressionError::Insufficient { needed: n, .. }) if n == needed
        ));
    }

    #[test]
    fn test_corrupt_stream() {
        let garbage = [0x00, 0x01, 0x02];
        assert!(matches!(
            decompress(&garbage),
            Err(CompressionError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_standard_rejects_bad_header() {
        assert!(decompress_standard(&[0x00, 0x00, 0x00, 0x00]).is_err());
    }

    proptest! {
        #[test]
        fn compress_round_trip(data in prop::collection::vec(any::<u8>(), 0..70_000)) {
            let stream = compress(&data);
            let inflated = decompress(&stream).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(inflated.data, data);
        }
    }
}
