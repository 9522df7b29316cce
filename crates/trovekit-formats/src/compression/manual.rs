//! Manual stored-block framing
//!
//! Some third-party mod builders write the payload as raw stored blocks with
//! a fixed block header after every 32 KiB chunk, ignoring the real length of
//! the final chunk. Strict decoders reject or mis-read those streams; this
//! framing recovers them by position alone.

use super::CHUNK_SIZE;
use super::error::{CompressionError, CompressionResult};

/// zlib header (`78 01`) followed by a stored block header declaring 32768 bytes
pub const MANUAL_HEADER: [u8; 7] = [0x78, 0x01, 0x00, 0x00, 0x80, 0xFF, 0x7F];

/// Stored block header written after every full chunk
pub const CHUNK_MARKER: [u8; 5] = [0x00, 0x00, 0x80, 0xFF, 0x7F];

/// Empty stored block terminating the stream (sync-flush marker)
pub const MANUAL_TRAILER: [u8; 5] = [0x00, 0x00, 0x00, 0xFF, 0xFF];

/// Size of one chunk plus the marker that follows it
const RECORD_SIZE: usize = CHUNK_SIZE + CHUNK_MARKER.len();

/// Recover the payload of a manually framed stream
pub fn manual_decompress(data: &[u8]) -> CompressionResult<Vec<u8>> {
    let framing = MANUAL_HEADER.len() + MANUAL_TRAILER.len();
    if data.len() < framing {
        return Err(CompressionError::CorruptArchive(format!(
            "manual framing needs at least {framing} bytes, got {}",
            data.len()
        )));
    }

    let body = &data[MANUAL_HEADER.len()..data.len() - MANUAL_TRAILER.len()];
    let full_records = body.len() / RECORD_SIZE;

    let mut output = Vec::with_capacity(body.len());
    for record in body.chunks_exact(RECORD_SIZE) {
        output.extend_from_slice(&record[..CHUNK_SIZE]);
    }
    output.extend_from_slice(&body[full_records * RECORD_SIZE..]);

    Ok(output)
}

/// Frame `data` the way [`manual_decompress`] expects
pub fn manual_compress(data: &[u8]) -> Vec<u8> {
    let markers = data.len() / CHUNK_SIZE * CHUNK_MARKER.len();
    let mut output =
        Vec::with_capacity(MANUAL_HEADER.len() + data.len() + markers + MANUAL_TRAILER.len());

    output.extend_from_slice(&MANUAL_HEADER);
    for chunk in data.chunks(CHUNK_SIZE) {
        output.extend_from_slice(chunk);
        if chunk.len() == CHUNK_SIZE {
            output.extend_from_slice(&CHUNK_MARKER);
        }
    }
    output.extend_from_slice(&MANUAL_TRAILER);

    output
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_literal_framing() {
        let framed = manual_compress(b"abc");
        assert_eq!(&framed[..7], &MANUAL_HEADER);
        assert_eq!(&framed[7..10], b"abc");
        assert_eq!(&framed[10..], &MANUAL_TRAILER);
    }

    #[test]
    fn test_marker_after_full_chunk_only() {
        let data = pattern(CHUNK_SIZE + 10);
        let framed = manual_compress(&data);

        let marker_at = MANUAL_HEADER.len() + CHUNK_SIZE;
        assert_eq!(&framed[marker_at..marker_at + 5], &CHUNK_MARKER);
        assert_eq!(
            framed.len(),
            MANUAL_HEADER.len() + data.len() + CHUNK_MARKER.len() + MANUAL_TRAILER.len()
        );
    }

    #[test]
    fn test_round_trip() {
        for len in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 2 * CHUNK_SIZE, 100_000] {
            let data = pattern(len);
            let restored = manual_decompress(&manual_compress(&data)).expect("manual round trip");
            assert_eq!(restored.len(), data.len(), "length mismatch for {len}");
            assert!(restored == data, "content mismatch for {len}");
        }
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            manual_decompress(&[0x78, 0x01, 0x00]),
            Err(CompressionError::CorruptArchive(_))
        ));
    }
}
