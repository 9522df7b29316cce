//! Content hashing
//!
//! Two unrelated hashes live here:
//!
//! - [`native_hash`] is the 32-bit checksum the game's own tooling stores in
//!   TMod file records. It must match bit for bit, including the
//!   sign-extension quirk of the tail step (the reference implementation reads
//!   trailing bytes through a signed `char`).
//! - [`content_hash`] is a plain MD5 digest used for change detection when
//!   comparing archives and extracted files. It is never written into a
//!   container.

const OFFSET_BASIS: u32 = 2_166_136_261;
const PRIME: u32 = 16_777_619;

/// Compute the native per-file checksum
///
/// Whole little-endian 32-bit words are folded FNV-1a style; the remaining
/// one to three bytes are sign-extended and assembled big-endian before the
/// final fold.
///
/// # Examples
///
/// ```
/// use trovekit_formats::hash::native_hash;
///
/// assert_eq!(native_hash(b""), 0x811C_9DC5);
/// assert_eq!(native_hash(b"a"), 0xE40C_292C);
/// ```
pub fn native_hash(data: &[u8]) -> u32 {
    let mut hash = OFFSET_BASIS;

    let mut words = data.chunks_exact(4);
    for word in &mut words {
        let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        hash = PRIME.wrapping_mul(hash ^ word);
    }

    let remainder = words.remainder();
    if remainder.is_empty() {
        return hash;
    }

    let tail = remainder
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | sign_extend(byte));

    PRIME.wrapping_mul(hash ^ tail)
}

#[inline]
const fn sign_extend(byte: u8) -> u32 {
    byte as i8 as i32 as u32
}

/// Lowercase hex MD5 of `data`
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}
