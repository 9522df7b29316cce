//! Mod container formats for Trove
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Format names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::redundant_closure_for_method_calls)] // Iterator chains
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::missing_errors_doc)] // Error types are self-describing
//! This crate reads and writes the mod containers the game loads from its
//! `mods` directory, together with the primitives the game's own archives are
//! built from. Everything operates on in-memory byte buffers; reading and
//! writing files is left to the caller.
//!
//! # Supported Formats
//!
//! - **TMod**: Binary container with a property table and a compressed payload
//! - **ZMod**: Plain zip archive used as a mod
//! - **Pack**: Bundle of compiled mod files behind a TMod-style header
//!
//! # Primitives
//!
//! - **VarInt**: Unsigned LEB128 integers used by every header and index
//! - **Hash**: The game's native 32-bit file checksum, plus MD5 for change detection
//! - **Compression**: 32 KiB chunked, sync-flush terminated deflate streams
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use trovekit_formats::tmod::{self, ContainerFile, ModContainer};
//!
//! let mut container = ModContainer::with_identity("Test Mod", "Alice");
//! container.add_file(ContainerFile::new("ui/config.cfg", b"hello".to_vec())?);
//!
//! let bytes = container.compile()?;
//! let parsed = tmod::parse(Path::new("Test Mod.tmod"), &bytes, false)?;
//! assert_eq!(parsed.files()[0].content(), b"hello");
//! # Ok::<(), trovekit_formats::tmod::ContainerError>(())
//! ```

#![warn(missing_docs)]

pub mod compression;
/// Native file checksum and MD5 content hashing
pub mod hash;
/// Mod packs bundling several compiled mods
pub mod pack;
pub mod reader;
/// TMod binary containers: header codec, properties and the in-memory model
///
/// Parsing keeps the header records even when content is skipped, so a mod
/// list can be built from header bytes alone. Serialization always reassigns
/// offsets from file order and recomputes checksums lazily.
pub mod tmod;
pub mod varint;
pub mod zmod;

pub use compression::{CompressionError, Framing, compress, decompress};
pub use hash::{content_hash, native_hash};
pub use pack::{ModPack, PackEntry, PackError};
pub use tmod::{ContainerError, ContainerFile, ContainerFormat, ModContainer, Property};
pub use varint::VarIntError;
