//! Game archive reader, change detection and mod library for Trove installations.
//!
//! This crate is the filesystem layer on top of `trovekit-formats`. It reads
//! the game's own asset archives, works out which files changed since a
//! previous extraction, extracts them, and loads the user's mod directory.
//!
//! - **Archive**: `index.tfi` files and their sibling `archiveN.tfa` blobs,
//!   with lazily read and cached content
//! - **Diff**: per-file classification against a previous extraction, with
//!   known hashes to skip unchanged indexes and archives entirely
//! - **Extract**: atomic writes of changed files, optional old/new change
//!   folders and an extraction report
//! - **Library**: the mods directory, with extension and name correction,
//!   enable/disable and conflict detection
//!
//! # Example
//!
//! ```rust,ignore
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use trovekit_storage::{CancelFlag, DiffEngine, ExtractorConfig, KnownHashes};
//!
//! # async fn example() -> trovekit_storage::Result<()> {
//! let config = ExtractorConfig::default();
//! let engine = DiffEngine::new("/games/Trove", "/games/Trove/extracted", config);
//! let known = KnownHashes::load("/games/Trove/extracted/hashes.json").await;
//!
//! let changes = engine
//!     .find_changes(&known, &BTreeSet::new(), &CancelFlag::new())
//!     .await?;
//! println!("{} files changed", changes.changes.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;
use thiserror::Error;
use trovekit_formats::tmod::ContainerError;
use trovekit_formats::varint::VarIntError;

// Index and archive readers
pub mod archive;

// Cooperative cancellation
mod cancel;

// Configuration
pub mod config;

// Change detection
pub mod diff;

// Extraction to disk
pub mod extract;

// Persisted hashes of extracted indexes and archives
pub mod known_hashes;

// Mod directory loader
pub mod library;

// Temp-file-and-rename writes
mod atomic;

pub use archive::{ArchiveFile, ArchiveFileRecord, GameBlob, GameIndex};
pub use cancel::CancelFlag;
pub use config::{ExtractorConfig, LibraryOptions};
pub use diff::{
    Change, ChangeSet, DiffEngine, DiffStatus, ResolvedArchive, Unresolved, previous_listing,
    removed_files,
};
pub use extract::{ExtractionProgress, ExtractionReport, Extractor, ReportedFile};
pub use known_hashes::{KnownHashes, relative_key};
pub use library::{Conflict, ConflictKind, ModEntry, ModLibrary};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An index ended in the middle of a record.
    #[error("Truncated index {}: record at offset {offset} is incomplete", path.display())]
    TruncatedIndex {
        /// Index file
        path: PathBuf,
        /// Start of the incomplete record
        offset: usize,
    },

    /// An index holds a varint wider than 64 bits.
    #[error("Malformed varint in {}: {source}", path.display())]
    VarInt {
        /// Index file
        path: PathBuf,
        /// Decoder error
        #[source]
        source: VarIntError,
    },

    /// An archive could not be decompressed, or a record points outside it.
    #[error("Corrupt archive {}: {reason}", path.display())]
    CorruptArchive {
        /// Archive or file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A mod container could not be read.
    #[error("Invalid mod {}: {source}", path.display())]
    Container {
        /// Mod file
        path: PathBuf,
        /// Codec error
        #[source]
        source: ContainerError,
    },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The operation was cancelled between files.
    #[error("Operation cancelled")]
    Cancelled,

    /// A path lies outside the root it should be relative to.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A rename target already exists.
    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the error only concerns one item of a batch
    ///
    /// Batch scans log and skip these instead of aborting.
    pub const fn is_item_error(&self) -> bool {
        matches!(
            self,
            Self::TruncatedIndex { .. }
                | Self::VarInt { .. }
                | Self::CorruptArchive { .. }
                | Self::Container { .. }
                | Self::InvalidPath(_)
        )
    }
}

/// Version information for the storage crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the index file in every archive directory.
pub const INDEX_FILE: &str = "index.tfi";

/// Extension of archive blobs.
pub const ARCHIVE_EXTENSION: &str = "tfa";

/// Known-hash file kept at the root of an extraction.
pub const HASHES_FILE: &str = "hashes.json";
