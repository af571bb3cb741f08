//! Storage engine for rzdata game-asset archives.
//!
//! An archive directory holds one index file and eight shard files:
//!
//! - **`data.000`**: XOR-ciphered index mapping hash names to shard regions
//! - **`data.001` .. `data.008`**: payload containers, one per shard id
//!
//! The [`ArchiveEngine`] keeps the two consistent through import, update,
//! delete, export and rebuild. Every mutating operation holds `data.lock`
//! for its duration and persists the index before returning.
//!
//! # Example
//!
//! ```rust,no_run
//! use rzdata_storage::{ArchiveConfig, ArchiveEngine};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ArchiveConfig::new("/path/to/client/data").with_backups(true);
//! let mut engine = ArchiveEngine::open(config)?;
//!
//! let entry = engine.import("db_item.rdb", &std::fs::read("db_item.rdb")?)?;
//! println!("stored in shard {} at {}", entry.shard(), entry.offset());
//!
//! engine.rebuild(entry.shard())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use rzdata_crypto::CryptoError;
use rzdata_formats::IndexError;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Batch results
pub mod batch;

// Shard and index backups
pub mod backup;

// Engine configuration
pub mod config;

// Dump directory layout
pub mod dump;

// Archive engine
pub mod engine;

// Diagnostics and progress
pub mod events;

// Exclusive write lock
pub mod lock;

// Chunked in-file and cross-file moves
pub mod mover;

pub use batch::{BatchFailure, BatchReport};
pub use config::ArchiveConfig;
pub use engine::{ArchiveEngine, RebuildSummary, ShardStats};
pub use events::{ArchiveEvent, ArchiveObserver, EventKind, Progress};
pub use rzdata_crypto::ShardId;
pub use rzdata_formats::{DataIndex, IndexEntry, SortOrder};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors that can occur during archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index file could not be parsed or built.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Name could not be encoded or a cipher table was rejected.
    #[error("Cipher error: {0}")]
    Crypto(#[from] CryptoError),

    /// No entry with this name.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Index file is absent.
    #[error("Index file not found: {}", .0.display())]
    IndexMissing(PathBuf),

    /// Shard file is absent.
    #[error("Shard file not found: {}", .0.display())]
    ShardMissing(PathBuf),

    /// Dump directory is absent.
    #[error("Dump directory not found: {}", .0.display())]
    DumpMissing(PathBuf),

    /// Input file is absent.
    #[error("File not found: {}", .0.display())]
    FileMissing(PathBuf),

    /// Caller passed an unusable value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Archive already exists where one was to be created.
    #[error("Archive already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Entry region runs past the end of its shard.
    #[error("Entry {name} [{offset}, +{length}) exceeds shard {shard} size {size}")]
    OutOfBounds {
        /// Plain name of the entry
        name: String,
        /// Shard holding the entry
        shard: ShardId,
        /// Entry offset
        offset: u32,
        /// Entry length
        length: u32,
        /// Current shard size
        size: u64,
    },

    /// Two live entries claim overlapping bytes.
    #[error("Overlapping regions in shard {shard}: {first} and {second}")]
    Overlap {
        /// Shard holding both entries
        shard: ShardId,
        /// Entry being operated on
        first: String,
        /// Entry it overlaps
        second: String,
    },

    /// Shard would grow past the 32-bit offset range.
    #[error("Shard {shard} cannot grow to {size} bytes (32-bit offsets)")]
    ShardFull {
        /// Shard being written
        shard: ShardId,
        /// Size the write would produce
        size: u64,
    },

    /// Another engine holds the archive lock.
    #[error("Archive locked: {}", .0.display())]
    Locked(PathBuf),

    /// Observer requested cancellation.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification of [`ArchiveError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A named entry, file or directory does not exist
    NotFound,
    /// The caller supplied an unusable value
    InvalidArgument,
    /// On-disk data is inconsistent or malformed
    Structural,
    /// The operating system reported an I/O failure
    Io,
    /// Another engine holds the archive lock
    Locked,
    /// The observer asked the operation to stop
    Cancelled,
}

impl ArchiveError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Index(IndexError::Io(_)) => ErrorKind::Io,
            Self::Index(IndexError::Crypto(_) | IndexError::NameTooLong { .. }) => {
                ErrorKind::InvalidArgument
            }
            Self::Index(_) => ErrorKind::Structural,
            Self::Crypto(_) | Self::InvalidArgument(_) | Self::Config(_) | Self::AlreadyExists(_) => {
                ErrorKind::InvalidArgument
            }
            Self::EntryNotFound(_)
            | Self::IndexMissing(_)
            | Self::ShardMissing(_)
            | Self::DumpMissing(_)
            | Self::FileMissing(_) => ErrorKind::NotFound,
            Self::OutOfBounds { .. } | Self::Overlap { .. } | Self::ShardFull { .. } => {
                ErrorKind::Structural
            }
            Self::Locked(_) => ErrorKind::Locked,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Version information for the storage crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Index file name.
pub const INDEX_FILE: &str = "data.000";

/// Lock file name, created next to the index while an engine writes.
pub const LOCK_FILE: &str = "data.lock";

/// Suffix of the scratch file a rebuild writes before swapping it in.
pub const REBUILD_SUFFIX: &str = "_NEW";

/// File name of a shard, e.g. `data.003`.
pub fn shard_file_name(shard: ShardId) -> String {
    format!("data.{shard}")
}

/// Path of a shard inside an archive directory.
pub fn shard_path(data_dir: &Path, shard: ShardId) -> PathBuf {
    data_dir.join(shard_file_name(shard))
}

/// Path of the index inside an archive directory.
pub fn index_path(data_dir: &Path) -> PathBuf {
    data_dir.join(INDEX_FILE)
}
