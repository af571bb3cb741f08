//! Error types for index parsing and building

use rzdata_crypto::CryptoError;
use thiserror::Error;

/// Errors that can occur when parsing or building the index file
#[derive(Error, Debug)]
pub enum IndexError {
    /// Record runs past the end of the file
    #[error("Truncated index record at byte {position}: need {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Byte offset where the record starts
        position: u64,
        /// Bytes the record declares
        needed: usize,
        /// Bytes left in the file
        available: usize,
    },

    /// Record name contains non-ASCII bytes
    #[error("Index record at byte {position} has a non-ASCII name")]
    NonAsciiName {
        /// Byte offset where the record starts
        position: u64,
    },

    /// Name does not fit the one-byte length prefix
    #[error("Name too long for index record ({length} bytes, max 255): {name:?}")]
    NameTooLong {
        /// The offending name
        name: String,
        /// Its length in bytes
        length: usize,
    },

    /// Name cipher failure
    #[error("Name cipher error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `BinRW` parsing/writing error
    #[error("Binary format error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Type alias for index operation results
pub type Result<T> = std::result::Result<T, IndexError>;
