//! Error types for cipher operations

use thiserror::Error;

/// Errors that can occur during cipher operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Name contains bytes outside the ASCII range
    #[error("Name contains non-ASCII byte 0x{byte:02x} at position {position}: {name:?}")]
    NonAsciiName {
        /// The offending name
        name: String,
        /// Byte offset of the first non-ASCII byte
        position: usize,
        /// The offending byte
        byte: u8,
    },

    /// Hash name is too short to carry its framing characters
    #[error("Invalid hash name {0:?}: expected at least 2 characters")]
    InvalidHashName(String),

    /// XOR table override has the wrong size
    #[error("Invalid XOR table size: expected {expected}, got {actual}")]
    InvalidTableSize {
        /// Expected table size in bytes
        expected: usize,
        /// Actual table size in bytes
        actual: usize,
    },

    /// Shard number outside 1-8
    #[error("Invalid shard id: {0} (must be 1-8)")]
    InvalidShardId(u32),
}

impl CryptoError {
    pub(crate) fn check_ascii(name: &str) -> Result<(), Self> {
        match name.bytes().enumerate().find(|(_, b)| !b.is_ascii()) {
            Some((position, byte)) => Err(Self::NonAsciiName {
                name: name.to_string(),
                position,
                byte,
            }),
            None => Ok(()),
        }
    }
}
