//! Shard identifiers

use std::fmt;

use crate::error::CryptoError;

/// Number of shard files in an archive.
pub const SHARD_COUNT: u8 = 8;

/// One of the eight shard files (`data.001` .. `data.008`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(u8);

impl ShardId {
    /// Create a shard id, rejecting values outside 1-8.
    pub fn new(id: u8) -> Result<Self, CryptoError> {
        if (1..=SHARD_COUNT).contains(&id) {
            Ok(Self(id))
        } else {
            Err(CryptoError::InvalidShardId(u32::from(id)))
        }
    }

    pub(crate) fn from_checksum(checksum: u32) -> Self {
        Self((checksum % u32::from(SHARD_COUNT)) as u8 + 1)
    }

    /// Numeric shard id, 1-8
    pub fn get(self) -> u8 {
        self.0
    }

    /// All shards in ascending order
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=SHARD_COUNT).map(Self)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl TryFrom<u8> for ShardId {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ShardId> for u8 {
    fn from(id: ShardId) -> Self {
        id.0
    }
}
