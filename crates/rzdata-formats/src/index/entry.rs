//! Index entries

use rzdata_crypto::{NameCipher, ShardId};
use std::fmt;
use std::sync::OnceLock;

use super::error::{IndexError, Result};
use super::record::IndexRecord;

/// Location of one payload inside the archive.
///
/// The hash name is the canonical identity and decides the shard. The plain
/// name is decoded on first access and cached.
#[derive(Clone)]
pub struct IndexEntry {
    hash_name: String,
    plain_name: OnceLock<String>,
    offset: u32,
    length: u32,
    shard: ShardId,
}

impl IndexEntry {
    /// Create an entry from a plain or hash name.
    ///
    /// Plain names are encoded, so the entry always carries its hash name.
    /// Legacy index files occasionally store plain names; they are
    /// normalized here and written back encoded.
    ///
    /// # Errors
    ///
    /// [`IndexError::NameTooLong`] if the hash name does not fit the
    /// one-byte length prefix of an index record.
    pub fn new(name: &str, offset: u32, length: u32) -> Result<Self> {
        let hash_name = NameCipher::to_hash_name(name)?.into_owned();
        if hash_name.len() > usize::from(u8::MAX) {
            return Err(IndexError::NameTooLong {
                name: name.to_ascii_lowercase(),
                length: hash_name.len(),
            });
        }
        let shard = NameCipher::shard_id(&hash_name)?;
        Ok(Self {
            hash_name,
            plain_name: OnceLock::new(),
            offset,
            length,
            shard,
        })
    }

    pub(crate) fn from_record(record: IndexRecord, position: u64) -> Result<Self> {
        if !record.name.is_ascii() {
            return Err(IndexError::NonAsciiName { position });
        }
        let name: String = record.name.iter().copied().map(char::from).collect();
        Self::new(&name, record.offset, record.length)
    }

    pub(crate) fn to_record(&self) -> IndexRecord {
        IndexRecord {
            name: self.hash_name.clone().into_bytes(),
            offset: self.offset,
            length: self.length,
        }
    }

    /// On-disk identity
    pub fn hash_name(&self) -> &str {
        &self.hash_name
    }

    /// Human-readable, lowercase file name
    pub fn plain_name(&self) -> &str {
        self.plain_name.get_or_init(|| {
            NameCipher::decode(&self.hash_name).unwrap_or_else(|_| self.hash_name.clone())
        })
    }

    /// Extension of the plain name without the dot, or `""`
    pub fn extension(&self) -> &str {
        self.plain_name()
            .rsplit_once('.')
            .map_or("", |(_, extension)| extension)
    }

    /// Byte position within the shard
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Payload length in bytes
    pub fn length(&self) -> u32 {
        self.length
    }

    /// End of the payload region (exclusive)
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.length)
    }

    /// Shard holding the payload
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Point the entry at a new region of its shard
    pub fn set_location(&mut self, offset: u32, length: u32) {
        self.offset = offset;
        self.length = length;
    }

    /// Move the entry within its shard
    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Whether a name (plain or hash) refers to this entry
    pub fn matches(&self, name: &str) -> bool {
        NameCipher::to_hash_name(name).is_ok_and(|hash| hash == self.hash_name)
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.hash_name == other.hash_name
            && self.offset == other.offset
            && self.length == other.length
    }
}

impl Eq for IndexEntry {}

impl fmt::Debug for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexEntry")
            .field("hash_name", &self.hash_name)
            .field("plain_name", &self.plain_name())
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("shard", &self.shard.get())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_plain_name() {
        let entry = IndexEntry::new("db_item.rdb", 0, 12).expect("entry");
        assert_eq!(entry.hash_name(), "U{W.Y(_ZdT!JV");
        assert_eq!(entry.plain_name(), "db_item.rdb");
        assert_eq!(entry.extension(), "rdb");
        assert_eq!(entry.shard().get(), 3);
        assert_eq!(entry.end(), 12);
    }

    #[test]
    fn test_new_from_hash_name_keeps_it() {
        let entry = IndexEntry::new("N M!ccI", 16, 5).expect("entry");
        assert_eq!(entry.hash_name(), "N M!ccI");
        assert_eq!(entry.plain_name(), "a.dds");
        assert_eq!(entry.shard().get(), 6);
    }

    #[test]
    fn test_uppercase_plain_name_normalized() {
        let entry = IndexEntry::new("Hello_World.TGA", 0, 0).expect("entry");
        assert_eq!(entry.plain_name(), "hello_world.tga");
        assert_eq!(entry.extension(), "tga");
    }

    #[test]
    fn test_legacy_plain_name_on_disk() {
        let record = IndexRecord {
            name: b"a.dds".to_vec(),
            offset: 1,
            length: 2,
        };
        let entry = IndexEntry::from_record(record, 0).expect("entry");
        assert_eq!(entry.hash_name(), "N M!ccI");
        assert_eq!(entry.plain_name(), "a.dds");
        assert_eq!(entry.shard().get(), 6);
        assert_eq!(entry.to_record().name, b"N M!ccI");
        assert!(entry.matches("a.dds"));
        assert!(entry.matches("N M!ccI"));
    }

    #[test]
    fn test_non_ascii_record_rejected() {
        let record = IndexRecord {
            name: vec![0xC3, 0xA9],
            offset: 0,
            length: 0,
        };
        assert!(matches!(
            IndexEntry::from_record(record, 42),
            Err(IndexError::NonAsciiName { position: 42 })
        ));
    }

    #[test]
    fn test_name_too_long() {
        // 253 plain bytes encode to exactly 255
        let longest = format!("{}.txt", "a".repeat(249));
        let entry = IndexEntry::new(&longest, 0, 0).expect("entry");
        assert_eq!(entry.hash_name().len(), 255);
        assert_eq!(entry.to_record().name.len(), 255);

        let name = format!("{}.txt", "a".repeat(250));
        assert!(matches!(
            IndexEntry::new(&name, 0, 0),
            Err(IndexError::NameTooLong { length: 256, .. })
        ));
    }

    #[test]
    fn test_equality_ignores_cache() {
        let a = IndexEntry::new("x", 1, 2).expect("entry");
        let b = IndexEntry::new("x", 1, 2).expect("entry");
        let _ = a.plain_name();
        assert_eq!(a, b);
        assert_ne!(a, IndexEntry::new("x", 1, 3).expect("entry"));
    }

    #[test]
    fn test_no_extension() {
        let entry = IndexEntry::new("readme", 0, 0).expect("entry");
        assert_eq!(entry.extension(), "");
    }
}
