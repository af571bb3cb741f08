//! Index file (`data.000`) parsing, building and querying
//!
//! The index is a flat run of self-delimiting records with no header, count
//! or checksum. The whole file is XOR-ciphered with one continuous keystream
//! starting at index 0, so the file is deciphered in one pass before any
//! record is read.
//!
//! ```text
//! record := name_len:u8  name:u8[name_len]  offset:u32le  length:u32le
//! file   := record*
//! ```
//!
//! # Usage
//!
//! ```rust
//! use rzdata_crypto::ContentCipher;
//! use rzdata_formats::index::{DataIndex, IndexEntry, SortOrder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cipher = ContentCipher::default();
//!
//! let mut index = DataIndex::new();
//! index.push(IndexEntry::new("db_item.rdb", 0, 12)?);
//! index.push(IndexEntry::new("a.dds", 0, 5)?);
//! index.sort(SortOrder::Name);
//!
//! let bytes = index.build(&cipher)?;
//! let parsed = DataIndex::parse(&bytes, &cipher)?;
//! assert_eq!(parsed.get("db_item.rdb").map(IndexEntry::length), Some(12));
//! # Ok(())
//! # }
//! ```

mod entry;
mod error;
mod record;

pub use entry::IndexEntry;
pub use error::{IndexError, Result};
pub use record::{IndexRecord, RECORD_OVERHEAD};

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use rzdata_crypto::{ContentCipher, NameCipher, ShardId};
use rzdata_crypto::xor::normalize_extension;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Orderings offered by [`DataIndex::sort`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// By plain name
    Name,
    /// By offset within the shard
    Offset,
    /// By payload length
    Size,
    /// By shard id
    ShardId,
}

/// Ordered collection of index entries with name lookup.
///
/// Order is significant: [`build`](Self::build) writes entries exactly in
/// their current order, so callers who need a particular on-disk order must
/// [`sort`](Self::sort) first.
#[derive(Debug, Clone, Default)]
pub struct DataIndex {
    entries: Vec<IndexEntry>,
    lookup: HashMap<String, usize>,
}

impl DataIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index over existing entries, keeping their order
    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        let mut index = Self {
            entries,
            lookup: HashMap::new(),
        };
        index.reindex();
        index
    }

    /// Parse a complete `data.000` image.
    ///
    /// Every record is bounds-checked before it is read; a record running
    /// past the end of the data is reported with its starting position.
    pub fn parse(data: &[u8], cipher: &ContentCipher) -> Result<Self> {
        let mut plain = data.to_vec();
        cipher.apply_from_start(&mut plain);

        let total = plain.len();
        let mut cursor = Cursor::new(plain.as_slice());
        let mut entries = Vec::new();

        while (cursor.position() as usize) < total {
            let position = cursor.position();
            let start = position as usize;
            let name_len = usize::from(plain[start]);
            let needed = RECORD_OVERHEAD + name_len;
            let available = total - start;
            if needed > available {
                return Err(IndexError::TruncatedRecord {
                    position,
                    needed,
                    available,
                });
            }

            let record = IndexRecord::read(&mut cursor)?;
            entries.push(IndexEntry::from_record(record, position)?);
        }

        Ok(Self::from_entries(entries))
    }

    /// Build a complete `data.000` image in the current entry order.
    pub fn build(&self, cipher: &ContentCipher) -> Result<Vec<u8>> {
        let capacity = self
            .entries
            .iter()
            .map(|e| RECORD_OVERHEAD + e.hash_name().len())
            .sum();
        let mut buffer = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(&mut buffer);

        for entry in &self.entries {
            entry.to_record().write(&mut cursor)?;
        }

        cipher.apply_from_start(&mut buffer);
        Ok(buffer)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Iterate entries in order
    pub fn iter(&self) -> std::slice::Iter<'_, IndexEntry> {
        self.entries.iter()
    }

    /// Mutable iteration; names cannot change, so the lookup stays valid
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, IndexEntry> {
        self.entries.iter_mut()
    }

    /// Append an entry.
    ///
    /// If an entry with the same hash name already exists, lookups keep
    /// resolving to the earlier one.
    pub fn push(&mut self, entry: IndexEntry) {
        let position = self.entries.len();
        self.lookup
            .entry(entry.hash_name().to_string())
            .or_insert(position);
        self.entries.push(entry);
    }

    /// Position of the entry for a plain or hash name
    pub fn position(&self, name: &str) -> Option<usize> {
        let hash = NameCipher::to_hash_name(name).ok()?;
        self.lookup.get(hash.as_ref()).copied()
    }

    /// Entry for a plain or hash name
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.position(name).map(|p| &self.entries[p])
    }

    /// Mutable entry for a plain or hash name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut IndexEntry> {
        self.position(name).map(|p| &mut self.entries[p])
    }

    /// Whether an entry exists for a plain or hash name
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Entry at an ordinal position
    pub fn get_at(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    /// Mutable entry at an ordinal position
    pub fn get_at_mut(&mut self, position: usize) -> Option<&mut IndexEntry> {
        self.entries.get_mut(position)
    }

    /// Entry stored at `offset` in `shard`
    pub fn find_by_location(&self, shard: ShardId, offset: u32) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.shard() == shard && e.offset() == offset)
    }

    /// Entries of one shard in ascending offset order
    pub fn entries_in_shard(&self, shard: ShardId) -> Vec<&IndexEntry> {
        let mut entries: Vec<_> = self.entries.iter().filter(|e| e.shard() == shard).collect();
        entries.sort_by_key(|e| e.offset());
        entries
    }

    /// Entries whose plain name has this extension (case-insensitive,
    /// leading dot optional)
    pub fn entries_with_extension(&self, extension: &str) -> Vec<&IndexEntry> {
        let wanted = normalize_extension(extension);
        self.entries
            .iter()
            .filter(|e| e.extension().eq_ignore_ascii_case(&wanted))
            .collect()
    }

    /// Entries whose plain name contains `partial` (case-insensitive)
    pub fn entries_matching(&self, partial: &str) -> Vec<&IndexEntry> {
        let partial = partial.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.plain_name().contains(&partial))
            .collect()
    }

    /// Total payload bytes of `entries`
    pub fn stored_size<'a, I>(entries: I) -> u64
    where
        I: IntoIterator<Item = &'a IndexEntry>,
    {
        entries.into_iter().map(|e| u64::from(e.length())).sum()
    }

    /// Remove the entry for a plain or hash name
    pub fn remove(&mut self, name: &str) -> Option<IndexEntry> {
        let position = self.position(name)?;
        let removed = self.entries.remove(position);
        self.reindex();
        Some(removed)
    }

    /// Remove every entry of `shard`, returning them in index order
    pub fn remove_shard(&mut self, shard: ShardId) -> Vec<IndexEntry> {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.shard() == shard);
        self.entries = kept;
        self.reindex();
        removed
    }

    /// Stable sort in place
    pub fn sort(&mut self, order: SortOrder) {
        match order {
            SortOrder::Name => self
                .entries
                .sort_by(|a, b| a.plain_name().cmp(b.plain_name())),
            SortOrder::Offset => self.entries.sort_by_key(IndexEntry::offset),
            SortOrder::Size => self.entries.sort_by_key(IndexEntry::length),
            SortOrder::ShardId => self.entries.sort_by_key(IndexEntry::shard),
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        self.lookup.clear();
        for (position, entry) in self.entries.iter().enumerate() {
            if let Entry::Vacant(slot) = self.lookup.entry(entry.hash_name().to_string()) {
                slot.insert(position);
            }
        }
    }
}

impl<'a> IntoIterator for &'a DataIndex {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl PartialEq for DataIndex {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for DataIndex {}
