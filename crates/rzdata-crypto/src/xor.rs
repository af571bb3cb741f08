//! XOR keystream cipher for payloads and the index file.
//!
//! The keystream is a fixed 256-byte table. A running `u8` index selects the
//! key byte for each data byte and wraps naturally, so the cipher is its own
//! inverse and stateless apart from that index.
//!
//! ```rust
//! use rzdata_crypto::xor::ContentCipher;
//!
//! let cipher = ContentCipher::default();
//! let mut index = 0u8;
//! let mut first = *b"abc";
//! let mut second = *b"def";
//! cipher.apply(&mut first, &mut index);
//! cipher.apply(&mut second, &mut index);
//! assert_eq!(index, 6);
//! ```

use std::collections::BTreeSet;

use crate::error::CryptoError;

/// Keystream table length in bytes
pub const XOR_TABLE_SIZE: usize = 256;

/// Keystream shipped with the game client.
pub const DEFAULT_XOR_TABLE: [u8; XOR_TABLE_SIZE] = [
    0x77, 0xe8, 0x5e, 0xec, 0xb7, 0x4e, 0xc1, 0x87, 0x4f, 0xe6, 0xf5, 0x3c, 0x1f, 0xb3, 0x15, 0x43,
    0x6a, 0x49, 0x30, 0xa6, 0xbf, 0x53, 0xa8, 0x35, 0x5b, 0xe5, 0x9e, 0x0e, 0x41, 0xec, 0x22, 0xb8,
    0xd4, 0x80, 0xa4, 0x8c, 0xce, 0x65, 0x13, 0x1d, 0x4b, 0x08, 0x5a, 0x6a, 0xbb, 0x6f, 0xad, 0x25,
    0xb8, 0xdd, 0xcc, 0x77, 0x30, 0x74, 0xac, 0x8c, 0x5a, 0x4a, 0x9a, 0x9b, 0x36, 0xbc, 0x53, 0x0a,
    0x3c, 0xf8, 0x96, 0x0b, 0x5d, 0xaa, 0x28, 0xa9, 0xb2, 0x82, 0x13, 0x6e, 0xf1, 0xc1, 0x93, 0xa9,
    0x9e, 0x5f, 0x20, 0xcf, 0xd4, 0xcc, 0x5b, 0x2e, 0x16, 0xf5, 0xc9, 0x4c, 0xb2, 0x1c, 0x57, 0xee,
    0x14, 0xed, 0xf9, 0x72, 0x97, 0x22, 0x1b, 0x4a, 0xa4, 0x2e, 0xb8, 0x96, 0xef, 0x4b, 0x3f, 0x8e,
    0xab, 0x60, 0x5d, 0x7f, 0x2c, 0xb8, 0xad, 0x43, 0xad, 0x76, 0x8f, 0x5f, 0x92, 0xe6, 0x4e, 0xa7,
    0xd4, 0x47, 0x19, 0x6b, 0x69, 0x34, 0xb5, 0x0e, 0x62, 0x6d, 0xa4, 0x52, 0xb9, 0xe3, 0xe0, 0x64,
    0x43, 0x3d, 0xe3, 0x70, 0xf5, 0x90, 0xb3, 0xa2, 0x06, 0x42, 0x02, 0x98, 0x29, 0x50, 0x3f, 0xfd,
    0x97, 0x58, 0x68, 0x01, 0x8c, 0x1e, 0x0f, 0xef, 0x8b, 0xb3, 0x41, 0x44, 0x96, 0x21, 0xa8, 0xda,
    0x5e, 0x8b, 0x4a, 0x53, 0x1b, 0xfd, 0xf5, 0x21, 0x3f, 0xf7, 0xba, 0x68, 0x47, 0xf9, 0x65, 0xdf,
    0x52, 0xce, 0xe0, 0xde, 0xec, 0xef, 0xcd, 0x77, 0xa2, 0x0e, 0xbc, 0x38, 0x2f, 0x64, 0x12, 0x8d,
    0xf0, 0x5c, 0xe0, 0x0b, 0x59, 0xd6, 0x2d, 0x99, 0xcd, 0xe7, 0x01, 0x15, 0xe0, 0x67, 0xf4, 0x32,
    0x35, 0xd4, 0x11, 0x21, 0xc3, 0xde, 0x98, 0x65, 0xed, 0x54, 0x9d, 0x1c, 0xb9, 0xb0, 0xaa, 0xa9,
    0x0c, 0x8a, 0xb4, 0x66, 0x60, 0xe1, 0xff, 0x2e, 0xc8, 0x00, 0x43, 0xa9, 0x67, 0x37, 0xdb, 0x9c,
];

/// Extensions stored without the keystream applied.
pub const DEFAULT_UNENCRYPTED_EXTENSIONS: &[&str] =
    &["mp3", "ogg", "raw", "dds", "tga", "naf", "nx3", "cob", "nfm"];

/// Lowercase an extension and drop a leading dot, so `".DDS"` and `"dds"`
/// compare equal.
pub fn normalize_extension(extension: &str) -> String {
    extension
        .strip_prefix('.')
        .unwrap_or(extension)
        .to_ascii_lowercase()
}

/// XOR content cipher with its per-extension policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCipher {
    table: [u8; XOR_TABLE_SIZE],
    unencrypted: BTreeSet<String>,
}

impl Default for ContentCipher {
    fn default() -> Self {
        Self::new(DEFAULT_XOR_TABLE, DEFAULT_UNENCRYPTED_EXTENSIONS.iter().copied())
    }
}

impl ContentCipher {
    /// Create a cipher from a keystream table and the set of extensions that
    /// bypass it.
    pub fn new<I, S>(table: [u8; XOR_TABLE_SIZE], unencrypted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            table,
            unencrypted: unencrypted
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    /// Create a cipher from a table of unchecked length.
    pub fn from_slice<I, S>(table: &[u8], unencrypted: I) -> Result<Self, CryptoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table: [u8; XOR_TABLE_SIZE] =
            table
                .try_into()
                .map_err(|_| CryptoError::InvalidTableSize {
                    expected: XOR_TABLE_SIZE,
                    actual: table.len(),
                })?;
        Ok(Self::new(table, unencrypted))
    }

    /// XOR `buffer` in place, continuing the keystream at `index`.
    ///
    /// On return `index` points at the key byte for the next call, so a
    /// stream can be processed in pieces.
    pub fn apply(&self, buffer: &mut [u8], index: &mut u8) {
        for byte in buffer {
            *byte ^= self.table[usize::from(*index)];
            *index = index.wrapping_add(1);
        }
    }

    /// XOR `buffer` in place with the keystream starting at 0.
    pub fn apply_from_start(&self, buffer: &mut [u8]) {
        let mut index = 0u8;
        self.apply(buffer, &mut index);
    }

    /// Whether payloads with this extension go through the keystream.
    pub fn is_encrypted(&self, extension: &str) -> bool {
        !self.unencrypted.contains(&normalize_extension(extension))
    }

    /// The keystream table
    pub fn table(&self) -> &[u8; XOR_TABLE_SIZE] {
        &self.table
    }

    /// Extensions stored in the clear, normalized
    pub fn unencrypted_extensions(&self) -> impl Iterator<Item = &str> {
        self.unencrypted.iter().map(String::as_str)
    }
}
