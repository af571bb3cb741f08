//! Ciphers and hashes for rzdata archives
//!
//! Every asset stored in an rzdata archive is identified on disk by an
//! obfuscated "hash name" and lives in one of eight shard files. This crate
//! provides the primitives that tie those together.
//!
//! # Components
//!
//! - **Name cipher**: the stateful, reversible obfuscation of file names
//! - **Shard assignment**: deterministic mapping of a name to shard 1-8
//! - **Content cipher**: the 256-byte XOR keystream applied to payloads and the index
//! - **Digests**: MD5 and SHA-512 fingerprints of payloads
//!
//! # Examples
//!
//! ## Name Obfuscation
//!
//! ```
//! use rzdata_crypto::NameCipher;
//!
//! let hash = NameCipher::encode("db_item.rdb").expect("ascii name");
//! assert!(NameCipher::is_encoded(&hash));
//! assert_eq!(NameCipher::decode(&hash).expect("valid hash"), "db_item.rdb");
//!
//! let shard = NameCipher::shard_id("db_item.rdb").expect("ascii name");
//! assert_eq!(shard.get(), 3);
//! ```
//!
//! ## Content Cipher
//!
//! ```
//! use rzdata_crypto::ContentCipher;
//!
//! let cipher = ContentCipher::default();
//! let mut payload = b"local x = 1".to_vec();
//! cipher.apply_from_start(&mut payload);
//! cipher.apply_from_start(&mut payload);
//! assert_eq!(payload, b"local x = 1");
//! assert!(!cipher.is_encrypted("dds"));
//! ```

#![warn(missing_docs)]

pub mod digest;
pub mod error;
pub mod name;
pub mod shard;
pub mod xor;

pub use error::CryptoError;

// Re-export commonly used types
pub use digest::{Md5Digest, Sha512Digest};
pub use name::NameCipher;
pub use shard::ShardId;
pub use xor::{ContentCipher, DEFAULT_UNENCRYPTED_EXTENSIONS, DEFAULT_XOR_TABLE, XOR_TABLE_SIZE};
