//! Configuration for the archive engine

use rzdata_crypto::xor::normalize_extension;
use rzdata_crypto::{
    ContentCipher, DEFAULT_UNENCRYPTED_EXTENSIONS, DEFAULT_XOR_TABLE, XOR_TABLE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{ArchiveError, Result};

/// Default chunk size for backup copies and in-file moves.
pub const DEFAULT_CHUNK_SIZE: usize = 64_000;

/// Extensions the game client knows how to load.
pub const DEFAULT_STORABLE_EXTENSIONS: &[&str] = &[
    "bmp", "cfg", "cob", "db", "dds", "dmp", "fx", "gc2", "gci", "ini", "jpg", "jtv", "lua",
    "lst", "m4v", "max", "naf", "nfa", "nfc", "nfe", "nfk", "nfl", "nfm", "nfp", "nfs", "nfw",
    "nui", "nx3", "otf", "obj", "ogg", "png", "pvs", "qpf", "rdb", "sdb", "spr", "spt", "tif",
    "tga", "tml", "ttf", "txt", "wav", "xml",
];

/// Configuration for an archive engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding `data.000` and the shard files
    pub data_dir: PathBuf,

    /// Copy shards to `_BAK_` files before modifying them
    pub backups: bool,

    /// Chunk size for backup copies and in-file moves (in bytes)
    pub chunk_size: usize,

    /// Extensions allowed in dump exports and builds
    pub storable_extensions: BTreeSet<String>,

    /// Extensions stored without the XOR keystream
    pub unencrypted_extensions: BTreeSet<String>,

    /// Replacement keystream table, hex-encoded when serialized
    #[serde(with = "hex_table", skip_serializing_if = "Option::is_none")]
    pub xor_table: Option<Vec<u8>>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backups: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            storable_extensions: DEFAULT_STORABLE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            unencrypted_extensions: DEFAULT_UNENCRYPTED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            xor_table: None,
        }
    }
}

impl ArchiveConfig {
    /// Create a new configuration for the given archive directory
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the archive directory
    #[must_use]
    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    /// Enable or disable shard backups
    #[must_use]
    pub const fn with_backups(mut self, enable: bool) -> Self {
        self.backups = enable;
        self
    }

    /// Set the chunk size
    #[must_use]
    pub const fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Replace the storable extension list
    #[must_use]
    pub fn with_storable_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.storable_extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self
    }

    /// Replace the unencrypted extension list
    #[must_use]
    pub fn with_unencrypted_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.unencrypted_extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self
    }

    /// Override the XOR keystream table
    #[must_use]
    pub fn with_xor_table(mut self, table: Vec<u8>) -> Self {
        self.xor_table = Some(table);
        self
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ArchiveError::Config("chunk_size must be non-zero".to_string()));
        }
        if let Some(table) = &self.xor_table
            && table.len() != XOR_TABLE_SIZE
        {
            return Err(ArchiveError::Config(format!(
                "xor_table must be {XOR_TABLE_SIZE} bytes, got {}",
                table.len()
            )));
        }
        Ok(())
    }

    /// Whether payloads with this extension may be exported to or built
    /// from a dump directory
    pub fn is_storable(&self, extension: &str) -> bool {
        let extension = normalize_extension(extension);
        self.storable_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&extension))
    }

    /// Build the content cipher this configuration describes
    pub fn content_cipher(&self) -> Result<ContentCipher> {
        let cipher = match &self.xor_table {
            Some(table) => ContentCipher::from_slice(table, &self.unencrypted_extensions)?,
            None => ContentCipher::new(DEFAULT_XOR_TABLE, &self.unencrypted_extensions),
        };
        Ok(cipher)
    }
}

mod hex_table {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(table: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match table {
            Some(table) => serializer.serialize_some(&hex::encode(table)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| hex::decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert!(!config.backups);
        assert_eq!(config.chunk_size, 64_000);
        assert!(config.is_storable("rdb"));
        assert!(config.is_storable(".XML"));
        assert!(!config.is_storable("exe"));
        assert!(!config.is_storable(""));
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_builders() {
        let config = ArchiveConfig::new("/client/data")
            .with_backups(true)
            .with_chunk_size(4096)
            .with_storable_extensions([".LUA"])
            .with_unencrypted_extensions(["lua"]);
        assert_eq!(config.data_dir, PathBuf::from("/client/data"));
        assert!(config.backups);
        assert!(config.is_storable("lua"));
        assert!(!config.is_storable("rdb"));

        let cipher = config.content_cipher().expect("cipher");
        assert!(!cipher.is_encrypted("lua"));
        assert!(cipher.is_encrypted("dds"));
    }

    #[test]
    fn test_validation() {
        let zero_chunk = ArchiveConfig::default().with_chunk_size(0);
        assert!(matches!(zero_chunk.validate(), Err(ArchiveError::Config(_))));

        let short_table = ArchiveConfig::default().with_xor_table(vec![0; 10]);
        assert!(matches!(short_table.validate(), Err(ArchiveError::Config(_))));
        assert!(short_table.content_cipher().is_err());
    }

    #[test]
    fn test_serde_round_trip_with_table() {
        let config = ArchiveConfig::new("/client/data").with_xor_table(DEFAULT_XOR_TABLE.to_vec());
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("77e85eecb74ec187"));

        let parsed: ArchiveConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.content_cipher().expect("cipher").table(),
            &DEFAULT_XOR_TABLE
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: ArchiveConfig =
            serde_json::from_str(r#"{"data_dir": "/srv/rz", "backups": true}"#).expect("parse");
        assert_eq!(parsed.data_dir, PathBuf::from("/srv/rz"));
        assert!(parsed.backups);
        assert_eq!(parsed.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(parsed.xor_table.is_none());
        assert!(parsed.unencrypted_extensions.contains("dds"));
    }
}
