//! Dump directory layout.
//!
//! A dump holds one folder per extension, named in upper case, with the
//! plain file names inside: `{root}/RDB/db_item.rdb`. Files without an
//! extension go to `{root}/_/`.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::{ArchiveError, Result};

const NO_EXTENSION_DIR: &str = "_";

/// Folder name for an extension
pub fn extension_dir(extension: &str) -> String {
    if extension.is_empty() {
        NO_EXTENSION_DIR.to_string()
    } else {
        extension.to_ascii_uppercase()
    }
}

/// Where `plain_name` lives inside a dump rooted at `root`
pub fn dump_path(root: &Path, plain_name: &str) -> PathBuf {
    let extension = plain_name.rsplit_once('.').map_or("", |(_, ext)| ext);
    root.join(extension_dir(extension)).join(plain_name)
}

/// One file found in a dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFile {
    /// Path on disk
    pub path: PathBuf,
    /// File name, used as the archive name
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

/// List every `{root}/{EXT}/{file}` in the dump, sorted by path.
///
/// Files at other depths are ignored. Names that are not valid UTF-8 are
/// skipped with a warning.
pub fn scan_dump(root: &Path) -> Result<Vec<DumpFile>> {
    if !root.is_dir() {
        return Err(ArchiveError::DumpMissing(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!("skipping non-UTF-8 file name {}", entry.path().display());
            continue;
        };
        files.push(DumpFile {
            name: name.to_string(),
            size: entry.metadata().map_err(std::io::Error::from)?.len(),
            path: entry.path().to_path_buf(),
        });
    }
    Ok(files)
}
