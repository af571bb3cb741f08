//! Pre-write backups of shard and index files.
//!
//! When enabled, the first destructive write to a file during an operation
//! copies it to `{file}_BAK_{timestamp}` in chunks. A leftover rebuild
//! scratch file `{file}_NEW` from an interrupted run is renamed to
//! `{file}_OLD_{timestamp}` first so it is not lost.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use crate::mover::ChunkMover;
use crate::{REBUILD_SUFFIX, Result};

/// Suffix marker of backup copies.
pub const BACKUP_MARKER: &str = "_BAK_";

/// Suffix marker of preserved rebuild scratch files.
pub const ORPHAN_MARKER: &str = "_OLD_";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Backups taken during one engine operation; each file is copied at most
/// once per session.
#[derive(Debug)]
pub struct BackupSession {
    enabled: bool,
    chunk_size: usize,
    stamp: String,
    done: HashSet<PathBuf>,
}

impl BackupSession {
    /// Start a session. A disabled session never touches the filesystem.
    pub fn new(enabled: bool, chunk_size: usize) -> Self {
        Self {
            enabled,
            chunk_size,
            stamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            done: HashSet::new(),
        }
    }

    /// Back up `path` unless this session already did, returning the copy's
    /// path when one was written.
    ///
    /// Missing files have nothing to preserve and are skipped.
    pub fn ensure(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if !self.enabled || self.done.contains(path) {
            return Ok(None);
        }

        let scratch = with_suffix(path, REBUILD_SUFFIX);
        if scratch.exists() {
            let kept = self.unused_name(path, ORPHAN_MARKER);
            std::fs::rename(&scratch, &kept)?;
            info!("kept leftover {} as {}", scratch.display(), kept.display());
        }

        self.done.insert(path.to_path_buf());
        if !path.exists() {
            return Ok(None);
        }

        let target = self.unused_name(path, BACKUP_MARKER);
        let mut source = File::open(path)?;
        let mut writer = BufWriter::new(File::create(&target)?);
        let copied = ChunkMover::new(self.chunk_size).copy_all(&mut source, &mut writer)?;
        writer.flush()?;
        debug!("backed up {} ({} bytes) to {}", path.display(), copied, target.display());
        Ok(Some(target))
    }

    fn unused_name(&self, path: &Path, marker: &str) -> PathBuf {
        let base = with_suffix(path, &format!("{marker}{}", self.stamp));
        if !base.exists() {
            return base;
        }
        (1u32..)
            .map(|n| with_suffix(&base, &format!("_{n}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(base)
    }
}

/// `data.003` + `_NEW` -> `data.003_NEW`
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
