//! Archive engine: keeps `data.000` and the eight shard files consistent.
//!
//! Payloads are appended to the end of their shard. Updates that fit are
//! written in place and leave orphan bytes behind; updates that grow move
//! the payload to the end. Deletes splice the region out of the shard and
//! shift later offsets down. [`ArchiveEngine::rebuild`] rewrites a shard with
//! only its live entries.
//!
//! Every mutating call takes the archive lock, backs up the files it is
//! about to change (when backups are enabled), and persists the index with
//! an atomic temp-file rename before returning.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rzdata_crypto::{ContentCipher, Md5Digest, Sha512Digest, ShardId};
use rzdata_formats::{DataIndex, IndexEntry, SortOrder};
use tracing::{debug, info, warn};

use crate::backup::{BackupSession, with_suffix};
use crate::batch::BatchReport;
use crate::config::ArchiveConfig;
use crate::dump::{dump_path, scan_dump};
use crate::events::{ArchiveEvent, ArchiveObserver, EventSink};
use crate::lock::ArchiveLock;
use crate::mover::{ChunkMover, DataSpan};
use crate::{ArchiveError, REBUILD_SUFFIX, Result, index_path, shard_path};

/// Outcome of a shard rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Shard that was rebuilt
    pub shard: ShardId,
    /// Entries copied
    pub entries: usize,
    /// Shard size before
    pub old_size: u64,
    /// Shard size after
    pub new_size: u64,
}

impl RebuildSummary {
    /// Bytes the rebuild reclaimed
    pub const fn reclaimed(&self) -> u64 {
        self.old_size.saturating_sub(self.new_size)
    }
}

/// Space accounting for one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    /// Shard described
    pub shard: ShardId,
    /// File size in bytes
    pub size: u64,
    /// Bytes referenced by index entries
    pub live_bytes: u64,
    /// Bytes no entry references
    pub orphan_bytes: u64,
    /// Number of index entries in this shard
    pub entries: usize,
}

/// Read/write access to one archive directory.
#[derive(Debug)]
pub struct ArchiveEngine {
    config: ArchiveConfig,
    cipher: ContentCipher,
    index: DataIndex,
    events: EventSink,
}

impl ArchiveEngine {
    /// Open an existing archive.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::IndexMissing`] if `data.000` does not exist, or an
    /// index error if it cannot be parsed.
    pub fn open(config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        let cipher = config.content_cipher()?;

        let path = index_path(&config.data_dir);
        if !path.is_file() {
            return Err(ArchiveError::IndexMissing(path));
        }

        let bytes = fs::read(&path)?;
        let index = DataIndex::parse(&bytes, &cipher)?;
        info!(
            "opened archive {} with {} entries",
            config.data_dir.display(),
            index.len()
        );

        Ok(Self {
            config,
            cipher,
            index,
            events: EventSink::default(),
        })
    }

    /// Create a new, empty archive: an empty index and eight empty shards.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::AlreadyExists`] if the directory already holds an
    /// index.
    pub fn create(config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        let cipher = config.content_cipher()?;

        fs::create_dir_all(&config.data_dir)?;
        let path = index_path(&config.data_dir);
        if path.exists() {
            return Err(ArchiveError::AlreadyExists(path));
        }

        let engine = Self {
            config,
            cipher,
            index: DataIndex::new(),
            events: EventSink::default(),
        };

        let _lock = engine.lock()?;
        let mut backups = engine.backup_session();
        for shard in ShardId::all() {
            let shard_file = engine.shard_path(shard);
            backups.ensure(&shard_file)?;
            File::create(&shard_file)?;
        }
        engine.persist(&mut backups)?;
        info!("created archive {}", engine.config.data_dir.display());
        Ok(engine)
    }

    /// Attach an observer for progress and diagnostics
    #[must_use]
    pub fn with_observer<O: ArchiveObserver + 'static>(mut self, observer: O) -> Self {
        self.events.set(Some(Box::new(observer)));
        self
    }

    /// Replace or remove the observer
    pub fn set_observer(&mut self, observer: Option<Box<dyn ArchiveObserver>>) {
        self.events.set(observer);
    }

    /// Engine configuration
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Content cipher in use
    pub fn cipher(&self) -> &ContentCipher {
        &self.cipher
    }

    /// The in-memory index
    pub fn index(&self) -> &DataIndex {
        &self.index
    }

    /// Entry for a plain or hash name
    pub fn entry(&self, name: &str) -> Option<&IndexEntry> {
        self.index.get(name)
    }

    fn shard_path(&self, shard: ShardId) -> PathBuf {
        shard_path(&self.config.data_dir, shard)
    }

    fn lock(&self) -> Result<ArchiveLock> {
        ArchiveLock::acquire(&self.config.data_dir)
    }

    fn backup_session(&self) -> BackupSession {
        BackupSession::new(self.config.backups, self.config.chunk_size)
    }

    fn existing_shard(&self, shard: ShardId) -> Result<PathBuf> {
        let path = self.shard_path(shard);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ArchiveError::ShardMissing(path))
        }
    }

    /// Copy of `data` ready to be written for a payload with `extension`
    fn encipher(&self, extension: &str, data: &[u8]) -> Vec<u8> {
        let mut payload = data.to_vec();
        if self.cipher.is_encrypted(extension) {
            self.cipher.apply_from_start(&mut payload);
        }
        payload
    }

    fn check_bounds(entry: &IndexEntry, size: u64) -> Result<()> {
        if entry.end() > size {
            return Err(ArchiveError::OutOfBounds {
                name: entry.plain_name().to_string(),
                shard: entry.shard(),
                offset: entry.offset(),
                length: entry.length(),
                size,
            });
        }
        Ok(())
    }

    fn read_from(&self, file: &mut File, size: u64, entry: &IndexEntry) -> Result<Vec<u8>> {
        Self::check_bounds(entry, size)?;
        let mut data = vec![0u8; entry.length() as usize];
        file.seek(SeekFrom::Start(u64::from(entry.offset())))?;
        file.read_exact(&mut data)?;
        if self.cipher.is_encrypted(entry.extension()) {
            self.cipher.apply_from_start(&mut data);
        }
        Ok(data)
    }

    /// Read and decipher the payload of `entry`.
    pub fn read(&self, entry: &IndexEntry) -> Result<Vec<u8>> {
        let path = self.existing_shard(entry.shard())?;
        let mut file = File::open(&path)?;
        let size = file.metadata()?.len();
        self.read_from(&mut file, size, entry)
    }

    /// Read and decipher the payload stored under a plain or hash name.
    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .index
            .get(name)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        self.read(entry)
    }

    /// MD5 of the deciphered payload
    pub fn md5(&self, name: &str) -> Result<Md5Digest> {
        Ok(Md5Digest::from_data(&self.read_by_name(name)?))
    }

    /// SHA-512 of the deciphered payload
    pub fn sha512(&self, name: &str) -> Result<Sha512Digest> {
        Ok(Sha512Digest::from_data(&self.read_by_name(name)?))
    }

    /// Write the payload of `entry` to `dest` verbatim, creating parent
    /// directories as needed.
    pub fn export(&self, entry: &IndexEntry, dest: &Path) -> Result<()> {
        let data = self.read(entry)?;
        write_file(dest, &data)?;
        debug!("exported {} to {}", entry.plain_name(), dest.display());
        Ok(())
    }

    /// Store `data` under `name`. An existing entry is updated instead.
    ///
    /// Returns the entry as recorded in the index.
    pub fn import(&mut self, name: &str, data: &[u8]) -> Result<IndexEntry> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        let snapshot = self.index.clone();
        let entry = self.import_unlocked(name, data, &mut backups)?;
        self.commit(snapshot, &mut backups)?;
        Ok(entry)
    }

    /// Import a file from disk under its file name.
    pub fn import_file(&mut self, path: &Path) -> Result<IndexEntry> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        let snapshot = self.index.clone();
        let entry = self.import_path(path, &mut backups)?;
        self.commit(snapshot, &mut backups)?;
        Ok(entry)
    }

    /// Replace the payload of an existing entry.
    ///
    /// A payload no longer than the current one is written in place; a
    /// longer one is appended and the entry repointed. The old bytes stay
    /// in the shard until it is rebuilt.
    pub fn update(&mut self, name: &str, data: &[u8]) -> Result<IndexEntry> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        let snapshot = self.index.clone();
        let entry = self.update_unlocked(name, data, &mut backups)?;
        self.commit(snapshot, &mut backups)?;
        Ok(entry)
    }

    fn import_path(&mut self, path: &Path, backups: &mut BackupSession) -> Result<IndexEntry> {
        if !path.is_file() {
            return Err(ArchiveError::FileMissing(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ArchiveError::InvalidArgument(format!("unusable file name: {}", path.display()))
            })?
            .to_string();
        let data = fs::read(path)?;
        self.import_unlocked(&name, &data, backups)
    }

    fn import_unlocked(
        &mut self,
        name: &str,
        data: &[u8],
        backups: &mut BackupSession,
    ) -> Result<IndexEntry> {
        if self.index.contains(name) {
            return self.update_unlocked(name, data, backups);
        }

        let mut entry = IndexEntry::new(name, 0, 0)?;
        let length = payload_length(data)?;
        let path = self.existing_shard(entry.shard())?;
        let payload = self.encipher(entry.extension(), data);

        backups.ensure(&path)?;
        let mut file = OpenOptions::new().write(true).open(&path)?;
        let offset = append(&mut file, entry.shard(), &payload)?;
        file.sync_all()?;

        entry.set_location(offset, length);
        debug!(
            "imported {} into shard {} at {} ({} bytes)",
            entry.plain_name(),
            entry.shard(),
            offset,
            length
        );
        self.index.push(entry.clone());
        Ok(entry)
    }

    fn update_unlocked(
        &mut self,
        name: &str,
        data: &[u8],
        backups: &mut BackupSession,
    ) -> Result<IndexEntry> {
        let position = self
            .index
            .position(name)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        let current = self
            .index
            .get_at(position)
            .cloned()
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;

        let length = payload_length(data)?;
        let path = self.existing_shard(current.shard())?;
        let payload = self.encipher(current.extension(), data);

        backups.ensure(&path)?;
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let offset = if length <= current.length() {
            Self::check_bounds(&current, file.metadata()?.len())?;
            file.seek(SeekFrom::Start(u64::from(current.offset())))?;
            file.write_all(&payload)?;
            current.offset()
        } else {
            append(&mut file, current.shard(), &payload)?
        };
        file.sync_all()?;

        let entry = self
            .index
            .get_at_mut(position)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        entry.set_location(offset, length);
        debug!(
            "updated {} in shard {}: {} bytes at {}",
            entry.plain_name(),
            entry.shard(),
            length,
            offset
        );
        Ok(entry.clone())
    }

    /// Remove an entry and splice its bytes out of the shard.
    ///
    /// Later entries of the same shard move down by the removed length.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Overlap`] if another entry shares bytes with this
    /// one; nothing is modified in that case.
    pub fn delete(&mut self, name: &str) -> Result<IndexEntry> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();

        let position = self
            .index
            .position(name)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        let target = self
            .index
            .get_at(position)
            .cloned()
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        let shard = target.shard();
        let span = DataSpan::new(u64::from(target.offset()), u64::from(target.length()));

        if let Some(other) = self.index.iter().enumerate().find_map(|(i, e)| {
            (i != position
                && e.shard() == shard
                && span.overlaps(&DataSpan::new(u64::from(e.offset()), u64::from(e.length()))))
            .then_some(e)
        }) {
            return Err(ArchiveError::Overlap {
                shard,
                first: target.plain_name().to_string(),
                second: other.plain_name().to_string(),
            });
        }

        let path = self.existing_shard(shard)?;
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        Self::check_bounds(&target, file.metadata()?.len())?;

        backups.ensure(&path)?;
        let new_size = ChunkMover::new(self.config.chunk_size).splice_out(&mut file, span)?;
        file.sync_all()?;
        drop(file);

        let snapshot = self.index.clone();
        let removed = self
            .index
            .remove(name)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        let (offset, length) = (removed.offset(), removed.length());
        for entry in self.index.iter_mut().filter(|e| e.shard() == shard) {
            if entry.offset() > offset {
                // Empty entries inside the removed region collapse onto its start
                entry.set_offset(entry.offset().saturating_sub(length).max(offset));
            }
        }

        self.commit(snapshot, &mut backups)?;
        info!(
            "deleted {} from shard {} ({} bytes), shard now {} bytes",
            removed.plain_name(),
            shard,
            length,
            new_size
        );
        Ok(removed)
    }

    /// Rewrite a shard with only its live entries, in ascending offset
    /// order, dropping orphan bytes.
    ///
    /// The new shard is written to `data.00N_NEW` and renamed over the
    /// original; a cancelled or failed rebuild removes the scratch file and
    /// leaves the shard and index untouched.
    pub fn rebuild(&mut self, shard: ShardId) -> Result<RebuildSummary> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();

        let path = self.existing_shard(shard)?;
        let old_size = fs::metadata(&path)?.len();

        let mut positions: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, e)| e.shard() == shard)
            .map(|(i, _)| i)
            .collect();
        positions.sort_by_key(|&i| self.index.entries()[i].offset());
        for &i in &positions {
            Self::check_bounds(&self.index.entries()[i], old_size)?;
        }

        backups.ensure(&path)?;
        let scratch = with_suffix(&path, REBUILD_SUFFIX);
        let offsets = match self.write_rebuild(shard, &path, &scratch, &positions) {
            Ok(offsets) => offsets,
            Err(e) => {
                let _ = fs::remove_file(&scratch);
                return Err(e);
            }
        };
        fs::rename(&scratch, &path)?;

        for (position, offset) in offsets {
            if let Some(entry) = self.index.get_at_mut(position) {
                entry.set_offset(offset);
            }
        }
        self.persist(&mut backups)?;

        let summary = RebuildSummary {
            shard,
            entries: positions.len(),
            old_size,
            new_size: fs::metadata(&path)?.len(),
        };
        info!(
            "rebuilt shard {}: {} entries, {} -> {} bytes",
            shard, summary.entries, summary.old_size, summary.new_size
        );
        Ok(summary)
    }

    fn write_rebuild(
        &self,
        shard: ShardId,
        source_path: &Path,
        scratch: &Path,
        positions: &[usize],
    ) -> Result<Vec<(usize, u32)>> {
        let mut source = File::open(source_path)?;
        let mut dest = BufWriter::new(File::create(scratch)?);
        let mut mover = ChunkMover::new(self.config.chunk_size);
        let mut offsets = Vec::with_capacity(positions.len());
        let mut write_pos = 0u64;
        let total = positions.len() as u64;

        for (step, &position) in positions.iter().enumerate() {
            if self.events.is_cancelled() {
                warn!("rebuild of shard {} cancelled", shard);
                return Err(ArchiveError::Cancelled);
            }

            let entry = &self.index.entries()[position];
            let offset = u32::try_from(write_pos).map_err(|_| ArchiveError::ShardFull {
                shard,
                size: write_pos,
            })?;
            source.seek(SeekFrom::Start(u64::from(entry.offset())))?;
            mover.copy_exact(&mut source, &mut dest, u64::from(entry.length()))?;
            offsets.push((position, offset));
            write_pos += u64::from(entry.length());

            self.events.emit(|| {
                ArchiveEvent::info(format!("copied {}", entry.plain_name()))
                    .with_progress(step as u64 + 1, total)
            });
        }

        let file = dest.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(offsets)
    }

    /// Replace the archive contents with the files of a dump directory.
    ///
    /// Every shard is truncated, then the files of each shard are appended
    /// in ascending size order. The new index lists entries in scan order.
    /// Unstorable extensions and repeated names are skipped; unreadable
    /// files are reported and left out.
    pub fn build_from_dump(&mut self, root: &Path) -> Result<BatchReport> {
        let files = scan_dump(root)?;
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        let mut report = BatchReport::default();

        let mut chosen = Vec::with_capacity(files.len());
        let mut seen = HashSet::new();
        for file in files {
            let extension = file.name.rsplit_once('.').map_or("", |(_, ext)| ext);
            if !self.config.is_storable(extension) {
                self.events
                    .emit(|| ArchiveEvent::warning(format!("skipped {}: not storable", file.name)));
                report.skip(file.name, "extension not storable");
                continue;
            }
            let entry = match IndexEntry::new(&file.name, 0, 0) {
                Ok(entry) => entry,
                Err(e) => {
                    self.events
                        .emit(|| ArchiveEvent::error(format!("{}: {e}", file.name)));
                    report.failure(file.name, e.into());
                    continue;
                }
            };
            if !seen.insert(entry.hash_name().to_string()) {
                self.events
                    .emit(|| ArchiveEvent::warning(format!("skipped {}: duplicate", file.name)));
                report.skip(file.name, "duplicate name");
                continue;
            }
            chosen.push((entry, file));
        }

        let mut order: Vec<usize> = (0..chosen.len()).collect();
        order.sort_by_key(|&i| (chosen[i].0.shard(), chosen[i].1.size));

        let mut writers = BTreeMap::new();
        for shard in ShardId::all() {
            let path = self.shard_path(shard);
            backups.ensure(&path)?;
            writers.insert(shard, (BufWriter::new(File::create(&path)?), 0u64));
        }

        let mut written = vec![false; chosen.len()];
        let total = order.len() as u64;
        for (step, &i) in order.iter().enumerate() {
            if self.events.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let (entry, file) = &mut chosen[i];
            let Some((writer, position)) = writers.get_mut(&entry.shard()) else {
                continue;
            };

            // Only the dump file is per-item; shard write errors abort the build
            let placed = fs::read(&file.path)
                .map_err(ArchiveError::from)
                .and_then(|data| {
                    let length = payload_length(&data)?;
                    let offset = u32::try_from(*position)
                        .ok()
                        .filter(|_| *position + u64::from(length) <= u64::from(u32::MAX))
                        .ok_or_else(|| ArchiveError::ShardFull {
                            shard: entry.shard(),
                            size: *position + u64::from(length),
                        })?;
                    Ok((data, offset, length))
                });

            match placed {
                Ok((data, offset, length)) => {
                    writer.write_all(&self.encipher(entry.extension(), &data))?;
                    entry.set_location(offset, length);
                    *position += u64::from(length);
                    written[i] = true;
                    report.success(file.name.clone());
                }
                Err(e) => {
                    self.events
                        .emit(|| ArchiveEvent::error(format!("{}: {e}", file.name)));
                    report.failure(file.name.clone(), e);
                }
            }
            self.events.emit(|| {
                ArchiveEvent::info(format!("stored {}", file.name))
                    .with_progress(step as u64 + 1, total)
            });
        }

        for (writer, _) in writers.into_values() {
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }

        self.index = DataIndex::from_entries(
            chosen
                .into_iter()
                .zip(written)
                .filter_map(|((entry, _), done)| done.then_some(entry))
                .collect(),
        );
        self.persist(&mut backups)?;
        info!(
            "built archive from {}: {} stored, {} skipped, {} failed",
            root.display(),
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Import many files, continuing past individual failures.
    ///
    /// The lock is held and the index persisted once for the whole batch.
    pub fn import_files<I, P>(&mut self, paths: I) -> Result<BatchReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        let mut report = BatchReport::default();
        let snapshot = self.index.clone();

        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        let total = paths.len() as u64;
        for (step, path) in paths.iter().enumerate() {
            if self.events.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.import_path(path, &mut backups) {
                Ok(entry) => report.success(entry.plain_name()),
                Err(e) => {
                    self.events
                        .emit(|| ArchiveEvent::error(format!("{}: {e}", path.display())));
                    report.failure(path.display().to_string(), e);
                }
            }
            self.events.emit(|| {
                ArchiveEvent::info(format!("imported {}", path.display()))
                    .with_progress(step as u64 + 1, total)
            });
        }

        self.commit(snapshot, &mut backups)?;
        Ok(report)
    }

    /// Export entries into a dump directory as `{root}/{EXT}/{name}`.
    ///
    /// Entries are read grouped by shard in ascending offset order.
    /// Unstorable extensions are skipped with a warning.
    pub fn export_entries<'a, I>(&self, entries: I, root: &Path) -> Result<BatchReport>
    where
        I: IntoIterator<Item = &'a IndexEntry>,
    {
        let mut selected: Vec<&IndexEntry> = entries.into_iter().collect();
        selected.sort_by_key(|e| (e.shard(), e.offset()));
        fs::create_dir_all(root)?;

        let mut report = BatchReport::default();
        let mut open: Option<(ShardId, File, u64)> = None;
        let total = selected.len() as u64;

        for (step, entry) in selected.into_iter().enumerate() {
            if self.events.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if !self.config.is_storable(entry.extension()) {
                self.events.emit(|| {
                    ArchiveEvent::warning(format!("skipped {}: not storable", entry.plain_name()))
                });
                report.skip(entry.plain_name(), "extension not storable");
                continue;
            }

            let dest = dump_path(root, entry.plain_name());
            let result = self
                .shard_handle(&mut open, entry.shard())
                .and_then(|(file, size)| self.read_from(file, size, entry))
                .and_then(|data| write_file(&dest, &data));
            match result {
                Ok(()) => report.success(entry.plain_name()),
                Err(e) => {
                    self.events
                        .emit(|| ArchiveEvent::error(format!("{}: {e}", entry.plain_name())));
                    report.failure(entry.plain_name(), e);
                }
            }
            self.events.emit(|| {
                ArchiveEvent::info(format!("exported {}", entry.plain_name()))
                    .with_progress(step as u64 + 1, total)
            });
        }

        Ok(report)
    }

    /// Export every entry into a dump directory
    pub fn export_all(&self, root: &Path) -> Result<BatchReport> {
        self.export_entries(self.index.iter(), root)
    }

    fn shard_handle<'h>(
        &self,
        open: &'h mut Option<(ShardId, File, u64)>,
        shard: ShardId,
    ) -> Result<(&'h mut File, u64)> {
        if open.as_ref().is_none_or(|(current, _, _)| *current != shard) {
            let path = self.existing_shard(shard)?;
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            *open = Some((shard, file, size));
        }
        match open {
            Some((_, file, size)) => Ok((file, *size)),
            None => Err(ArchiveError::ShardMissing(self.shard_path(shard))),
        }
    }

    /// Space accounting for one shard
    pub fn shard_stats(&self, shard: ShardId) -> Result<ShardStats> {
        let path = self.existing_shard(shard)?;
        let size = fs::metadata(&path)?.len();
        let entries = self.index.entries_in_shard(shard);
        let live_bytes = DataIndex::stored_size(entries.iter().copied());
        Ok(ShardStats {
            shard,
            size,
            live_bytes,
            orphan_bytes: size.saturating_sub(live_bytes),
            entries: entries.len(),
        })
    }

    /// Reorder the in-memory index; [`save`](Self::save) writes that order.
    pub fn sort(&mut self, order: SortOrder) {
        self.index.sort(order);
    }

    /// Write the index in its current order.
    pub fn save(&self) -> Result<()> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        self.persist(&mut backups)
    }

    /// Drop every entry of `shard` from the index and persist it.
    ///
    /// The shard file is left as is; a following [`rebuild`](Self::rebuild)
    /// empties it.
    pub fn delete_shard_entries(&mut self, shard: ShardId) -> Result<usize> {
        let _lock = self.lock()?;
        let mut backups = self.backup_session();
        let snapshot = self.index.clone();
        let removed = self.index.remove_shard(shard).len();
        self.commit(snapshot, &mut backups)?;
        info!("removed {} entries of shard {}", removed, shard);
        Ok(removed)
    }

    /// Persist the index, or put `snapshot` back if that fails so the
    /// in-memory index keeps matching `data.000`.
    fn commit(&mut self, snapshot: DataIndex, backups: &mut BackupSession) -> Result<()> {
        if let Err(e) = self.persist(backups) {
            warn!("index not saved, reverting to {} entries: {e}", snapshot.len());
            self.index = snapshot;
            return Err(e);
        }
        Ok(())
    }

    /// Write `data.000` atomically: temp file, fsync, rename.
    fn persist(&self, backups: &mut BackupSession) -> Result<()> {
        let path = index_path(&self.config.data_dir);
        backups.ensure(&path)?;

        let bytes = self.index.build(&self.cipher)?;
        let temp_path = with_suffix(&path, ".tmp");
        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!("saved index with {} entries ({} bytes)", self.index.len(), bytes.len());
        Ok(())
    }
}

fn payload_length(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len()).map_err(|_| {
        ArchiveError::InvalidArgument(format!(
            "payload of {} bytes exceeds the 32-bit length field",
            data.len()
        ))
    })
}

/// Append `payload` at the end of `file`, returning its offset.
fn append(file: &mut File, shard: ShardId, payload: &[u8]) -> Result<u32> {
    let end = file.seek(SeekFrom::End(0))?;
    let new_size = end + payload.len() as u64;
    if new_size > u64::from(u32::MAX) {
        return Err(ArchiveError::ShardFull {
            shard,
            size: new_size,
        });
    }
    let offset = u32::try_from(end).map_err(|_| ArchiveError::ShardFull {
        shard,
        size: new_size,
    })?;
    file.write_all(payload)?;
    Ok(offset)
}

fn write_file(dest: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, data)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_reports_offsets() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data.001");
        std::fs::write(&path, b"abc").expect("write");
        let shard = ShardId::new(1).expect("shard");

        let mut file = OpenOptions::new().write(true).open(&path).expect("open");
        assert_eq!(append(&mut file, shard, b"de").expect("append"), 3);
        assert_eq!(append(&mut file, shard, b"f").expect("append"), 5);
        drop(file);
        assert_eq!(std::fs::read(&path).expect("read"), b"abcdef");
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = tempdir().expect("tempdir");
        let dest = dir.path().join("RDB/db_item.rdb");
        write_file(&dest, b"x").expect("write");
        assert_eq!(std::fs::read(&dest).expect("read"), b"x");
    }

    #[test]
    fn test_rebuild_summary() {
        let summary = RebuildSummary {
            shard: ShardId::new(2).expect("shard"),
            entries: 3,
            old_size: 100,
            new_size: 60,
        };
        assert_eq!(summary.reclaimed(), 40);
    }

    #[test]
    fn test_open_missing_index() {
        let dir = tempdir().expect("tempdir");
        let result = ArchiveEngine::open(ArchiveConfig::new(dir.path()));
        assert!(matches!(result, Err(ArchiveError::IndexMissing(_))));
    }

    #[test]
    fn test_create_refuses_existing_archive() {
        let dir = tempdir().expect("tempdir");
        let config = ArchiveConfig::new(dir.path());
        let engine = ArchiveEngine::create(config.clone()).expect("create");
        assert!(engine.index().is_empty());
        for shard in ShardId::all() {
            assert!(shard_path(dir.path(), shard).is_file());
        }
        assert!(matches!(
            ArchiveEngine::create(config),
            Err(ArchiveError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_encipher_respects_extension() {
        let dir = tempdir().expect("tempdir");
        let engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");
        assert_eq!(engine.encipher("dds", b"raw"), b"raw");
        assert_ne!(engine.encipher("rdb", b"raw"), b"raw");
    }
}
