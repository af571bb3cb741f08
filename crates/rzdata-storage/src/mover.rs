//! Chunked data movement within and between shard files.
//!
//! Shards can be far larger than memory, so every bulk copy goes through a
//! fixed-size buffer. In-file moves pick their direction so overlapping
//! source and destination ranges are copied safely.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::Result;

/// A byte range within a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSpan {
    /// Byte offset within the shard.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

impl DataSpan {
    /// Create a span
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Check if two spans overlap. Empty spans never overlap anything.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.offset + other.length && other.offset < self.offset + self.length
    }

    /// End offset (exclusive).
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Moves bytes through one reusable buffer.
#[derive(Debug)]
pub struct ChunkMover {
    buffer: Vec<u8>,
}

impl ChunkMover {
    /// Create a mover with a buffer of `chunk_size` bytes (at least one).
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buffer: vec![0u8; chunk_size.max(1)],
        }
    }

    /// Buffer size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }

    fn next_chunk(&self, remaining: u64) -> usize {
        usize::try_from(remaining).map_or(self.buffer.len(), |r| r.min(self.buffer.len()))
    }

    /// Copy exactly `length` bytes from the current position of `reader`
    /// to the current position of `writer`.
    pub fn copy_exact<R: Read, W: Write>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        length: u64,
    ) -> Result<()> {
        let mut remaining = length;
        while remaining > 0 {
            let chunk = self.next_chunk(remaining);
            let buf = &mut self.buffer[..chunk];
            reader.read_exact(buf)?;
            writer.write_all(buf)?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Copy everything `reader` yields to `writer`, returning the byte count.
    pub fn copy_all<R: Read, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> Result<u64> {
        let mut total = 0u64;
        loop {
            let read = match reader.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            writer.write_all(&self.buffer[..read])?;
            total += read as u64;
        }
        Ok(total)
    }

    /// Copy data within the same file. Overlapping ranges are handled by
    /// copying back to front when moving towards the end.
    pub fn move_within(
        &mut self,
        file: &mut File,
        src_offset: u64,
        dest_offset: u64,
        length: u64,
    ) -> Result<()> {
        if src_offset == dest_offset || length == 0 {
            return Ok(());
        }

        let mut remaining = length;
        if dest_offset < src_offset {
            let mut src_pos = src_offset;
            let mut dest_pos = dest_offset;
            while remaining > 0 {
                let chunk = self.next_chunk(remaining);
                self.transfer(file, src_pos, dest_pos, chunk)?;
                remaining -= chunk as u64;
                src_pos += chunk as u64;
                dest_pos += chunk as u64;
            }
        } else {
            let mut src_end = src_offset + length;
            let mut dest_end = dest_offset + length;
            while remaining > 0 {
                let chunk = self.next_chunk(remaining);
                src_end -= chunk as u64;
                dest_end -= chunk as u64;
                self.transfer(file, src_end, dest_end, chunk)?;
                remaining -= chunk as u64;
            }
        }
        Ok(())
    }

    fn transfer(&mut self, file: &mut File, src: u64, dest: u64, chunk: usize) -> Result<()> {
        let buf = &mut self.buffer[..chunk];
        file.seek(SeekFrom::Start(src))?;
        file.read_exact(buf)?;
        file.seek(SeekFrom::Start(dest))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Remove `span` from `file`, shifting the tail down and truncating.
    ///
    /// Returns the new file size.
    pub fn splice_out(&mut self, file: &mut File, span: DataSpan) -> Result<u64> {
        let size = file.metadata()?.len();
        let end = span.end().min(size);
        let start = span.offset.min(end);
        let removed = end - start;
        if removed == 0 {
            return Ok(size);
        }

        self.move_within(file, end, start, size - end)?;
        let new_size = size - removed;
        file.set_len(new_size)?;
        debug!("spliced {} bytes at {}, new size {}", removed, start, new_size);
        Ok(new_size)
    }
}
