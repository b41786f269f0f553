//! SSTable writer — builds a complete table file from sorted entries.
//!
//! [`SstWriter`] walks the input once: every key feeds the in-progress
//! bloom filter, every `sparse_index_interval`-th record (the first one
//! included) contributes a sparse-index entry, and each record is emitted
//! into the data block. The sparse index, serialized bloom filter, and
//! footer follow the data block, with all footer offsets referring to the
//! final file.
//!
//! # Input Requirements
//!
//! Entries must arrive in **strictly ascending** key order — the engine's
//! memtable snapshot and the compaction merge both produce exactly that.
//! A violation fails with [`SSTableError::UnsortedInput`] before anything
//! reaches the final path.
//!
//! # Atomicity
//!
//! 1. Write everything to `<path>.tmp`.
//! 2. Flush and `sync_all`.
//! 3. Rename `<path>.tmp` → `<path>`.
//!
//! A crash mid-build leaves only a `.tmp` orphan, which the engine ignores
//! at startup; the WAL still covers the data being flushed.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::bloom::BloomFilter;

use super::{RECORD_PREFIX_SIZE, SST_HEADER_SIZE, SST_MAGIC, SST_VERSION, SSTableError};

// ------------------------------------------------------------------------------------------------
// SstWriter
// ------------------------------------------------------------------------------------------------

/// Builds one immutable SSTable file.
pub struct SstWriter {
    path: PathBuf,
    bloom_size: u32,
    bloom_hash_count: u8,
    sparse_index_interval: usize,
}

impl SstWriter {
    /// Creates a writer targeting `path`.
    ///
    /// `bloom_size` (bits) and `bloom_hash_count` shape the embedded
    /// filter; `sparse_index_interval` is the data-record stride between
    /// sparse-index entries. All three come from the engine configuration.
    pub fn new(
        path: impl AsRef<Path>,
        bloom_size: u32,
        bloom_hash_count: u8,
        sparse_index_interval: usize,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            bloom_size,
            bloom_hash_count,
            sparse_index_interval: sparse_index_interval.max(1),
        }
    }

    /// Writes the given sorted entries as a complete table.
    ///
    /// # Errors
    ///
    /// [`SSTableError::UnsortedInput`] if keys are not strictly ascending,
    /// [`SSTableError::RecordTooLarge`] if a key, value, or the file itself
    /// outgrows the format's integer fields, [`SSTableError::Io`] on any
    /// filesystem failure.
    pub fn build(&self, entries: &[(String, String)]) -> Result<(), SSTableError> {
        let entry_count = u32::try_from(entries.len()).map_err(|_| {
            SSTableError::RecordTooLarge(format!("{} entries exceed u32", entries.len()))
        })?;

        let tmp_path = self.path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);

        // Header.
        writer.write_all(&SST_MAGIC.to_le_bytes())?;
        writer.write_all(&[SST_VERSION])?;
        writer.write_all(&entry_count.to_le_bytes())?;

        let mut bloom = BloomFilter::new(self.bloom_size, self.bloom_hash_count);
        let mut sparse_index: Vec<(&str, u32)> = Vec::new();
        let mut offset = SST_HEADER_SIZE;
        let mut prev_key: Option<&str> = None;

        // Data block: one pass over the sorted input.
        for (i, (key, value)) in entries.iter().enumerate() {
            if let Some(prev) = prev_key
                && key.as_str() <= prev
            {
                return Err(SSTableError::UnsortedInput {
                    prev: prev.to_string(),
                    key: key.clone(),
                });
            }
            prev_key = Some(key);

            let key_len = u16::try_from(key.len()).map_err(|_| {
                SSTableError::RecordTooLarge(format!("key of {} bytes exceeds u16", key.len()))
            })?;
            let val_len = u32::try_from(value.len()).map_err(|_| {
                SSTableError::RecordTooLarge(format!("value of {} bytes exceeds u32", value.len()))
            })?;

            bloom.add(key);
            if i % self.sparse_index_interval == 0 {
                sparse_index.push((key, checked_offset(offset)?));
            }

            writer.write_all(&key_len.to_le_bytes())?;
            writer.write_all(&val_len.to_le_bytes())?;
            writer.write_all(key.as_bytes())?;
            writer.write_all(value.as_bytes())?;

            offset += RECORD_PREFIX_SIZE + key.len() + value.len();
        }

        // Sparse-index block.
        let index_offset = checked_offset(offset)?;
        for (key, record_offset) in &sparse_index {
            let key_len = key.len() as u16; // already validated against u16 above
            writer.write_all(&key_len.to_le_bytes())?;
            writer.write_all(&record_offset.to_le_bytes())?;
            writer.write_all(key.as_bytes())?;
            offset += RECORD_PREFIX_SIZE + key.len();
        }

        // Bloom block.
        let bloom_offset = checked_offset(offset)?;
        writer.write_all(&bloom.serialize())?;

        // Footer: offsets into the final file, then the magic again.
        writer.write_all(&(SST_HEADER_SIZE as u32).to_le_bytes())?;
        writer.write_all(&index_offset.to_le_bytes())?;
        writer.write_all(&bloom_offset.to_le_bytes())?;
        writer.write_all(&SST_MAGIC.to_le_bytes())?;

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| SSTableError::Io(e.into_error()))?;
        file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            entry_count,
            index_entries = sparse_index.len(),
            "SSTable written"
        );

        Ok(())
    }
}

/// Converts a running offset to the format's `u32`, failing once the file
/// outgrows 32-bit addressing.
fn checked_offset(offset: usize) -> Result<u32, SSTableError> {
    u32::try_from(offset)
        .map_err(|_| SSTableError::RecordTooLarge(format!("file offset {offset} exceeds u32")))
}
