//! # LSM Storage Engine
//!
//! The orchestrator: composes the write-ahead log, the skip-list memtable,
//! the on-disk SSTable levels, and size-tiered compaction into a single
//! crash-safe, ordered key-value store.
//!
//! ## Design Overview
//!
//! Data lives in layers, queried newest-first:
//!
//! 1. **Memtable** — the in-memory sorted buffer holding the most recent
//!    writes, fronted by the WAL.
//! 2. **Level 0** — freshly flushed SSTables, newest at position 0; key
//!    ranges may overlap.
//! 3. **Levels 1..max** — each the compacted merger of the level above it.
//!
//! Writes append to the WAL (durable before anything else), land in the
//! memtable, and trigger a flush to a level-0 table once the buffer reaches
//! [`EngineConfig::memtable_size_threshold`] bytes. Every flush is followed
//! by one compaction sweep which may cascade tables down the levels.
//!
//! Deletions write the tombstone sentinel; a key whose newest value is the
//! sentinel reads as absent. Tombstones are physically dropped only when
//! compaction writes the bottom-most occupied level.
//!
//! ## Concurrency Model
//!
//! The engine is **single-writer and synchronous**: mutating operations
//! take `&mut self`, reads take `&self`, and the borrow checker enforces
//! the one-owner rule. All I/O blocks. A data directory must be owned by
//! exactly one live engine; concurrent engines over the same directory are
//! undefined behavior.
//!
//! ## Guarantees
//!
//! - **Durability:** a mutation is on disk in the WAL before it becomes
//!   observable; acknowledged writes survive a crash.
//! - **Crash recovery:** on [`Engine::open`], existing SSTables are loaded
//!   from the data directory and the WAL is replayed into a fresh memtable.
//!   The SSTable from a flush is durable *before* the WAL is cleared, so a
//!   crash anywhere in between only re-applies records that are already in
//!   a table — a harmless superset.
//! - **Recency:** a read observes the most recent write for any key,
//!   derived purely from position (memtable → level 0 newest-first →
//!   deeper levels), with no per-record version metadata.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compaction::{self, CompactionError};
use crate::memtable::MemTable;
use crate::sstable::{SSTableError, SsTable, SstWriter};
use crate::wal::{WAL_FILE_NAME, Wal, WalError, WalOp};

pub mod utils;

use utils::{Entry, MonotonicClock, parse_table_file_name, table_file_name};

#[cfg(test)]
mod tests;

/// Default tombstone sentinel.
pub const DEFAULT_TOMBSTONE: &str = "__TOMBSTONE__";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A key or value violates the format constraints; nothing was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Error originating from the write-ahead log.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Error originating from the SSTable subsystem.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Error originating from compaction.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine has been closed; the operation was rejected.
    #[error("engine is closed")]
    Closed,
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance. Passed to [`Engine::open`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memtable byte size that triggers an automatic flush.
    pub memtable_size_threshold: usize,

    /// Bits in each SSTable's embedded bloom filter.
    pub bloom_filter_size: u32,

    /// Hash functions per bloom filter.
    pub bloom_hash_count: u8,

    /// Number of compaction levels (`0..max_levels-1`).
    pub max_levels: usize,

    /// Table count at which a level is compacted into the next.
    pub size_ratio: usize,

    /// One sparse-index entry every this many data records.
    pub sparse_index_interval: usize,

    /// Sentinel value marking a logical deletion.
    pub tombstone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_size_threshold: 64 * 1024,
            bloom_filter_size: 1024,
            bloom_hash_count: 7,
            max_levels: 5,
            size_ratio: 4,
            sparse_index_interval: 16,
            tombstone: DEFAULT_TOMBSTONE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Rejects configurations the engine cannot honor.
    fn validate(&self) -> Result<(), EngineError> {
        if self.memtable_size_threshold == 0 {
            return Err(EngineError::InvalidArgument(
                "memtable_size_threshold must be at least 1 byte".into(),
            ));
        }
        if self.bloom_filter_size == 0 || self.bloom_hash_count == 0 {
            return Err(EngineError::InvalidArgument(
                "bloom filter needs at least 1 bit and 1 hash".into(),
            ));
        }
        if self.max_levels == 0 {
            return Err(EngineError::InvalidArgument(
                "max_levels must be at least 1".into(),
            ));
        }
        if self.size_ratio < 2 {
            return Err(EngineError::InvalidArgument(
                "size_ratio must be at least 2".into(),
            ));
        }
        if self.sparse_index_interval == 0 {
            return Err(EngineError::InvalidArgument(
                "sparse_index_interval must be at least 1".into(),
            ));
        }
        if self.tombstone.is_empty() || self.tombstone.contains(['\n', '\r']) {
            return Err(EngineError::InvalidArgument(
                "tombstone must be non-empty and free of line terminators".into(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Levels
// ------------------------------------------------------------------------------------------------

/// The on-disk level structure: `max_levels` ordered table lists.
///
/// Within a level, position 0 is the newest table and the last position the
/// oldest. Level 0 holds freshly flushed tables whose key ranges may
/// overlap; each deeper level is the merger of the level above it, so for
/// any key present in adjacent levels the shallower copy is at least as
/// recent.
pub struct Levels {
    tables: Vec<Vec<SsTable>>,
}

impl Levels {
    /// Creates `max_levels` empty levels.
    pub fn new(max_levels: usize) -> Self {
        Self {
            tables: (0..max_levels).map(|_| Vec::new()).collect(),
        }
    }

    /// Number of levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tables.len()
    }

    /// Tables of a level, newest first. Out-of-range levels read as empty.
    #[must_use]
    pub fn tables(&self, level: usize) -> &[SsTable] {
        self.tables.get(level).map_or(&[], Vec::as_slice)
    }

    /// Inserts a table as the newest of its level.
    pub fn push_front(&mut self, level: usize, table: SsTable) {
        debug_assert!(level < self.tables.len(), "level {level} out of range");
        if let Some(slot) = self.tables.get_mut(level) {
            slot.insert(0, table);
        }
    }

    /// Appends a table as the oldest of its level (startup loading).
    pub(crate) fn push_back(&mut self, level: usize, table: SsTable) {
        debug_assert!(level < self.tables.len(), "level {level} out of range");
        if let Some(slot) = self.tables.get_mut(level) {
            slot.push(table);
        }
    }

    /// Removes and returns every table of a level.
    pub fn take(&mut self, level: usize) -> Vec<SsTable> {
        self.tables.get_mut(level).map(std::mem::take).unwrap_or_default()
    }

    /// Total table count across all levels.
    #[must_use]
    pub fn total_tables(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }
}

// ------------------------------------------------------------------------------------------------
// Stats & Inspect
// ------------------------------------------------------------------------------------------------

/// Snapshot of engine statistics returned by [`Engine::stats`].
#[derive(Debug)]
pub struct EngineStats {
    /// Memtable byte footprint (keys + values).
    pub memtable_bytes: usize,
    /// Memtable entry count, tombstones included.
    pub memtable_entries: usize,
    /// Current WAL file size in bytes.
    pub wal_bytes: u64,
    /// Per-level statistics, level 0 first.
    pub levels: Vec<LevelStats>,
    /// Sum of all SSTable file sizes in bytes.
    pub total_table_bytes: u64,
}

/// Per-level statistics.
#[derive(Debug)]
pub struct LevelStats {
    /// The level index.
    pub level: usize,
    /// Number of tables in this level.
    pub table_count: usize,
    /// File sizes in bytes, newest table first.
    pub table_bytes: Vec<u64>,
}

/// Bounded content samples returned by [`Engine::inspect`].
#[derive(Debug)]
pub struct EngineInspect {
    /// Up to `limit` memtable entries, ascending, tombstones included.
    pub memtable: Vec<Entry>,
    /// One element per on-disk table, levels ascending, newest first
    /// within a level.
    pub tables: Vec<TableInspect>,
}

/// Bounded sample of one SSTable.
#[derive(Debug)]
pub struct TableInspect {
    /// Level holding the table.
    pub level: usize,
    /// File name inside the data directory.
    pub file_name: String,
    /// Total records in the table.
    pub entry_count: u32,
    /// File size in bytes.
    pub file_size: u64,
    /// Up to `limit` records from the front of the data block.
    pub sample: Vec<Entry>,
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// The LSM storage engine handle.
///
/// Owns the data directory exclusively. Mutating operations take
/// `&mut self` — the engine is single-writer by construction.
pub struct Engine {
    /// Root directory holding the WAL and all SSTables.
    data_dir: PathBuf,

    /// In-memory write buffer.
    memtable: MemTable,

    /// Durable log of mutations not yet flushed.
    wal: Wal,

    /// On-disk tables, by level.
    levels: Levels,

    /// Strictly increasing table-timestamp source.
    clock: MonotonicClock,

    /// Tunables fixed at open.
    config: EngineConfig,

    /// Set by [`Engine::close`]; all subsequent operations are rejected.
    closed: bool,
}

impl Engine {
    /// Opens (or creates) an engine rooted at the given directory.
    ///
    /// Existing SSTables are discovered by their `L<level>_<timestamp>.sst`
    /// names (anything else is ignored; corrupt tables are skipped with a
    /// warning) and the WAL is replayed into a fresh memtable, restoring
    /// every acknowledged write that had not reached a table.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let data_dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let mut memtable = MemTable::new(config.tombstone.clone());
        let wal = Wal::open(data_dir.join(WAL_FILE_NAME))?;

        // 1. Discover and load existing SSTables.
        let mut levels = Levels::new(config.max_levels);
        let mut clock = MonotonicClock::new();

        let mut found: Vec<(usize, u64, PathBuf)> = Vec::new();
        for dir_entry in fs::read_dir(&data_dir)? {
            let dir_entry = dir_entry?;
            let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some((level, timestamp)) = parse_table_file_name(&name) {
                found.push((level, timestamp, dir_entry.path()));
            }
        }

        // Within a level, higher timestamps are newer and must come first.
        found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        for (level, timestamp, table_path) in found {
            clock.advance_past(timestamp);

            if level >= config.max_levels {
                warn!(
                    path = %table_path.display(),
                    level,
                    max_levels = config.max_levels,
                    "skipping SSTable beyond the configured level count"
                );
                continue;
            }

            match SsTable::open(&table_path) {
                Ok(mut table) => {
                    table.timestamp = timestamp;
                    levels.push_back(level, table);
                }
                Err(e) => {
                    warn!(path = %table_path.display(), error = %e, "skipping corrupt SSTable");
                }
            }
        }

        // 2. Replay the WAL into the memtable.
        let mut recovered = 0usize;
        for record in wal.replay()? {
            let record = record?;
            match record.op {
                WalOp::Put => memtable.put(&record.key, &record.value),
                WalOp::Delete => memtable.delete(&record.key),
            }
            recovered += 1;
        }

        info!(
            data_dir = %data_dir.display(),
            tables = levels.total_tables(),
            recovered_records = recovered,
            "engine opened"
        );

        Ok(Self {
            data_dir,
            memtable,
            wal,
            levels,
            clock,
            config,
            closed: false,
        })
    }

    /// Inserts or updates a key.
    ///
    /// The WAL record is durable before the memtable changes; a full
    /// memtable is flushed (and compaction run) before this returns.
    pub fn put(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        validate_key(key)?;
        validate_value(value)?;

        self.wal.append(WalOp::Put, key, value)?;
        self.memtable.put(key, value);
        self.maybe_flush()
    }

    /// Deletes a key by writing the tombstone sentinel.
    ///
    /// The key keeps occupying a record until bottom-level compaction
    /// physically drops it; reads report it as absent immediately.
    pub fn delete(&mut self, key: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        validate_key(key)?;

        let tombstone = self.config.tombstone.clone();
        self.wal.append(WalOp::Delete, key, &tombstone)?;
        self.memtable.delete(key);
        self.maybe_flush()
    }

    /// Looks up a single key.
    ///
    /// Queries the memtable, then each level in ascending order with tables
    /// newest-first; the first layer holding the key is authoritative. A
    /// tombstone reads as `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        self.ensure_open()?;
        validate_key(key)?;

        if let Some(value) = self.memtable.get(key) {
            return Ok(self.live_value(value.to_string()));
        }

        for level in 0..self.levels.depth() {
            for table in self.levels.tables(level) {
                if let Some(value) = table.get(key)? {
                    return Ok(self.live_value(value));
                }
            }
        }

        Ok(None)
    }

    /// Returns all live entries with `lo ≤ key ≤ hi`, ascending.
    ///
    /// Layers are applied oldest-first into an ordered map so that newer
    /// values overwrite older ones — newest-wins without any per-entry
    /// version metadata. Tombstoned keys are filtered from the result.
    pub fn scan(&self, lo: &str, hi: &str) -> Result<Vec<Entry>, EngineError> {
        self.ensure_open()?;

        let mut merged: BTreeMap<String, String> = BTreeMap::new();

        for level in (0..self.levels.depth()).rev() {
            for table in self.levels.tables(level).iter().rev() {
                for entry in table.scan(lo, hi) {
                    let (key, value) = entry?;
                    merged.insert(key, value);
                }
            }
        }

        for (key, value) in self.memtable.scan(lo, hi) {
            merged.insert(key.to_string(), value.to_string());
        }

        Ok(merged
            .into_iter()
            .filter(|(_, value)| *value != self.config.tombstone)
            .collect())
    }

    /// Flushes the memtable to a fresh level-0 SSTable.
    ///
    /// A no-op when the memtable is empty. The new table is durably on disk
    /// before the WAL is cleared, so a crash between the two steps only
    /// replays records the table already holds. Ends with one compaction
    /// sweep.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_inner()
    }

    /// Gracefully shuts down the engine, flushing any buffered writes.
    ///
    /// Idempotent: closing twice is a no-op. Every other operation on a
    /// closed engine fails with [`EngineError::Closed`].
    pub fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }

        if !self.memtable.is_empty() {
            self.flush_inner()?;
        }

        self.closed = true;
        info!(data_dir = %self.data_dir.display(), "engine closed");
        Ok(())
    }

    /// Returns a snapshot of engine statistics. Read-only.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        self.ensure_open()?;

        let mut levels = Vec::with_capacity(self.levels.depth());
        let mut total_table_bytes = 0u64;

        for level in 0..self.levels.depth() {
            let table_bytes: Vec<u64> = self
                .levels
                .tables(level)
                .iter()
                .map(SsTable::file_size)
                .collect();
            total_table_bytes += table_bytes.iter().sum::<u64>();
            levels.push(LevelStats {
                level,
                table_count: table_bytes.len(),
                table_bytes,
            });
        }

        Ok(EngineStats {
            memtable_bytes: self.memtable.size(),
            memtable_entries: self.memtable.len(),
            wal_bytes: self.wal.file_size()?,
            levels,
            total_table_bytes,
        })
    }

    /// Returns bounded samples of every layer's contents. Read-only, not on
    /// any hot path.
    pub fn inspect(&self, limit: usize) -> Result<EngineInspect, EngineError> {
        self.ensure_open()?;

        let memtable: Vec<Entry> = self
            .memtable
            .entries()
            .take(limit)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut tables = Vec::new();
        for level in 0..self.levels.depth() {
            for table in self.levels.tables(level) {
                let sample: Vec<Entry> =
                    table.iter().take(limit).collect::<Result<_, _>>()?;
                let file_name = table
                    .path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                tables.push(TableInspect {
                    level,
                    file_name,
                    entry_count: table.entry_count(),
                    file_size: table.file_size(),
                    sample,
                });
            }
        }

        Ok(EngineInspect { memtable, tables })
    }

    /// The configuration this engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The data directory this engine owns.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Maps the tombstone sentinel to client-visible absence.
    fn live_value(&self, value: String) -> Option<String> {
        (value != self.config.tombstone).then_some(value)
    }

    fn maybe_flush(&mut self) -> Result<(), EngineError> {
        if self.memtable.size() >= self.config.memtable_size_threshold {
            debug!(
                memtable_bytes = self.memtable.size(),
                threshold = self.config.memtable_size_threshold,
                "memtable threshold reached"
            );
            self.flush_inner()?;
        }
        Ok(())
    }

    fn flush_inner(&mut self) -> Result<(), EngineError> {
        if self.memtable.is_empty() {
            debug!("flush skipped: memtable is empty");
            return Ok(());
        }

        // 1. Snapshot — entries() iterates in ascending key order, exactly
        //    what the table writer requires.
        let entries: Vec<Entry> = self
            .memtable
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        // 2. Write the new level-0 table and make it readable.
        let timestamp = self.clock.next();
        let table_path = self.data_dir.join(table_file_name(0, timestamp));

        SstWriter::new(
            &table_path,
            self.config.bloom_filter_size,
            self.config.bloom_hash_count,
            self.config.sparse_index_interval,
        )
        .build(&entries)?;

        let mut table = SsTable::open(&table_path)?;
        table.timestamp = timestamp;
        self.levels.push_front(0, table);

        // 3. Only now that the table is durable may the WAL be dropped.
        self.memtable.clear();
        self.wal.clear()?;

        info!(
            path = %table_path.display(),
            entries = entries.len(),
            "memtable flushed to level 0"
        );

        // 4. One compaction sweep per flush.
        compaction::compact(
            &mut self.levels,
            &self.data_dir,
            &self.config,
            &mut self.clock,
        )?;

        Ok(())
    }
}

impl Drop for Engine {
    /// Best-effort close: flushes buffered writes unless already closed.
    fn drop(&mut self) {
        if !self.closed
            && let Err(e) = self.close()
        {
            warn!(error = %e, "engine close on drop failed");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Validation
// ------------------------------------------------------------------------------------------------

/// Rejects keys the WAL line format or the SSTable record header cannot
/// represent.
fn validate_key(key: &str) -> Result<(), EngineError> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument("key is empty".into()));
    }
    if key.contains('|') {
        return Err(EngineError::InvalidArgument(
            "key contains the record delimiter '|'".into(),
        ));
    }
    if key.contains(['\n', '\r']) {
        return Err(EngineError::InvalidArgument(
            "key contains a line terminator".into(),
        ));
    }
    if key.len() > u16::MAX as usize {
        return Err(EngineError::InvalidArgument(format!(
            "key of {} bytes exceeds the {}-byte limit",
            key.len(),
            u16::MAX
        )));
    }
    Ok(())
}

/// Rejects values the WAL line format cannot represent. Values may contain
/// `|`; it survives the round-trip verbatim.
fn validate_value(value: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::InvalidArgument("value is empty".into()));
    }
    if value.contains(['\n', '\r']) {
        return Err(EngineError::InvalidArgument(
            "value contains a line terminator".into(),
        ));
    }
    if value.len() > u32::MAX as usize {
        return Err(EngineError::InvalidArgument(format!(
            "value of {} bytes exceeds the {}-byte limit",
            value.len(),
            u32::MAX
        )));
    }
    Ok(())
}
