//! # Compaction Module
//!
//! Size-tiered, level-wise compaction: once a level accumulates
//! [`EngineConfig::size_ratio`](crate::engine::EngineConfig) tables, all of
//! them are k-way merged into a single table at the next level down the
//! hierarchy.
//!
//! ## Recency
//!
//! Within a level, position 0 is the newest table, so the merge feeds
//! sources in stored order and breaks key ties toward the lowest source
//! index. A first-wins dedup pass over the merged stream then keeps exactly
//! the newest version of every key. Because the output lands at the *front*
//! of the next level, the invariant "level L+1 is never newer than level L"
//! holds across cascades.
//!
//! ## Tombstones
//!
//! A tombstone can only be dropped when no older level could still hold a
//! value it shadows. The merge therefore drops tombstones **only** when
//! every level below the one being compacted is empty — i.e. the output is
//! the bottom-most occupied level; otherwise they are carried along.
//!
//! ## Scheduling
//!
//! The engine invokes [`compact`] once after every flush. A single
//! invocation sweeps levels `0..max_levels-1` in order, so a flush cascades
//! at most one move per level; a level promoted *into* past its threshold
//! is picked up by the sweep after the next flush.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{fs, io, path::Path};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::utils::{Entry, MergeIterator, MonotonicClock, table_file_name};
use crate::engine::{EngineConfig, Levels};
use crate::sstable::{SSTableError, SsTable, SstWriter};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`compact`].
///
/// Unlink failures are *not* represented here — removing an
/// already-superseded file is tolerated idempotently with a warning.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Reading a source table or writing the merged table failed.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Compaction
// ------------------------------------------------------------------------------------------------

/// Runs one size-tiered sweep over all levels.
///
/// For every level `L` in `0..max_levels-1` whose table count has reached
/// `size_ratio`:
///
/// 1. k-way merge all of `L`'s tables, newest-wins per key;
/// 2. drop tombstones iff no level below `L` holds any table;
/// 3. write the survivors as a fresh table at the front of level `L+1`
///    (skipped when nothing survives);
/// 4. unlink the merged input files and empty level `L`.
pub fn compact(
    levels: &mut Levels,
    data_dir: &Path,
    config: &EngineConfig,
    clock: &mut MonotonicClock,
) -> Result<(), CompactionError> {
    for level in 0..config.max_levels.saturating_sub(1) {
        if levels.tables(level).len() < config.size_ratio {
            continue;
        }

        let old_tables = levels.take(level);

        let merged = merge_tables(&old_tables)?;

        // A tombstone may be dropped only at the bottom-most occupied
        // level — anything below could still hold a value it shadows.
        let has_older_levels =
            (level + 1..config.max_levels).any(|l| !levels.tables(l).is_empty());

        let survivors: Vec<Entry> = if has_older_levels {
            merged
        } else {
            merged
                .into_iter()
                .filter(|(_, value)| *value != config.tombstone)
                .collect()
        };

        if survivors.is_empty() {
            info!(
                level,
                merged_tables = old_tables.len(),
                "compaction eliminated every entry; no output table"
            );
        } else {
            let timestamp = clock.next();
            let path = data_dir.join(table_file_name(level + 1, timestamp));

            SstWriter::new(
                &path,
                config.bloom_filter_size,
                config.bloom_hash_count,
                config.sparse_index_interval,
            )
            .build(&survivors)?;

            let mut table = SsTable::open(&path)?;
            table.timestamp = timestamp;
            levels.push_front(level + 1, table);

            info!(
                from_level = level,
                to_level = level + 1,
                merged_tables = old_tables.len(),
                entries = survivors.len(),
                dropped_tombstones = !has_older_levels,
                "compaction moved level"
            );
        }

        for table in &old_tables {
            if let Err(e) = fs::remove_file(table.path()) {
                warn!(path = %table.path().display(), error = %e, "failed to unlink compacted SSTable");
            }
        }
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Merge helpers
// ------------------------------------------------------------------------------------------------

/// k-way merges the given tables (stored newest-first) into a single
/// ascending stream, keeping only the newest version of each key.
fn merge_tables(tables: &[SsTable]) -> Result<Vec<Entry>, CompactionError> {
    let mut sources: Vec<Box<dyn Iterator<Item = Entry>>> = Vec::with_capacity(tables.len());
    for table in tables {
        let entries: Vec<Entry> = table.iter().collect::<Result<_, _>>()?;
        sources.push(Box::new(entries.into_iter()));
    }

    let deduped = dedup_newest(MergeIterator::new(sources));
    debug!(
        sources = tables.len(),
        unique_keys = deduped.len(),
        "k-way merge complete"
    );
    Ok(deduped)
}

/// Collapses a `(key ASC, source ASC)` stream to its first record per key.
///
/// The merge emits the newest table's record first for any tied key, so
/// first-wins is newest-wins.
fn dedup_newest(merged: impl Iterator<Item = Entry>) -> Vec<Entry> {
    let mut out: Vec<Entry> = Vec::new();
    for (key, value) in merged {
        if out.last().is_some_and(|(last, _)| *last == key) {
            continue;
        }
        out.push((key, value));
    }
    out
}
