//! # Sorted String Table (SSTable) Module
//!
//! Immutable, sorted, on-disk tables — the persistent layer of the engine.
//! Each table stores its entries in strictly ascending key order together
//! with a sparse index (one entry every
//! [`EngineConfig::sparse_index_interval`](crate::engine::EngineConfig)
//! records) and an embedded [`BloomFilter`] for fast negative lookups.
//!
//! # On-disk layout (all integers little-endian)
//!
//! ```text
//! [magic u32][version u8][entry_count u32]                      header, 9 B
//! [key_len u16][val_len u32][key bytes][value bytes] ...        data block
//! [key_len u16][offset u32][key bytes] ...                      sparse index
//! [size u32][hash_count u8][bits]                               bloom block
//! [data_offset u32][index_offset u32][bloom_offset u32][magic]  footer, 16 B
//! ```
//!
//! The magic constant appears in both header and footer and both copies must
//! match on open. `data_offset` is always 9. Sparse-index offsets are
//! absolute file positions of the referenced data record.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`SstWriter`], builds a table from sorted entries.
//! - [`iterator`] — [`RecordIterator`] and [`ScanIterator`] over the data
//!   block.
//!
//! # Guarantees
//!
//! - **Immutability:** readers never mutate the file; the mapped bytes are
//!   shared freely.
//! - **No false negatives:** the embedded bloom filter reports "maybe" for
//!   every key the table contains.
//! - **Atomic creation:** the writer builds `<path>.tmp`, syncs, then
//!   renames — a crash cannot leave a torn table at the final name.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use builder::SstWriter;
pub use iterator::{RecordIterator, ScanIterator};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use thiserror::Error;
use tracing::debug;

use crate::bloom::{BloomError, BloomFilter};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// File magic, `"LSMT"` read as a little-endian `u32`.
pub const SST_MAGIC: u32 = 0x4C53_4D54;

/// Current format version.
pub const SST_VERSION: u8 = 1;

/// Header size: `magic (4) + version (1) + entry_count (4)`.
pub const SST_HEADER_SIZE: usize = 9;

/// Footer size: three offsets plus the trailing magic.
pub const SST_FOOTER_SIZE: usize = 16;

/// Fixed per-record prefix: `key_len (2) + val_len (4)`.
pub(crate) const RECORD_PREFIX_SIZE: usize = 6;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SSTable operations (open, read, build).
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural damage: bad magic, truncated region, malformed record, or
    /// undecodable key/value bytes.
    #[error("corrupt SSTable: {0}")]
    Corrupt(String),

    /// The embedded bloom block failed to deserialize.
    #[error("corrupt bloom block: {0}")]
    Bloom(#[from] BloomError),

    /// The writer was handed entries out of ascending key order.
    #[error("input not sorted: {key:?} does not follow {prev:?}")]
    UnsortedInput { prev: String, key: String },

    /// A key or value exceeds what the record header can represent, or the
    /// file outgrew the 32-bit offsets of the format.
    #[error("record too large: {0}")]
    RecordTooLarge(String),
}

// ------------------------------------------------------------------------------------------------
// Raw record parsing
// ------------------------------------------------------------------------------------------------

/// A record parsed in place from the mapped file.
pub(crate) struct RawRecord<'a> {
    pub(crate) key: &'a str,
    pub(crate) value: &'a str,
    /// Absolute offset of the following record.
    pub(crate) next: usize,
}

/// Parses the record starting at `pos`, bounds-checked against `end`.
pub(crate) fn parse_record(buf: &[u8], pos: usize, end: usize) -> Result<RawRecord<'_>, SSTableError> {
    if pos + RECORD_PREFIX_SIZE > end {
        return Err(SSTableError::Corrupt(format!(
            "truncated record header at offset {pos}"
        )));
    }

    let key_len = u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize;
    let val_len = u32::from_le_bytes([buf[pos + 2], buf[pos + 3], buf[pos + 4], buf[pos + 5]]) as usize;

    let key_start = pos + RECORD_PREFIX_SIZE;
    let val_start = key_start + key_len;
    let next = val_start + val_len;
    if next > end {
        return Err(SSTableError::Corrupt(format!(
            "record at offset {pos} overruns its region ({next} > {end})"
        )));
    }

    let key = std::str::from_utf8(&buf[key_start..val_start])
        .map_err(|_| SSTableError::Corrupt(format!("non-UTF-8 key at offset {pos}")))?;
    let value = std::str::from_utf8(&buf[val_start..next])
        .map_err(|_| SSTableError::Corrupt(format!("non-UTF-8 value at offset {pos}")))?;

    Ok(RawRecord { key, value, next })
}

// ------------------------------------------------------------------------------------------------
// SsTable — immutable reader
// ------------------------------------------------------------------------------------------------

/// A fully memory-mapped, immutable SSTable.
///
/// Opening parses the footer first, validates both magic copies and the
/// version, then eagerly materializes the sparse index and the bloom
/// filter. Point lookups gate on the bloom filter and scan only the
/// sparse-index window that can contain the key.
#[derive(Debug)]
pub struct SsTable {
    /// Creation timestamp parsed from the file name (`L<level>_<ts>.sst`).
    /// Set to 0 by [`SsTable::open`]; the engine fills it in after loading.
    pub timestamp: u64,

    /// Path of the table on disk.
    path: PathBuf,

    /// Memory-mapped file contents.
    mmap: Mmap,

    /// Number of records in the data block.
    entry_count: u32,

    /// Absolute start of the data block (always [`SST_HEADER_SIZE`]).
    data_offset: usize,

    /// Absolute start of the sparse-index block.
    index_offset: usize,

    /// Parsed sparse index: every Nth key with the absolute offset of its
    /// record, strictly ascending.
    sparse_index: Vec<(String, u32)>,

    /// Parsed embedded bloom filter.
    bloom: BloomFilter,
}

impl SsTable {
    /// Opens and validates an SSTable.
    ///
    /// # Errors
    ///
    /// [`SSTableError::Corrupt`] on bad magic, bad version, impossible
    /// offsets, or a malformed sparse index; [`SSTableError::Bloom`] when
    /// the bloom block does not deserialize; [`SSTableError::Io`] on
    /// filesystem failures.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SSTableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        let file_len = file.metadata()?.len() as usize;
        if file_len < SST_HEADER_SIZE + SST_FOOTER_SIZE {
            return Err(SSTableError::Corrupt(format!(
                "file is {file_len} bytes, smaller than header + footer"
            )));
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let buf = &mmap[..];

        // Footer first: the offsets there locate every other region.
        let footer_start = file_len - SST_FOOTER_SIZE;
        let data_offset = read_u32(buf, footer_start) as usize;
        let index_offset = read_u32(buf, footer_start + 4) as usize;
        let bloom_offset = read_u32(buf, footer_start + 8) as usize;
        let footer_magic = read_u32(buf, footer_start + 12);

        if footer_magic != SST_MAGIC {
            return Err(SSTableError::Corrupt(format!(
                "bad footer magic {footer_magic:#010x}"
            )));
        }

        let header_magic = read_u32(buf, 0);
        if header_magic != SST_MAGIC {
            return Err(SSTableError::Corrupt(format!(
                "bad header magic {header_magic:#010x}"
            )));
        }

        let version = buf[4];
        if version != SST_VERSION {
            return Err(SSTableError::Corrupt(format!(
                "unsupported version {version}"
            )));
        }

        let entry_count = read_u32(buf, 5);

        if data_offset != SST_HEADER_SIZE
            || index_offset < data_offset
            || bloom_offset < index_offset
            || bloom_offset > footer_start
        {
            return Err(SSTableError::Corrupt(format!(
                "inconsistent offsets: data {data_offset}, index {index_offset}, bloom {bloom_offset}, footer {footer_start}"
            )));
        }

        let sparse_index = parse_sparse_index(buf, index_offset, bloom_offset)?;
        let bloom = BloomFilter::deserialize(&buf[bloom_offset..footer_start])?;

        debug!(
            path = %path.display(),
            entry_count,
            index_entries = sparse_index.len(),
            "SSTable opened"
        );

        Ok(Self {
            timestamp: 0,
            path,
            mmap,
            entry_count,
            data_offset,
            index_offset,
            sparse_index,
            bloom,
        })
    }

    /// Looks up a single key.
    ///
    /// Returns the stored value — which may be the tombstone sentinel; the
    /// engine decides how that reads. `Ok(None)` means this table holds no
    /// record for the key.
    pub fn get(&self, key: &str) -> Result<Option<String>, SSTableError> {
        if !self.bloom.might_contain(key) {
            return Ok(None);
        }

        let (start, end) = self.sparse_window(key);
        let buf = &self.mmap[..];

        let mut pos = start;
        while pos < end {
            let record = parse_record(buf, pos, end)?;
            if record.key == key {
                return Ok(Some(record.value.to_string()));
            }
            if record.key > key {
                break;
            }
            pos = record.next;
        }

        Ok(None)
    }

    /// Iterates every record in key order.
    pub fn iter(&self) -> RecordIterator<'_> {
        RecordIterator::new(&self.mmap[..], self.data_offset, self.index_offset)
    }

    /// Iterates records with `lo ≤ key ≤ hi`, stopping early past `hi`.
    pub fn scan<'a>(&'a self, lo: &str, hi: &str) -> ScanIterator<'a> {
        ScanIterator::new(self.iter(), lo, hi)
    }

    /// Number of records in the data block.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// On-disk size in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Path of the table on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locates the data-block window that can contain `key`.
    ///
    /// `start` is the record offset of the last sparse entry with key ≤ the
    /// target (or the data-block start), `end` the offset of the first
    /// sparse entry beyond it (or the index-block start).
    fn sparse_window(&self, key: &str) -> (usize, usize) {
        let idx = self
            .sparse_index
            .partition_point(|(k, _)| k.as_str() <= key);

        let start = match idx {
            0 => self.data_offset,
            _ => self.sparse_index[idx - 1].1 as usize,
        };
        let end = match self.sparse_index.get(idx) {
            Some((_, offset)) => *offset as usize,
            None => self.index_offset,
        };

        (start, end)
    }
}

// ------------------------------------------------------------------------------------------------
// Parsing helpers
// ------------------------------------------------------------------------------------------------

/// Reads a little-endian `u32`; the caller guarantees bounds.
fn read_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

/// Parses the sparse-index block, verifying strictly ascending keys.
fn parse_sparse_index(
    buf: &[u8],
    index_offset: usize,
    bloom_offset: usize,
) -> Result<Vec<(String, u32)>, SSTableError> {
    let mut entries: Vec<(String, u32)> = Vec::new();
    let mut pos = index_offset;

    while pos < bloom_offset {
        if pos + RECORD_PREFIX_SIZE > bloom_offset {
            return Err(SSTableError::Corrupt(format!(
                "truncated sparse-index entry at offset {pos}"
            )));
        }

        let key_len = u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize;
        let offset = read_u32(buf, pos + 2);

        let key_start = pos + RECORD_PREFIX_SIZE;
        let key_end = key_start + key_len;
        if key_end > bloom_offset {
            return Err(SSTableError::Corrupt(format!(
                "sparse-index key at offset {pos} overruns the block"
            )));
        }

        let key = std::str::from_utf8(&buf[key_start..key_end])
            .map_err(|_| SSTableError::Corrupt(format!("non-UTF-8 sparse-index key at {pos}")))?;

        if let Some((prev, _)) = entries.last()
            && key <= prev.as_str()
        {
            return Err(SSTableError::Corrupt(format!(
                "sparse index not ascending at key {key:?}"
            )));
        }

        entries.push((key.to_string(), offset));
        pos = key_end;
    }

    Ok(entries)
}
