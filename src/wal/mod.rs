//! # Write-Ahead Log Module
//!
//! A durable, append-only record of mutations that fronts the memtable.
//! Every `put` and `delete` is persisted here **before** the in-memory
//! update becomes observable, so a crash can lose at most the mutation
//! whose append never returned.
//!
//! # On-disk layout
//!
//! Line-oriented, human-readable text — one record per line:
//!
//! ```text
//! <timestamp_millis>|<op>|<key>|<value>\n
//! ```
//!
//! `op` is `PUT` or `DELETE`. Fields are split on the **first three** `|`
//! only, so a value may itself contain `|` and is preserved verbatim. Keys
//! must not contain `|` or line terminators; values must not contain line
//! terminators — the engine enforces both at its boundary. Timestamps are
//! informational and need not be monotonic.
//!
//! # Guarantees
//!
//! - **Durability:** every [`Wal::append`] flushes and fsyncs via
//!   [`File::sync_all`] before returning.
//! - **Torn-tail tolerance:** replay silently skips lines that do not parse
//!   (fewer than three `|`, unknown op, bad timestamp) — these are the
//!   artifacts of a crash mid-append, not data loss.
//! - **Truncation:** [`Wal::clear`] resets the file to zero length; the
//!   engine calls it only after the corresponding memtable has been durably
//!   flushed to an SSTable.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// File name of the single active WAL inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.log";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
///
/// Malformed records are *not* an error: replay treats them as torn tails
/// and skips them.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O failure; on the append path this means the record may
    /// not be durable and the mutation must not be acknowledged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Record types
// ------------------------------------------------------------------------------------------------

/// The mutation kind carried by a WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    /// Insert or update a key.
    Put,
    /// Delete a key (the logged value is the tombstone sentinel).
    Delete,
}

impl WalOp {
    /// Parses the wire token, returning `None` for anything unknown.
    fn parse(token: &str) -> Option<Self> {
        match token {
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for WalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => f.write_str("PUT"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// One parsed WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Wall-clock milliseconds at append time (informational).
    pub timestamp: u64,

    /// The mutation kind.
    pub op: WalOp,

    /// The key.
    pub key: String,

    /// The value; for [`WalOp::Delete`] this is the tombstone sentinel.
    pub value: String,
}

impl WalRecord {
    /// Parses one line, splitting on the first three `|` so the value keeps
    /// embedded delimiters. Returns `None` for anything malformed.
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(4, '|');
        let timestamp = parts.next()?.parse::<u64>().ok()?;
        let op = WalOp::parse(parts.next()?)?;
        let key = parts.next()?.to_string();
        let value = parts.next()?.to_string();
        Some(Self {
            timestamp,
            op,
            key,
            value,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// WAL Core
// ------------------------------------------------------------------------------------------------

/// The single active write-ahead log of an engine instance.
///
/// Owned exclusively by the engine; all access is `&mut` on the write path,
/// matching the single-writer model of the storage engine.
pub struct Wal {
    /// Open handle, positioned for appends.
    file: File,

    /// Path of the log on disk.
    path: PathBuf,
}

impl Wal {
    /// Opens (or creates) the WAL at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        info!(path = %path.display(), "WAL opened");

        Ok(Self { file, path })
    }

    /// Appends one record and forces it to durable storage.
    ///
    /// The record is on disk when this returns `Ok`; an error means the
    /// mutation must not be applied to the memtable.
    pub fn append(&mut self, op: WalOp, key: &str, value: &str) -> Result<(), WalError> {
        let timestamp = current_millis();
        let line = format!("{timestamp}|{op}|{key}|{value}\n");

        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_all()?;

        trace!(%op, key, "WAL record appended");
        Ok(())
    }

    /// Returns an iterator replaying every well-formed record in append
    /// order.
    ///
    /// Malformed lines are skipped with a warning — after a crash the final
    /// line may be torn, and a partially written record is indistinguishable
    /// from garbage. An empty or freshly created file replays nothing.
    pub fn replay(&self) -> Result<WalIter, WalError> {
        debug!(path = %self.path.display(), "WAL replay started");

        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;

        Ok(WalIter {
            lines: BufReader::new(file).lines(),
        })
    }

    /// Truncates the log to zero length and syncs.
    ///
    /// Called only after the memtable contents this log covers have been
    /// durably written to an SSTable.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;

        info!(path = %self.path.display(), "WAL cleared");
        Ok(())
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current on-disk size in bytes.
    pub fn file_size(&self) -> Result<u64, WalError> {
        Ok(self.file.metadata()?.len())
    }
}

// ------------------------------------------------------------------------------------------------
// WalIter
// ------------------------------------------------------------------------------------------------

/// Streaming replay iterator over WAL records.
///
/// Yields each well-formed record in append order; I/O failures surface as
/// errors, parse failures are skipped with a `warn!`.
pub struct WalIter {
    lines: io::Lines<BufReader<File>>,
}

impl Iterator for WalIter {
    type Item = Result<WalRecord, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Err(e) => return Some(Err(WalError::Io(e))),
                Ok(line) => {
                    if line.is_empty() {
                        continue;
                    }
                    match WalRecord::parse(&line) {
                        Some(record) => return Some(Ok(record)),
                        None => {
                            warn!(len = line.len(), "skipping malformed WAL line (torn tail)");
                            continue;
                        }
                    }
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Wall-clock milliseconds since the UNIX epoch.
fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
