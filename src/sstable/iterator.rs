//! SSTable read iterators — sequential access to the data block.
//!
//! [`RecordIterator`] walks raw records between two absolute offsets and is
//! the basis for full-table iteration ([`SsTable::iter`](super::SsTable::iter)),
//! bounded scans, and compaction merges. [`ScanIterator`] layers inclusive
//! `[lo, hi]` bounds on top, stopping at the first key past `hi` so a
//! narrow scan never touches the tail of a large table.

use super::{SSTableError, parse_record};

// ------------------------------------------------------------------------------------------------
// RecordIterator
// ------------------------------------------------------------------------------------------------

/// Streaming iterator over every record in `[pos, end)`.
///
/// Yields owned `(key, value)` pairs in stored (ascending) order. A
/// malformed record yields one `Err` and ends the iteration — nothing after
/// a torn record can be trusted.
pub struct RecordIterator<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
    failed: bool,
}

impl<'a> RecordIterator<'a> {
    pub(crate) fn new(buf: &'a [u8], pos: usize, end: usize) -> Self {
        Self {
            buf,
            pos,
            end,
            failed: false,
        }
    }
}

impl Iterator for RecordIterator<'_> {
    type Item = Result<(String, String), SSTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.end {
            return None;
        }

        match parse_record(self.buf, self.pos, self.end) {
            Ok(record) => {
                self.pos = record.next;
                Some(Ok((record.key.to_string(), record.value.to_string())))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ScanIterator
// ------------------------------------------------------------------------------------------------

/// Range-bounded record iterator: yields records with `lo ≤ key ≤ hi`.
///
/// Records below `lo` are skipped; the first key above `hi` terminates the
/// iteration (the data block is sorted, so nothing later can match).
pub struct ScanIterator<'a> {
    inner: RecordIterator<'a>,
    lo: String,
    hi: String,
    done: bool,
}

impl<'a> ScanIterator<'a> {
    pub(crate) fn new(inner: RecordIterator<'a>, lo: &str, hi: &str) -> Self {
        Self {
            inner,
            lo: lo.to_string(),
            hi: hi.to_string(),
            done: false,
        }
    }
}

impl Iterator for ScanIterator<'_> {
    type Item = Result<(String, String), SSTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.inner.next()? {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok((key, value)) => {
                    if key.as_str() < self.lo.as_str() {
                        continue;
                    }
                    if key.as_str() > self.hi.as_str() {
                        self.done = true;
                        return None;
                    }
                    return Some(Ok((key, value)));
                }
            }
        }
    }
}
