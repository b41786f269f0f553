use std::path::{Path, PathBuf};

use crate::sstable::{SsTable, SstWriter};

/// Default writer parameters used across the SSTable tests.
pub const BLOOM_BITS: u32 = 1024;
pub const BLOOM_HASHES: u8 = 7;
pub const SPARSE_INTERVAL: usize = 16;

/// Builds a table from `entries` (must be sorted) and reopens it.
pub fn build_table(dir: &Path, name: &str, entries: &[(&str, &str)]) -> SsTable {
    let path = write_table(dir, name, entries);
    SsTable::open(path).unwrap()
}

/// Builds a table file and returns its path without opening it.
pub fn write_table(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let owned: Vec<(String, String)> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    SstWriter::new(&path, BLOOM_BITS, BLOOM_HASHES, SPARSE_INTERVAL)
        .build(&owned)
        .unwrap();
    path
}

/// `n` zero-padded sorted entries: `key-0000` → `value-0`, ...
pub fn numbered_entries(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| (format!("key-{i:04}"), format!("value-{i}")))
        .collect()
}
