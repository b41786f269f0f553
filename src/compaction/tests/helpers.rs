use std::path::Path;

use crate::engine::utils::table_file_name;
use crate::engine::{EngineConfig, Levels};
use crate::sstable::{SsTable, SstWriter};

/// Builds an on-disk table at `level` with the given creation timestamp and
/// returns its opened handle.
pub fn make_table(
    dir: &Path,
    level: usize,
    timestamp: u64,
    entries: &[(&str, &str)],
) -> SsTable {
    let config = EngineConfig::default();
    let path = dir.join(table_file_name(level, timestamp));
    let owned: Vec<(String, String)> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    SstWriter::new(
        &path,
        config.bloom_filter_size,
        config.bloom_hash_count,
        config.sparse_index_interval,
    )
    .build(&owned)
    .unwrap();

    let mut table = SsTable::open(&path).unwrap();
    table.timestamp = timestamp;
    table
}

/// Level structure with the given tables stacked at level 0, the first
/// slice element being the **newest**.
pub fn level0_stack(dir: &Path, stacks: &[&[(&str, &str)]]) -> Levels {
    let config = EngineConfig::default();
    let mut levels = Levels::new(config.max_levels);

    // Highest timestamp = newest = position 0.
    for (i, entries) in stacks.iter().enumerate() {
        let timestamp = (stacks.len() - i) as u64;
        let table = make_table(dir, 0, timestamp, entries);
        levels.push_back(0, table);
    }

    levels
}

/// Names of all `.sst` files currently in the directory, sorted.
pub fn sst_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".sst"))
        .collect();
    names.sort();
    names
}
