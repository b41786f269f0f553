use tempfile::TempDir;

use super::helpers::open_default;

/// Range scan across the memtable and a flushed SSTable, with a newer
/// in-memory version of one key shadowing the flushed one.
#[test]
fn scan_merges_memtable_and_sstable_newest_wins() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("fruit:apple", "red").unwrap();
    db.put("fruit:banana", "yellow").unwrap();
    db.flush().unwrap();
    db.put("fruit:cherry", "dark red").unwrap();
    db.put("fruit:banana", "green").unwrap();

    let hits = db.scan("fruit:a", "fruit:d").unwrap();
    assert_eq!(
        hits,
        vec![
            ("fruit:apple".to_string(), "red".to_string()),
            ("fruit:banana".to_string(), "green".to_string()),
            ("fruit:cherry".to_string(), "dark red".to_string()),
        ]
    );
}

#[test]
fn scan_filters_tombstones() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("a", "1").unwrap();
    db.put("b", "2").unwrap();
    db.put("c", "3").unwrap();
    db.delete("b").unwrap();

    let hits = db.scan("a", "c").unwrap();
    assert_eq!(
        hits,
        vec![
            ("a".to_string(), "1".to_string()),
            ("c".to_string(), "3".to_string()),
        ]
    );
}

#[test]
fn scan_filters_tombstones_across_flush() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("a", "1").unwrap();
    db.put("b", "2").unwrap();
    db.flush().unwrap();
    db.delete("b").unwrap();
    db.flush().unwrap();

    let hits = db.scan("a", "z").unwrap();
    assert_eq!(hits, vec![("a".to_string(), "1".to_string())]);
}

#[test]
fn scan_of_empty_engine_is_empty() {
    let tmp = TempDir::new().unwrap();
    let db = open_default(tmp.path());

    assert!(db.scan("a", "z").unwrap().is_empty());
}

#[test]
fn scan_result_is_ascending() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    for key in ["delta", "bravo", "echo", "alpha", "charlie"] {
        db.put(key, "v").unwrap();
    }
    db.flush().unwrap();
    db.put("bravo2", "v").unwrap();

    let keys: Vec<String> = db
        .scan("a", "z")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(
        keys,
        vec!["alpha", "bravo", "bravo2", "charlie", "delta", "echo"]
    );
}

#[test]
fn scan_respects_inclusive_bounds() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("a", "1").unwrap();
    db.put("b", "2").unwrap();
    db.put("c", "3").unwrap();

    let hits = db.scan("b", "b").unwrap();
    assert_eq!(hits, vec![("b".to_string(), "2".to_string())]);
}
