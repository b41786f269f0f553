use tempfile::TempDir;

use super::helpers::open_default;

#[test]
fn put_get_update_delete() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("name", "Alice").unwrap();
    assert_eq!(db.get("name").unwrap().as_deref(), Some("Alice"));

    db.put("name", "Bob").unwrap();
    assert_eq!(db.get("name").unwrap().as_deref(), Some("Bob"));

    db.delete("name").unwrap();
    assert_eq!(db.get("name").unwrap(), None);
}

#[test]
fn get_of_unknown_key_is_absent() {
    let tmp = TempDir::new().unwrap();
    let db = open_default(tmp.path());

    assert_eq!(db.get("never-written").unwrap(), None);
}

#[test]
fn many_keys_round_trip() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    for i in 0..200 {
        db.put(&format!("key-{i:03}"), &format!("value-{i}")).unwrap();
    }

    for i in 0..200 {
        assert_eq!(
            db.get(&format!("key-{i:03}")).unwrap().as_deref(),
            Some(format!("value-{i}").as_str())
        );
    }
}

#[test]
fn values_with_embedded_delimiters_round_trip() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("pipes", "a|b||c|").unwrap();
    db.flush().unwrap();

    assert_eq!(db.get("pipes").unwrap().as_deref(), Some("a|b||c|"));
}

#[test]
fn stats_reflect_engine_state() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    db.put("a", "1").unwrap();
    db.put("b", "2").unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.memtable_entries, 2);
    assert_eq!(stats.memtable_bytes, 4);
    assert!(stats.wal_bytes > 0);
    assert_eq!(stats.total_table_bytes, 0);

    db.flush().unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.memtable_entries, 0);
    assert_eq!(stats.wal_bytes, 0);
    assert_eq!(stats.levels[0].table_count, 1);
    assert!(stats.total_table_bytes > 0);
}

#[test]
fn inspect_returns_bounded_samples() {
    let tmp = TempDir::new().unwrap();
    let mut db = open_default(tmp.path());

    for i in 0..20 {
        db.put(&format!("key-{i:02}"), "v").unwrap();
    }
    db.flush().unwrap();
    db.put("in-memory", "yes").unwrap();

    let inspect = db.inspect(5).unwrap();
    assert_eq!(inspect.memtable.len(), 1);
    assert_eq!(inspect.tables.len(), 1);
    assert_eq!(inspect.tables[0].level, 0);
    assert_eq!(inspect.tables[0].entry_count, 20);
    assert_eq!(inspect.tables[0].sample.len(), 5);
    assert!(inspect.tables[0].file_name.starts_with("L0_"));
}
