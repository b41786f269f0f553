use tempfile::TempDir;

use super::helpers::{build_table, numbered_entries};

#[test]
fn scan_returns_inclusive_range() {
    let tmp = TempDir::new().unwrap();
    let table = build_table(
        tmp.path(),
        "L0_1.sst",
        &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")],
    );

    let hits: Vec<(String, String)> = table.scan("b", "c").collect::<Result<_, _>>().unwrap();
    assert_eq!(
        hits,
        vec![
            ("b".to_string(), "2".to_string()),
            ("c".to_string(), "3".to_string()),
        ]
    );
}

#[test]
fn scan_with_bounds_outside_stored_keys() {
    let tmp = TempDir::new().unwrap();
    let table = build_table(tmp.path(), "L0_1.sst", &[("b", "2"), ("c", "3")]);

    let all: Vec<(String, String)> = table.scan("a", "z").collect::<Result<_, _>>().unwrap();
    assert_eq!(all.len(), 2);

    let none: Vec<(String, String)> = table.scan("x", "z").collect::<Result<_, _>>().unwrap();
    assert!(none.is_empty());

    let before: Vec<(String, String)> = table.scan("0", "a").collect::<Result<_, _>>().unwrap();
    assert!(before.is_empty());
}

#[test]
fn scan_over_large_table_matches_filtered_iteration() {
    let tmp = TempDir::new().unwrap();
    let source = numbered_entries(150);
    let refs: Vec<(&str, &str)> = source
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let table = build_table(tmp.path(), "L0_1.sst", &refs);

    let hits: Vec<(String, String)> = table
        .scan("key-0010", "key-0049")
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(hits.len(), 40);
    assert_eq!(hits.first().unwrap().0, "key-0010");
    assert_eq!(hits.last().unwrap().0, "key-0049");
}

#[test]
fn inverted_range_is_empty() {
    let tmp = TempDir::new().unwrap();
    let table = build_table(tmp.path(), "L0_1.sst", &[("a", "1"), ("b", "2")]);

    let hits: Vec<(String, String)> = table.scan("z", "a").collect::<Result<_, _>>().unwrap();
    assert!(hits.is_empty());
}
