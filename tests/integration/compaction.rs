#![allow(missing_docs)]

use std::collections::BTreeMap;

use freaddb::storage::SHARED_TABLE;
use freaddb::{Key, Result, Store, StoreOptions, TableSchema, Value, ValueCodecKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

fn fragmented_store(dir: &std::path::Path, options: StoreOptions) -> Result<Store> {
    let mut store = Store::open(
        dir,
        [
            TableSchema::new("docs").int_keys().compressed(true),
            TableSchema::new("sets")
                .combined_keys()
                .codec(ValueCodecKind::IntBitmap),
        ],
        options,
    )?;
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for round in 0..4u64 {
        for i in 0..400u64 {
            let text: String = (0..rng.gen_range(10..200))
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect();
            let doc = Value::map([("round", Value::from(round as i64)), ("text", text.into())]);
            store.stage("docs", i, doc)?;
            let members: Vec<i64> = (0..rng.gen_range(1..50))
                .map(|_| rng.gen_range(0..100_000))
                .collect();
            store.stage("sets", (round, i), members)?;
        }
        store.flush()?;
        for i in (0..400u64).step_by(3) {
            store.delete("docs", i)?;
        }
        store.flush()?;
    }
    Ok(store)
}

fn snapshot(store: &Store) -> Result<(BTreeMap<Key, Value>, BTreeMap<Key, Value>)> {
    let docs = store.get_values("docs", 0..400u64)?;
    let sets = store
        .iter_prefix("sets", &[])?
        .collect::<Result<BTreeMap<_, _>>>()?;
    Ok((docs, sets))
}

#[test]
fn whole_store_compaction_preserves_content() -> Result<()> {
    let dir = tempdir()?;
    let mut store = fragmented_store(dir.path(), StoreOptions::default())?;
    let before = snapshot(&store)?;
    let stats_before = store.stats()?;
    assert!(!before.0.is_empty());
    assert_eq!(before.1.len(), 1600);

    let report = store.compress(None)?;
    assert_eq!(report.tables, vec!["docs".to_string(), "sets".to_string()]);
    assert_eq!(report.entries_copied, (before.0.len() + before.1.len()) as u64);

    assert_eq!(snapshot(&store)?, before);
    let stats_after = store.stats()?;
    for (name, usage) in &stats_after.tables {
        let old = &stats_before.tables[name];
        assert_eq!(usage.entries, old.entries);
        assert_eq!(usage.stored_bytes, old.stored_bytes);
        assert_eq!(usage.capacity_bytes, old.capacity_bytes);
    }
    assert_eq!(stats_after.total.stored_bytes, stats_before.total.stored_bytes);

    drop(store);
    let reopened = Store::open_read_only(dir.path())?;
    assert_eq!(snapshot(&reopened)?, before);
    Ok(())
}

#[test]
fn single_table_compaction_leaves_other_tables_alone() -> Result<()> {
    let dir = tempdir()?;
    let mut store = fragmented_store(dir.path(), StoreOptions::default())?;
    let before = snapshot(&store)?;
    let sets_before = store.stats()?.tables["sets"].clone();

    let report = store.compress(Some("docs"))?;
    assert_eq!(report.tables, vec!["docs".to_string()]);
    assert_eq!(report.entries_copied, before.0.len() as u64);
    assert_eq!(snapshot(&store)?, before);
    let sets_after = store.stats()?.tables["sets"].clone();
    assert_eq!(sets_after.entries, sets_before.entries);
    assert_eq!(sets_after.stored_bytes, sets_before.stored_bytes);
    Ok(())
}

#[test]
fn single_table_compaction_in_shared_mode_rewrites_shared_table() -> Result<()> {
    let dir = tempdir()?;
    let mut store = fragmented_store(dir.path(), StoreOptions::default().split_tables(false))?;
    let before = snapshot(&store)?;
    let report = store.compress(Some("sets"))?;
    assert_eq!(report.tables, vec![SHARED_TABLE.to_string()]);
    assert_eq!(snapshot(&store)?, before);
    assert!(store.stats()?.tables.contains_key(SHARED_TABLE));
    Ok(())
}

#[test]
fn compaction_flushes_staged_entries_first() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [TableSchema::new("ids").int_keys()],
        StoreOptions::default(),
    )?;
    store.stage("ids", 1u64, "staged")?;
    store.compress(None)?;
    assert_eq!(store.buffered_entries(), 0);
    assert_eq!(store.get_value("ids", 1u64)?, Some(Value::from("staged")));
    assert_eq!(
        store.last_flush().map(|r| r.trigger),
        Some(freaddb::FlushTrigger::Compaction)
    );
    Ok(())
}

#[test]
fn stats_report_fill_ratio_against_capacity() -> Result<()> {
    let dir = tempdir()?;
    let capacity = 64 << 20;
    let mut store = Store::open(
        dir.path(),
        [
            TableSchema::new("blobs").codec(ValueCodecKind::Bytes),
            TableSchema::new("empty"),
        ],
        StoreOptions::default().capacity_bytes(capacity),
    )?;
    for i in 0..64u64 {
        store.stage("blobs", i.to_string(), vec![9u8; 4096])?;
    }
    store.flush()?;

    let stats = store.stats()?;
    let blobs = &stats.tables["blobs"];
    assert_eq!(blobs.entries, 64);
    assert!(blobs.stored_bytes >= 64 * 4096);
    assert!(blobs.used_bytes >= blobs.stored_bytes);
    assert_eq!(blobs.capacity_bytes, capacity);
    let ratio = blobs.used_bytes as f64 / capacity as f64;
    assert!((blobs.fill_ratio - ratio).abs() < 1e-12);

    let empty = &stats.tables["empty"];
    assert_eq!((empty.entries, empty.used_bytes), (0, 0));
    assert_eq!(stats.total.entries, 64);
    assert!(stats.file_size_bytes > 0);

    let text = stats.to_string();
    assert!(text.lines().any(|line| line.starts_with("blobs : ")));
    assert!(text.lines().last().unwrap_or("").starts_with("Total : "));
    Ok(())
}
