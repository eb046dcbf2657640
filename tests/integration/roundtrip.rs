#![allow(missing_docs)]

use freaddb::{FreadError, Key, KeyKind, Result, Store, StoreOptions, TableSchema, Value, ValueCodecKind};
use tempfile::tempdir;

const CODECS: [ValueCodecKind; 5] = [
    ValueCodecKind::Object,
    ValueCodecKind::Pickle,
    ValueCodecKind::Bytes,
    ValueCodecKind::IntArray,
    ValueCodecKind::IntBitmap,
];

const KEY_KINDS: [KeyKind; 5] = [
    KeyKind::Bytes,
    KeyKind::Int,
    KeyKind::SignedInt,
    KeyKind::Tuple { arity: 2 },
    KeyKind::Tuple { arity: 3 },
];

fn sample_key(kind: KeyKind, i: u64) -> Key {
    match kind {
        KeyKind::Bytes => Key::from(format!("key-{i}")),
        KeyKind::Int => Key::Int(i * 7),
        KeyKind::SignedInt => Key::SignedInt(i as i64 * 7 - 50),
        KeyKind::Tuple { arity: 2 } => Key::Tuple(vec![i, i + 1]),
        KeyKind::Tuple { .. } => Key::Tuple(vec![i, 0, i * 3]),
    }
}

fn sample_value(codec: ValueCodecKind, i: u64) -> Value {
    let n = i as i64;
    match codec {
        ValueCodecKind::Object => Value::map([
            (Value::from("name"), Value::from(format!("entity {i}"))),
            (Value::from("score"), Value::from(n as f64 / 4.0)),
            (Value::from("tags"), Value::from(vec![n, -n, 0])),
            (Value::from("missing"), Value::Null),
        ]),
        ValueCodecKind::Pickle => Value::List(vec![
            Value::from("pickled"),
            Value::from(n),
            Value::from(true),
            Value::map([(n, "nested")]),
        ]),
        ValueCodecKind::Bytes => Value::from(format!("raw-{i}").into_bytes()),
        ValueCodecKind::IntArray => Value::from(vec![n, -n, i64::MAX, i64::MIN]),
        ValueCodecKind::IntBitmap => Value::from(vec![1, 5, 1000 + n, 70_000 + n]),
    }
}

fn table_name(kind: KeyKind, codec: ValueCodecKind, compress: bool) -> String {
    let kind = match kind {
        KeyKind::Bytes => "bytes".to_string(),
        KeyKind::Int => "int".to_string(),
        KeyKind::SignedInt => "sint".to_string(),
        KeyKind::Tuple { arity } => format!("tuple{arity}"),
    };
    format!("{kind}_{codec}_{}", if compress { "z" } else { "plain" })
}

fn all_tables() -> Vec<TableSchema> {
    let mut tables = Vec::new();
    for kind in KEY_KINDS {
        for codec in CODECS {
            for compress in [false, true] {
                let mut table = TableSchema::new(table_name(kind, codec, compress))
                    .codec(codec)
                    .compressed(compress);
                table.key_kind = kind;
                tables.push(table);
            }
        }
    }
    tables
}

fn roundtrip_every_combination(options: StoreOptions) -> Result<()> {
    let dir = tempdir()?;
    let tables = all_tables();
    let mut store = Store::open(dir.path(), tables.clone(), options)?;
    for table in &tables {
        for i in 0..20u64 {
            store.stage(
                &table.name,
                sample_key(table.key_kind, i),
                sample_value(table.value_codec, i),
            )?;
        }
    }
    store.flush()?;

    for table in &tables {
        for i in 0..20u64 {
            let found = store.get_value(&table.name, sample_key(table.key_kind, i))?;
            assert_eq!(
                found,
                Some(sample_value(table.value_codec, i)),
                "table {} key {i}",
                table.name
            );
        }
        assert_eq!(
            store.get_value(&table.name, sample_key(table.key_kind, 999))?,
            None
        );
    }
    Ok(())
}

#[test]
fn every_key_kind_and_codec_roundtrips_split() -> Result<()> {
    roundtrip_every_combination(StoreOptions::default())
}

#[test]
fn every_key_kind_and_codec_roundtrips_shared_table() -> Result<()> {
    roundtrip_every_combination(StoreOptions::default().split_tables(false))
}

#[test]
fn pre_encoded_frames_are_stored_verbatim() -> Result<()> {
    let dir = tempdir()?;
    let table = TableSchema::new("ids")
        .int_keys()
        .codec(ValueCodecKind::IntArray)
        .compressed(true);
    let mut store = Store::open(dir.path(), [table.clone()], StoreOptions::default())?;
    let value = Value::from(vec![3i64, 1, 4, 1, 5]);
    store.stage_encoded("ids", 9u64, table.encode_value(&value)?)?;
    store.flush()?;
    assert_eq!(store.get_value("ids", 9u64)?, Some(value));
    Ok(())
}

#[test]
fn pre_encoded_frame_from_another_codec_is_a_mismatch() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [TableSchema::new("blobs").codec(ValueCodecKind::Bytes)],
        StoreOptions::default(),
    )?;
    let foreign = TableSchema::new("other").codec(ValueCodecKind::Pickle);
    store.stage_encoded("blobs", "k", foreign.encode_value(&Value::from(1i64))?)?;
    store.flush()?;
    assert!(matches!(
        store.get_value("blobs", "k"),
        Err(FreadError::CodecMismatch { .. })
    ));
    Ok(())
}

#[test]
fn values_the_codec_cannot_hold_are_rejected_at_stage() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [
            TableSchema::new("blobs").codec(ValueCodecKind::Bytes),
            TableSchema::new("sets").codec(ValueCodecKind::IntBitmap),
        ],
        StoreOptions::default(),
    )?;
    assert!(matches!(
        store.stage("blobs", "k", "not bytes"),
        Err(FreadError::InvalidValue(_))
    ));
    assert!(matches!(
        store.stage("sets", "k", vec![-1i64]),
        Err(FreadError::InvalidValue(_))
    ));
    assert_eq!(store.buffered_entries(), 0);
    Ok(())
}

#[test]
fn bitmap_values_come_back_sorted_and_deduplicated() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [TableSchema::new("sets").codec(ValueCodecKind::IntBitmap)],
        StoreOptions::default(),
    )?;
    store.stage("sets", "k", vec![9i64, 2, 9, 4])?;
    store.flush()?;
    assert_eq!(
        store.get_value("sets", "k")?,
        Some(Value::from(vec![2i64, 4, 9]))
    );
    Ok(())
}

#[test]
fn shared_table_keeps_logical_tables_apart() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [TableSchema::new("a"), TableSchema::new("ab")],
        StoreOptions::default().split_tables(false),
    )?;
    store.stage("a", "x", 1i64)?;
    store.stage("ab", "x", 2i64)?;
    store.stage("ab", "y", 3i64)?;
    store.flush()?;

    assert_eq!(store.get_value("a", "x")?, Some(Value::from(1i64)));
    assert_eq!(store.get_value("ab", "x")?, Some(Value::from(2i64)));
    assert_eq!(store.get_value("a", "y")?, None);
    assert_eq!(store.head("a", 10)?, vec![Key::from("x")]);
    assert_eq!(store.head("ab", 10)?, vec![Key::from("x"), Key::from("y")]);
    Ok(())
}

#[test]
fn batch_lookup_matches_ingested_mapping() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [TableSchema::new("ids").int_keys()],
        StoreOptions::default(),
    )?;
    let mut expected = std::collections::BTreeMap::new();
    for i in 0..500u64 {
        let value = Value::from(format!("Q{i}"));
        store.stage("ids", i, value.clone())?;
        expected.insert(Key::Int(i), value);
    }
    store.flush()?;

    let all = store.get_values("ids", expected.keys())?;
    assert_eq!(all, expected);

    let partial = store.get_values("ids", [1u64, 10_000, 499])?;
    assert_eq!(partial.len(), 2);
    assert!(partial.contains_key(&Key::Int(1)));
    assert!(!partial.contains_key(&Key::Int(10_000)));
    Ok(())
}

#[test]
fn decoded_values_can_feed_the_next_lookup() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [
            TableSchema::new("name_to_id"),
            TableSchema::new("id_to_name").int_keys(),
        ],
        StoreOptions::default(),
    )?;
    for (name, id) in [("Q1", 0i64), ("Q2", 1), ("Q3", 2)] {
        store.stage("name_to_id", name, id)?;
        store.stage("id_to_name", id as u64, name)?;
    }
    store.flush()?;

    let ids = store.get_values("name_to_id", ["Q1", "Q3"])?;
    let keys = ids
        .values()
        .map(Key::try_from)
        .collect::<Result<Vec<_>>>()?;
    let names = store.get_values("id_to_name", keys)?;
    assert_eq!(names.get(&Key::Int(0)), Some(&Value::from("Q1")));
    assert_eq!(names.get(&Key::Int(2)), Some(&Value::from("Q3")));
    Ok(())
}

#[test]
fn lookups_validate_table_and_key_shape() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open(
        dir.path(),
        [TableSchema::new("pairs").combined_keys()],
        StoreOptions::default(),
    )?;
    assert!(matches!(
        store.get_value("nope", 1u64),
        Err(FreadError::UnknownTable(_))
    ));
    assert!(matches!(
        store.get_value("pairs", [1u64, 2, 3]),
        Err(FreadError::InvalidKey(_))
    ));
    assert_eq!(store.get_value("pairs", (1u64, 2u64))?, None);
    Ok(())
}

#[test]
fn signed_keys_cover_the_full_range_in_order() -> Result<()> {
    let dir = tempdir()?;
    let mut store = Store::open(
        dir.path(),
        [TableSchema::new("offsets").signed_int_keys()],
        StoreOptions::default(),
    )?;
    for v in [i64::MAX, 3, 0, -1, i64::MIN, -40] {
        store.stage("offsets", v, v.to_string())?;
    }
    store.stage("offsets", 7u64, "seven")?;
    store.flush()?;

    let keys = store.head("offsets", 10)?;
    let expected: Vec<Key> = [i64::MIN, -40, -1, 0, 3, 7, i64::MAX]
        .into_iter()
        .map(Key::SignedInt)
        .collect();
    assert_eq!(keys, expected);
    assert_eq!(store.get_value("offsets", -40i64)?, Some(Value::from("-40")));
    assert_eq!(store.get_value("offsets", 7u64)?, Some(Value::from("seven")));
    assert!(matches!(
        store.get_value("offsets", u64::MAX),
        Err(FreadError::InvalidKey(_))
    ));
    Ok(())
}
