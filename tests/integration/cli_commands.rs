#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use freaddb::{Store, StoreOptions, TableSchema, ValueCodecKind};
use serde_json::Value;
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(name);
    seed_demo(&path).expect("seed demo data");
    (dir, path)
}

fn seed_demo(path: &Path) -> freaddb::Result<()> {
    let mut store = Store::open(
        path,
        [
            TableSchema::new("name_to_id"),
            TableSchema::new("id_to_name").int_keys(),
            TableSchema::new("claims")
                .tuple_keys(3)
                .codec(ValueCodecKind::IntArray),
        ],
        StoreOptions::default(),
    )?;
    for (name, id) in [("Q1", 0i64), ("Q2", 1), ("Q5", 2)] {
        store.stage("name_to_id", name, id)?;
        store.stage("id_to_name", id as u64, name)?;
    }
    store.stage("claims", [1u64, 2, 3], vec![10i64, 20])?;
    store.stage("claims", [1u64, 2, 4], vec![30i64])?;
    store.stage("claims", [2u64, 0, 0], vec![40i64])?;
    store.flush()?;
    Ok(())
}

fn json_output(args: &[&str], db_path: &Path, tail: &[&str]) -> Value {
    let output = cargo_bin_cmd!("freaddb")
        .args(["--format", "json"])
        .args(args)
        .arg(db_path)
        .args(tail)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn stats_emits_json() {
    let (_dir, db_path) = setup_db("stats");
    let json = json_output(&["stats"], &db_path, &[]);
    assert_eq!(json["tables"]["id_to_name"]["entries"], 3);
    assert!(json["total"]["fill_ratio"].is_number());
    assert!(json["file_size_bytes"].as_u64().unwrap_or(0) > 0);
}

#[test]
fn stats_text_lists_tables_and_total() {
    let (_dir, db_path) = setup_db("stats_text");
    let output = cargo_bin_cmd!("freaddb")
        .arg("stats")
        .arg(&db_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("claims : "));
    assert!(text.contains("Total : "));
}

#[test]
fn get_decodes_by_key_kind() {
    let (_dir, db_path) = setup_db("get");
    let json = json_output(&["get"], &db_path, &["id_to_name", "2"]);
    assert_eq!(json, Value::from("Q5"));
    let json = json_output(&["get"], &db_path, &["name_to_id", "Q2"]);
    assert_eq!(json, Value::from(1));
}

#[test]
fn get_missing_key_fails_in_text_mode() {
    let (_dir, db_path) = setup_db("missing");
    cargo_bin_cmd!("freaddb")
        .arg("get")
        .arg(&db_path)
        .args(["id_to_name", "99"])
        .assert()
        .failure();
}

#[test]
fn head_and_scan_list_keys_in_order() {
    let (_dir, db_path) = setup_db("scan");
    let json = json_output(&["head", "-n", "2"], &db_path, &["name_to_id"]);
    assert_eq!(json, serde_json::json!(["Q1", "Q2"]));

    let json = json_output(&["scan"], &db_path, &["claims", "1,2"]);
    let rows = json.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["key"], serde_json::json!([1, 2, 3]));
    assert_eq!(rows[0]["value"], serde_json::json!([10, 20]));
    assert_eq!(rows[1]["key"], serde_json::json!([1, 2, 4]));
}

#[test]
fn compact_rewrites_store() {
    let (_dir, db_path) = setup_db("compact");
    let json = json_output(&["compact"], &db_path, &[]);
    assert_eq!(json["entries_copied"], 9);

    let json = json_output(&["compact", "--table", "claims"], &db_path, &[]);
    assert_eq!(json["tables"], serde_json::json!(["claims"]));

    let json = json_output(&["get"], &db_path, &["id_to_name", "0"]);
    assert_eq!(json, Value::from("Q1"));
}

#[test]
fn store_path_can_come_from_the_environment() {
    let (_dir, db_path) = setup_db("env");
    cargo_bin_cmd!("freaddb")
        .env("FREADDB_PATH", &db_path)
        .arg("stats")
        .assert()
        .success();
}
