//! Binary entry point for the FReadDB administrative CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use freaddb::{
    admin::{CompactReport, StatsReport},
    logging::init_logging,
    storage::key::{parse_components, parse_key},
    Key, OpenMode, Store, Value,
};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "freaddb",
    version,
    about = "Inspect and compact FReadDB stores",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "FREADDB_LOG",
        default_value = "warn",
        help = "Log filter directive (e.g. info, freaddb=debug)"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DbArg {
    #[arg(value_name = "DB", env = "FREADDB_PATH", help = "Store directory")]
    db_path: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print per-table space usage.
    Stats(DbArg),
    /// Rewrite the store, or one table, in key order.
    Compact {
        #[command(flatten)]
        db: DbArg,
        #[arg(long, help = "Only rewrite this table")]
        table: Option<String>,
    },
    /// Print the first keys of a table.
    Head {
        #[command(flatten)]
        db: DbArg,
        table: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Look up one key.
    Get {
        #[command(flatten)]
        db: DbArg,
        table: String,
        key: String,
    },
    /// List entries of a tuple-keyed table sharing a leading prefix.
    Scan {
        #[command(flatten)]
        db: DbArg,
        table: String,
        #[arg(value_name = "PREFIX", help = "Comma-separated leading components, e.g. 1,2")]
        prefix: String,
        #[arg(long, help = "Stop after this many entries")]
        limit: Option<usize>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Stats(db) => {
            let store = Store::open_existing(&db.db_path, OpenMode::ReadOnly)?;
            let report = store.stats()?;
            emit(cli.format, &report, print_stats_text)?;
        }
        Command::Compact { db, table } => {
            let mut store = Store::open_existing(&db.db_path, OpenMode::Writable)?;
            let report = store.compress(table.as_deref())?;
            emit(cli.format, &report, print_compact_text)?;
        }
        Command::Head { db, table, count } => {
            let store = Store::open_existing(&db.db_path, OpenMode::ReadOnly)?;
            let keys = store.head(&table, count)?;
            match cli.format {
                OutputFormat::Json => {
                    let keys: Vec<_> = keys.iter().map(key_json).collect();
                    println!("{}", serde_json::to_string_pretty(&keys)?);
                }
                OutputFormat::Text => keys.iter().for_each(|key| println!("{key}")),
            }
        }
        Command::Get { db, table, key } => {
            let store = Store::open_existing(&db.db_path, OpenMode::ReadOnly)?;
            let key = parse_key(&key, store.schema().table(&table)?.key_kind)?;
            let value = store.get_value(&table, &key)?;
            match (cli.format, value) {
                (OutputFormat::Json, value) => {
                    let value = value.as_ref().map(value_json);
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                (OutputFormat::Text, Some(value)) => println!("{value}"),
                (OutputFormat::Text, None) => {
                    return Err(format!("key {key} not found in {table}").into())
                }
            }
        }
        Command::Scan {
            db,
            table,
            prefix,
            limit,
        } => {
            let store = Store::open_existing(&db.db_path, OpenMode::ReadOnly)?;
            let prefix = parse_components(&prefix)?;
            let mut rows = Vec::new();
            for entry in store
                .iter_prefix(&table, &prefix)?
                .take(limit.unwrap_or(usize::MAX))
            {
                let (key, value) = entry?;
                match cli.format {
                    OutputFormat::Json => {
                        rows.push(json!({ "key": key_json(&key), "value": value_json(&value) }))
                    }
                    OutputFormat::Text => println!("{key}\t{value}"),
                }
            }
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(&T),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(value),
    }
    Ok(())
}

fn print_stats_text(report: &StatsReport) {
    print!("{report}");
    println!("file_size_bytes={}", report.file_size_bytes);
}

fn print_compact_text(report: &CompactReport) {
    println!(
        "Compacted {} table(s): entries={} bytes {} -> {} in {:.2} ms",
        report.tables.len(),
        report.entries_copied,
        report.file_bytes_before,
        report.file_bytes_after,
        report.duration_ms
    );
}

fn key_json(key: &Key) -> serde_json::Value {
    match key {
        Key::Int(v) => json!(v),
        Key::SignedInt(v) => json!(v),
        Key::Tuple(parts) => json!(parts),
        Key::Bytes(bytes) => match key.as_str() {
            Some(s) => json!(s),
            None => json!(bytes),
        },
    }
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => json!(v),
        Value::Int(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Str(v) => json!(v),
        Value::Bytes(v) => json!(v),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_json).collect()),
        Value::Map(pairs) => serde_json::Value::Array(
            pairs
                .iter()
                .map(|(k, v)| json!([value_json(k), value_json(v)]))
                .collect(),
        ),
    }
}
