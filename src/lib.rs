//! FReadDB: a read-optimized, schema-driven key-value layer over `redb`.
//!
//! Callers declare named tables with typed keys and per-table value codecs,
//! stage large ingests through a buffered batch-commit pipeline, compact the
//! result, and serve point lookups and tuple-prefix scans from a read-only
//! handle.
//!
//! ```no_run
//! use freaddb::{Store, StoreOptions, TableSchema};
//!
//! # fn main() -> freaddb::Result<()> {
//! let tables = [
//!     TableSchema::new("name_to_id"),
//!     TableSchema::new("id_to_name").int_keys(),
//! ];
//! let mut store = Store::open("/tmp/ids", tables, StoreOptions::default())?;
//! store.stage("name_to_id", "Q1", 0i64)?;
//! store.stage("id_to_name", 0u64, "Q1")?;
//! store.flush()?;
//! store.compress(None)?;
//! drop(store);
//!
//! let store = Store::open_read_only("/tmp/ids")?;
//! assert_eq!(store.get_value("id_to_name", 0u64)?, Some("Q1".into()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod error;
pub mod logging;
pub mod primitives;
pub mod storage;

pub use admin::{CompactReport, StatsReport, TableUsage};
pub use error::{FreadError, Result};
pub use storage::{
    FlushReport, FlushTrigger, Key, KeyKind, OpenMode, PrefixIter, Schema, Store, StoreOptions,
    TableSchema, Value, ValueCodecKind, SCAN_CHUNK,
};
