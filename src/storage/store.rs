#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use redb::{
    Builder, Database, ReadOnlyDatabase, ReadOnlyTable, ReadTransaction, ReadableDatabase,
    TableDefinition, TableError,
};
use tracing::{debug, info, warn};

use crate::error::{FreadError, Result};
use crate::storage::buffer::{FlushReport, FlushTrigger, PendingOp, WriteBuffer};
use crate::storage::key::Key;
use crate::storage::options::{OpenMode, StoreOptions};
use crate::storage::schema::{Schema, SchemaSnapshot, TableSchema};
use crate::storage::sidecar::{load_json, save_json};
use crate::storage::value::Value;

/// Engine file inside a store directory.
pub const DATA_FILE: &str = "data.redb";
/// Schema sidecar inside a store directory.
pub const SCHEMA_FILE: &str = "schema.json";
/// Physical table holding every logical table when splitting is disabled.
pub const SHARED_TABLE: &str = "__shared__";

const NAME_SEPARATOR: u8 = 0x00;

pub(crate) type RawTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

pub(crate) fn raw_table(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// Opens a physical table for reading; a table that was never written reads as `None`.
pub(crate) fn open_raw(txn: &ReadTransaction, physical: &str) -> Result<Option<RawTable>> {
    match txn.open_table(raw_table(physical)) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Maps logical tables and keys onto physical tables and key bytes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Layout {
    split: bool,
}

impl Layout {
    pub(crate) fn physical_name<'a>(&self, table: &'a TableSchema) -> &'a str {
        if self.split {
            &table.name
        } else {
            SHARED_TABLE
        }
    }

    /// Bytes every physical key of `table` starts with.
    pub(crate) fn prefix(&self, table: &TableSchema) -> Vec<u8> {
        if self.split {
            Vec::new()
        } else {
            let mut out = Vec::with_capacity(table.name.len() + 1);
            out.extend_from_slice(table.name.as_bytes());
            out.push(NAME_SEPARATOR);
            out
        }
    }

    pub(crate) fn encode(&self, table: &TableSchema, key: &Key) -> Result<Vec<u8>> {
        let mut out = self.prefix(table);
        crate::storage::key::encode_key(key, table.key_kind, &mut out)?;
        Ok(out)
    }
}

/// Engine handle behind a [`Store`].
///
/// Read-only stores hold a [`ReadOnlyDatabase`], which takes a shared file lock
/// and never writes, so any number of readers may open the same store.
pub(crate) enum Engine {
    Writable(Database),
    ReadOnly(ReadOnlyDatabase),
    /// The engine file was swapped but could not be reopened.
    Detached,
}

impl Engine {
    pub(crate) fn begin_read(&self) -> Result<ReadTransaction> {
        let txn = match self {
            Engine::Writable(db) => db.begin_read()?,
            Engine::ReadOnly(db) => db.begin_read()?,
            Engine::Detached => return Err(FreadError::Detached),
        };
        Ok(txn)
    }

    pub(crate) fn writer(&self, operation: &'static str) -> Result<&Database> {
        match self {
            Engine::Writable(db) => Ok(db),
            Engine::ReadOnly(_) => Err(FreadError::InvalidOperationForMode(operation)),
            Engine::Detached => Err(FreadError::Detached),
        }
    }

    pub(crate) fn writer_mut(&mut self, operation: &'static str) -> Result<&mut Database> {
        match self {
            Engine::Writable(db) => Ok(db),
            Engine::ReadOnly(_) => Err(FreadError::InvalidOperationForMode(operation)),
            Engine::Detached => Err(FreadError::Detached),
        }
    }
}

#[derive(Default)]
struct GroupWrite {
    puts: u64,
    deletes: u64,
    bytes: u64,
}

/// A schema-driven key-value store over one engine file.
///
/// Writes are staged in memory and committed by [`Store::flush`]; reads see
/// committed data only.
pub struct Store {
    root: PathBuf,
    pub(crate) db: Engine,
    pub(crate) schema: Schema,
    pub(crate) options: StoreOptions,
    pub(crate) buffer: WriteBuffer,
    last_flush: Option<FlushReport>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("mode", &self.options.mode)
            .field("tables", &self.schema.len())
            .field("buffered_entries", &self.buffer.len())
            .finish()
    }
}

pub(crate) fn build_engine(cache_size: usize) -> Builder {
    let mut builder = Builder::new();
    builder.set_cache_size(cache_size);
    builder
}

impl Store {
    /// Opens or creates the store at directory `path`.
    ///
    /// Writable opens merge `tables` into the recorded schema. Read-only opens
    /// load the recorded schema and only check `tables` against it.
    pub fn open(
        path: impl AsRef<Path>,
        tables: impl IntoIterator<Item = TableSchema>,
        mut options: StoreOptions,
    ) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let data_path = root.join(DATA_FILE);
        let schema_path = root.join(SCHEMA_FILE);
        let declared = Schema::new(tables)?;

        let (db, schema) = match options.mode {
            OpenMode::ReadOnly => {
                if !data_path.is_file() || !schema_path.is_file() {
                    return Err(FreadError::missing_store(&root));
                }
                let snapshot: SchemaSnapshot = load_json(&schema_path)?;
                options.split_tables = snapshot.split_tables;
                options.capacity_bytes = snapshot.capacity_bytes;
                let schema = snapshot.into_schema()?;
                for table in declared.tables() {
                    if schema.table(&table.name)? != table {
                        return Err(FreadError::InvalidArgument(format!(
                            "table {} does not match the recorded schema",
                            table.name
                        )));
                    }
                }
                let db = build_engine(options.cache_size_bytes).open_read_only(&data_path)?;
                (Engine::ReadOnly(db), schema)
            }
            OpenMode::Writable => {
                fs::create_dir_all(&root)?;
                let schema = if schema_path.is_file() {
                    let snapshot: SchemaSnapshot = load_json(&schema_path)?;
                    if snapshot.split_tables != options.split_tables {
                        return Err(FreadError::InvalidArgument(format!(
                            "store was created with split_tables={}, opened with {}",
                            snapshot.split_tables, options.split_tables
                        )));
                    }
                    let mut schema = snapshot.into_schema()?;
                    schema.merge(declared)?;
                    schema
                } else {
                    declared
                };
                let db = build_engine(options.cache_size_bytes).create(&data_path)?;
                save_json(
                    &schema_path,
                    &SchemaSnapshot::new(&schema, options.split_tables, options.capacity_bytes),
                )?;
                (Engine::Writable(db), schema)
            }
        };

        info!(
            path = %root.display(),
            mode = ?options.mode,
            tables = schema.len(),
            split_tables = options.split_tables,
            "store.open"
        );
        Ok(Self {
            root,
            db,
            schema,
            options,
            buffer: WriteBuffer::default(),
            last_flush: None,
        })
    }

    /// Opens an existing store read-only using its recorded schema.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, std::iter::empty(), StoreOptions::read_only())
    }

    /// Opens an existing store with its recorded layout and schema.
    pub fn open_existing(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let schema_path = path.join(SCHEMA_FILE);
        if !schema_path.is_file() || !path.join(DATA_FILE).is_file() {
            return Err(FreadError::missing_store(path));
        }
        let snapshot: SchemaSnapshot = load_json(&schema_path)?;
        let options = StoreOptions::default()
            .mode(mode)
            .split_tables(snapshot.split_tables)
            .capacity_bytes(snapshot.capacity_bytes);
        Self::open(path, std::iter::empty(), options)
    }

    /// Store directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub(crate) fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    /// Mode fixed at open time.
    pub fn mode(&self) -> OpenMode {
        self.options.mode
    }

    /// Effective options.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Declared tables.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Report of the most recent flush that wrote something.
    pub fn last_flush(&self) -> Option<&FlushReport> {
        self.last_flush.as_ref()
    }

    /// Estimated size of staged entries in bytes.
    pub fn buffered_bytes(&self) -> u64 {
        self.buffer.bytes()
    }

    /// Number of staged entries, tombstones included.
    pub fn buffered_entries(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn layout(&self) -> Layout {
        Layout {
            split: self.options.split_tables,
        }
    }

    pub(crate) fn ensure_writable(&self, operation: &'static str) -> Result<()> {
        match self.options.mode {
            OpenMode::Writable => Ok(()),
            OpenMode::ReadOnly => Err(FreadError::InvalidOperationForMode(operation)),
        }
    }

    /// Physical tables backing the declared schema, in name order.
    pub(crate) fn physical_tables(&self) -> Vec<String> {
        let layout = self.layout();
        let mut names: Vec<String> = self
            .schema
            .tables()
            .map(|table| layout.physical_name(table).to_string())
            .collect();
        names.dedup();
        names
    }

    /// Raises the capacity enforced at flush time and records it in the sidecar.
    pub fn set_capacity_bytes(&mut self, bytes: u64) -> Result<()> {
        self.ensure_writable("set_capacity_bytes")?;
        self.options.capacity_bytes = bytes;
        save_json(
            self.root.join(SCHEMA_FILE),
            &SchemaSnapshot::new(&self.schema, self.options.split_tables, bytes),
        )
    }

    /// Stages `value` under `key`, encoding it with the table's codec.
    ///
    /// Returns the report of the automatic flush when this entry pushed the
    /// buffer past its threshold.
    pub fn stage(
        &mut self,
        table: &str,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Option<FlushReport>> {
        self.ensure_writable("stage")?;
        let schema = self.schema.table(table)?;
        let raw_key = self.layout().encode(schema, &key.into())?;
        let frame = schema.encode_value(&value.into())?;
        self.buffer.push(table, raw_key, PendingOp::Put(frame));
        self.maybe_auto_flush()
    }

    /// Stages a frame already produced by [`TableSchema::encode_value`], skipping the codec.
    pub fn stage_encoded(
        &mut self,
        table: &str,
        key: impl Into<Key>,
        frame: impl Into<Vec<u8>>,
    ) -> Result<Option<FlushReport>> {
        self.ensure_writable("stage")?;
        let schema = self.schema.table(table)?;
        let raw_key = self.layout().encode(schema, &key.into())?;
        let frame = frame.into();
        if frame.is_empty() {
            return Err(FreadError::InvalidValue(
                "pre-encoded frame is empty".to_string(),
            ));
        }
        self.buffer.push(table, raw_key, PendingOp::Put(frame));
        self.maybe_auto_flush()
    }

    /// Same as [`Store::stage`].
    #[deprecated(note = "use `stage`; writes are buffered until `flush`")]
    pub fn put(
        &mut self,
        table: &str,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Option<FlushReport>> {
        self.stage(table, key, value)
    }

    /// Removes `key` from the buffer and, if it is committed, queues a tombstone.
    pub fn delete(&mut self, table: &str, key: impl Into<Key>) -> Result<()> {
        self.ensure_writable("delete")?;
        let layout = self.layout();
        let schema = self.schema.table(table)?;
        let raw_key = layout.encode(schema, &key.into())?;
        let physical = layout.physical_name(schema).to_string();
        let dropped = self.buffer.drop_puts(table, &raw_key);
        let committed = self.committed_contains(&physical, &raw_key)?;
        if committed {
            self.buffer.push(table, raw_key, PendingOp::Delete);
        }
        debug!(table, dropped, committed, "store.delete");
        Ok(())
    }

    fn committed_contains(&self, physical: &str, raw_key: &[u8]) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let Some(table) = open_raw(&txn, physical)? else {
            return Ok(false);
        };
        Ok(table.get(raw_key)?.is_some())
    }

    /// Commits every staged entry. Flushing an empty buffer does nothing.
    ///
    /// On failure, entries of the failing physical table and of every table
    /// after it stay buffered and the committed state is unchanged for them.
    pub fn flush(&mut self) -> Result<FlushReport> {
        self.flush_with(FlushTrigger::Manual)
    }

    fn maybe_auto_flush(&mut self) -> Result<Option<FlushReport>> {
        if !self.options.auto_flush || self.buffer.bytes() < self.options.buffer_limit_bytes {
            return Ok(None);
        }
        debug!(
            buffered_bytes = self.buffer.bytes(),
            limit = self.options.buffer_limit_bytes,
            "store.flush.threshold"
        );
        self.flush_with(FlushTrigger::Threshold).map(Some)
    }

    pub(crate) fn flush_with(&mut self, trigger: FlushTrigger) -> Result<FlushReport> {
        self.ensure_writable("flush")?;
        let mut report = FlushReport::empty(trigger);
        if self.buffer.is_empty() {
            return Ok(report);
        }
        let start = Instant::now();
        let layout = self.layout();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.buffer.table_names() {
            let table = self.schema.table(name)?;
            groups
                .entry(layout.physical_name(table).to_string())
                .or_default()
                .push(name.to_string());
        }

        for (physical, logical) in groups {
            match self.commit_group(&physical, &logical) {
                Ok(written) => {
                    for name in &logical {
                        self.buffer.drain_table(name);
                    }
                    report.transactions += 1;
                    report.puts += written.puts;
                    report.deletes += written.deletes;
                    report.bytes += written.bytes;
                }
                Err(err) => {
                    warn!(
                        table = %physical,
                        error = %err,
                        buffered_entries = self.buffer.len(),
                        "store.flush.failed"
                    );
                    return Err(err);
                }
            }
        }

        report.duration_ms = start.elapsed().as_secs_f64() * 1_000.0;
        info!(
            trigger = ?report.trigger,
            transactions = report.transactions,
            puts = report.puts,
            deletes = report.deletes,
            bytes = report.bytes,
            duration_ms = report.duration_ms,
            "store.flush"
        );
        self.last_flush = Some(report.clone());
        Ok(report)
    }

    fn commit_group(&self, physical: &str, logical: &[String]) -> Result<GroupWrite> {
        let txn = self.db.writer("flush")?.begin_write()?;
        let mut written = GroupWrite::default();
        {
            let mut table = txn.open_table(raw_table(physical))?;
            for name in logical {
                for (key, op) in self.buffer.entries(name) {
                    match op {
                        PendingOp::Put(frame) => {
                            table.insert(key.as_slice(), frame.as_slice())?;
                            written.puts += 1;
                            written.bytes += (key.len() + frame.len()) as u64;
                        }
                        PendingOp::Delete => {
                            table.remove(key.as_slice())?;
                            written.deletes += 1;
                        }
                    }
                }
            }
        }
        let engine = txn.stats()?;
        let allocated = engine.allocated_pages() * engine.page_size() as u64;
        if allocated > self.options.capacity_bytes {
            txn.abort()?;
            return Err(FreadError::TransactionFailure(format!(
                "table {physical} needs {allocated} bytes, capacity is {}",
                self.options.capacity_bytes
            )));
        }
        txn.commit()
            .map_err(|err| FreadError::TransactionFailure(err.to_string()))?;
        Ok(written)
    }
}
