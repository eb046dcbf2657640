//! Table declarations and the per-store schema registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FreadError, Result};
use crate::storage::codec::{self, ValueCodecKind};
use crate::storage::key::{self, Key, KeyKind, DEFAULT_TUPLE_ARITY};
use crate::storage::value::Value;

/// Prefix reserved for internal engine tables.
pub(crate) const RESERVED_PREFIX: &str = "__";

/// Declaration of one logical table.
///
/// Key kind, codec, and compression are fixed for the lifetime of the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Unique table name.
    pub name: String,
    /// Shape of the table's keys.
    pub key_kind: KeyKind,
    /// Codec applied to values.
    pub value_codec: ValueCodecKind,
    /// Whether encoded values are Snappy-compressed.
    pub compress_value: bool,
}

impl TableSchema {
    /// Declares a table with byte keys and the default object codec.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_kind: KeyKind::Bytes,
            value_codec: ValueCodecKind::default(),
            compress_value: false,
        }
    }

    /// Uses integer keys.
    pub fn int_keys(mut self) -> Self {
        self.key_kind = KeyKind::Int;
        self
    }

    /// Uses signed integer keys.
    pub fn signed_int_keys(mut self) -> Self {
        self.key_kind = KeyKind::SignedInt;
        self
    }

    /// Uses tuple keys of the given arity.
    pub fn tuple_keys(mut self, arity: usize) -> Self {
        self.key_kind = KeyKind::tuple(arity);
        self
    }

    /// Uses tuple keys of the default arity.
    pub fn combined_keys(self) -> Self {
        self.tuple_keys(DEFAULT_TUPLE_ARITY)
    }

    /// Selects the value codec.
    pub fn codec(mut self, codec: ValueCodecKind) -> Self {
        self.value_codec = codec;
        self
    }

    /// Enables or disables value compression.
    pub fn compressed(mut self, enabled: bool) -> Self {
        self.compress_value = enabled;
        self
    }

    /// Encodes a logical key for this table.
    pub fn encode_key(&self, key: &Key) -> Result<Vec<u8>> {
        key::encode_key_vec(key, self.key_kind)
    }

    /// Decodes stored key bytes for this table.
    pub fn decode_key(&self, bytes: &[u8]) -> Result<Key> {
        key::decode_key(bytes, self.key_kind)
    }

    /// Produces the stored frame for `value`; usable as a `pre_encoded` staging payload.
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        codec::encode_value(value, self.value_codec, self.compress_value)
    }

    /// Decodes a stored frame.
    pub fn decode_value(&self, frame: &[u8]) -> Result<Value> {
        codec::decode_value(frame, self.value_codec, self.compress_value)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FreadError::InvalidArgument(
                "table name must be non-empty".into(),
            ));
        }
        if self.name.contains('\0') {
            return Err(FreadError::InvalidArgument(format!(
                "table name {:?} contains NUL",
                self.name
            )));
        }
        if self.name.starts_with(RESERVED_PREFIX) {
            return Err(FreadError::InvalidArgument(format!(
                "table name {:?} uses the reserved prefix {RESERVED_PREFIX}",
                self.name
            )));
        }
        if let KeyKind::Tuple { arity: 0 } = self.key_kind {
            return Err(FreadError::InvalidArgument(format!(
                "table {} declares tuple keys of arity 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// Name-indexed registry of table declarations, built once per store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// Builds a registry, rejecting invalid or duplicate declarations.
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Result<Self> {
        let mut schema = Schema::default();
        for table in tables {
            table.validate()?;
            if schema.tables.contains_key(&table.name) {
                return Err(FreadError::InvalidArgument(format!(
                    "table {} declared twice",
                    table.name
                )));
            }
            schema.tables.insert(table.name.clone(), table);
        }
        Ok(schema)
    }

    /// Looks up a table, failing with `UnknownTable`.
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| FreadError::UnknownTable(name.to_string()))
    }

    /// Iterates tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Number of declared tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no table is declared.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Adds the tables of `declared` that are not yet known.
    ///
    /// A table that is already known must be re-declared identically.
    pub fn merge(&mut self, declared: Schema) -> Result<()> {
        for (name, table) in declared.tables {
            match self.tables.get(&name) {
                Some(existing) if *existing != table => {
                    return Err(FreadError::InvalidArgument(format!(
                        "table {name} was created as {}/{}/compress={} and cannot change to {}/{}/compress={}",
                        existing.key_kind,
                        existing.value_codec,
                        existing.compress_value,
                        table.key_kind,
                        table.value_codec,
                        table.compress_value
                    )));
                }
                Some(_) => {}
                None => {
                    self.tables.insert(name, table);
                }
            }
        }
        Ok(())
    }
}

/// Persisted form of a store's layout, kept in the JSON sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Sidecar format version.
    pub version: u32,
    /// Whether each logical table has its own physical table.
    pub split_tables: bool,
    /// Configured capacity in bytes.
    pub capacity_bytes: u64,
    /// Declared tables.
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    /// Current sidecar format version.
    pub const VERSION: u32 = 1;

    pub(crate) fn new(schema: &Schema, split_tables: bool, capacity_bytes: u64) -> Self {
        Self {
            version: Self::VERSION,
            split_tables,
            capacity_bytes,
            tables: schema.tables().cloned().collect(),
        }
    }

    pub(crate) fn into_schema(self) -> Result<Schema> {
        if self.version != Self::VERSION {
            return Err(FreadError::Serialization(format!(
                "unsupported schema sidecar version {}",
                self.version
            )));
        }
        Schema::new(self.tables)
    }
}
