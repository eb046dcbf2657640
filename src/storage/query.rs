#![forbid(unsafe_code)]

//! Point lookups, key enumeration, and tuple-prefix scans over committed data.

use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;
use std::ops::Bound;

use redb::ReadTransaction;
use tracing::warn;

use crate::error::{FreadError, Result};
use crate::storage::key::{self, Key};
use crate::storage::schema::TableSchema;
use crate::storage::store::{open_raw, RawTable, Store};
use crate::storage::value::Value;

/// Entries fetched from the engine per refill of a [`PrefixIter`].
pub const SCAN_CHUNK: usize = 256;

impl Store {
    /// Looks up one key; a missing key yields `None`.
    pub fn get_value(&self, table: &str, key: impl Into<Key>) -> Result<Option<Value>> {
        let layout = self.layout();
        let schema = self.schema.table(table)?;
        let raw_key = layout.encode(schema, &key.into())?;
        let txn = self.db.begin_read()?;
        let Some(stored) = open_raw(&txn, layout.physical_name(schema))? else {
            return Ok(None);
        };
        match stored.get(raw_key.as_slice())? {
            Some(frame) => schema.decode_value(frame.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Looks up many keys in one read snapshot, returning only the keys that exist.
    pub fn get_values<K, I>(&self, table: &str, keys: I) -> Result<BTreeMap<Key, Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let layout = self.layout();
        let schema = self.schema.table(table)?;
        let requested = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                layout.encode(schema, &key).map(|raw_key| (key, raw_key))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut found = BTreeMap::new();
        let txn = self.db.begin_read()?;
        let Some(stored) = open_raw(&txn, layout.physical_name(schema))? else {
            return Ok(found);
        };
        for (key, raw_key) in requested {
            if let Some(frame) = stored.get(raw_key.as_slice())? {
                let value = schema.decode_value(frame.value())?;
                found.insert(key, value);
            }
        }
        Ok(found)
    }

    /// First `n` keys of a table in stored order.
    pub fn head(&self, table: &str, n: usize) -> Result<Vec<Key>> {
        let layout = self.layout();
        let schema = self.schema.table(table)?;
        let mut keys = Vec::with_capacity(n.min(SCAN_CHUNK));
        if n == 0 {
            return Ok(keys);
        }
        let prefix = layout.prefix(schema);
        let txn = self.db.begin_read()?;
        let Some(stored) = open_raw(&txn, layout.physical_name(schema))? else {
            return Ok(keys);
        };
        for entry in stored.range::<&[u8]>(prefix.as_slice()..)? {
            let (raw_key, _) = entry?;
            let raw_key = raw_key.value();
            if !raw_key.starts_with(&prefix) {
                break;
            }
            match schema.decode_key(&raw_key[prefix.len()..]) {
                Ok(key) => keys.push(key),
                Err(err) => self.skip_corrupt(table, err)?,
            }
            if keys.len() == n {
                break;
            }
        }
        Ok(keys)
    }

    /// Scans a tuple-keyed table for keys whose leading components equal `prefix`.
    ///
    /// `prefix` may be shorter than the table's arity. Entries are yielded in
    /// ascending key order from a single read snapshot.
    pub fn iter_prefix(&self, table: &str, prefix: &[u64]) -> Result<PrefixIter<'_>> {
        let layout = self.layout();
        let schema = self.schema.table(table)?;
        let table_prefix = layout.prefix(schema);
        let mut scan_prefix = table_prefix.clone();
        key::encode_prefix(prefix, schema.key_kind, &mut scan_prefix)?;
        let txn = self.db.begin_read()?;
        let stored = open_raw(&txn, layout.physical_name(schema))?;
        Ok(PrefixIter {
            done: stored.is_none(),
            stored,
            _txn: txn,
            schema: schema.clone(),
            prefix: scan_prefix,
            strip: table_prefix.len(),
            resume_after: None,
            pending: VecDeque::new(),
            strict: self.options.strict_reads,
            _store: PhantomData,
        })
    }

    fn skip_corrupt(&self, table: &str, err: FreadError) -> Result<()> {
        if self.options.strict_reads {
            return Err(err);
        }
        warn!(table, error = %err, "query.corrupt_key");
        Ok(())
    }
}

/// Lazy, forward-only scan returned by [`Store::iter_prefix`].
///
/// Borrows the store, so the store cannot be flushed or compacted while a scan is open.
pub struct PrefixIter<'s> {
    stored: Option<RawTable>,
    _txn: ReadTransaction,
    schema: TableSchema,
    prefix: Vec<u8>,
    strip: usize,
    resume_after: Option<Vec<u8>>,
    pending: VecDeque<(Vec<u8>, Vec<u8>)>,
    done: bool,
    strict: bool,
    _store: PhantomData<&'s Store>,
}

impl PrefixIter<'_> {
    fn refill(&mut self) -> Result<()> {
        let Some(stored) = &self.stored else {
            self.done = true;
            return Ok(());
        };
        let resume_after = self.resume_after.take();
        let start = match &resume_after {
            Some(last) => Bound::Excluded(last.as_slice()),
            None => Bound::Included(self.prefix.as_slice()),
        };
        let range = stored.range::<&[u8]>((start, Bound::Unbounded))?;
        let mut fetched = 0;
        let mut exhausted = true;
        for entry in range {
            let (raw_key, frame) = entry?;
            let raw_key = raw_key.value();
            if !raw_key.starts_with(&self.prefix) {
                break;
            }
            self.pending
                .push_back((raw_key.to_vec(), frame.value().to_vec()));
            fetched += 1;
            if fetched == SCAN_CHUNK {
                exhausted = false;
                break;
            }
        }
        if exhausted {
            self.done = true;
        } else {
            self.resume_after = self.pending.back().map(|(k, _)| k.clone());
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.done = true;
        self.pending.clear();
    }
}

impl Iterator for PrefixIter<'_> {
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((raw_key, frame)) = self.pending.pop_front() {
                let key = match self.schema.decode_key(&raw_key[self.strip..]) {
                    Ok(key) => key,
                    Err(err) if self.strict => {
                        self.finish();
                        return Some(Err(err));
                    }
                    Err(err) => {
                        warn!(table = %self.schema.name, error = %err, "query.corrupt_key");
                        continue;
                    }
                };
                return Some(self.schema.decode_value(&frame).map(|value| (key, value)));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.refill() {
                self.finish();
                return Some(Err(err));
            }
        }
    }
}

impl std::fmt::Debug for PrefixIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixIter")
            .field("table", &self.schema.name)
            .field("prefix", &self.prefix)
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish()
    }
}
