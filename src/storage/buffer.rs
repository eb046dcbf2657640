//! In-memory staging area drained by [`super::Store::flush`].

use std::collections::BTreeMap;

use serde::Serialize;

/// A staged mutation for one encoded key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PendingOp {
    /// Insert or overwrite with a stored value frame.
    Put(Vec<u8>),
    /// Remove a committed key.
    Delete,
}

/// Per-table pending entries in staging order plus a running size estimate.
#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    tables: BTreeMap<String, Vec<(Vec<u8>, PendingOp)>>,
    bytes: u64,
    entries: usize,
}

fn op_size(key: &[u8], op: &PendingOp) -> u64 {
    let value = match op {
        PendingOp::Put(frame) => frame.len(),
        PendingOp::Delete => 0,
    };
    (key.len() + value) as u64
}

impl WriteBuffer {
    pub(crate) fn push(&mut self, table: &str, key: Vec<u8>, op: PendingOp) {
        self.bytes += op_size(&key, &op);
        self.entries += 1;
        match self.tables.get_mut(table) {
            Some(pending) => pending.push((key, op)),
            None => {
                self.tables.insert(table.to_string(), vec![(key, op)]);
            }
        }
    }

    /// Drops every buffered put for `key`, returning how many were removed.
    pub(crate) fn drop_puts(&mut self, table: &str, key: &[u8]) -> usize {
        let Some(pending) = self.tables.get_mut(table) else {
            return 0;
        };
        let before = pending.len();
        let mut freed = 0u64;
        pending.retain(|(k, op)| {
            let matches = k.as_slice() == key && matches!(op, PendingOp::Put(_));
            if matches {
                freed += op_size(k, op);
            }
            !matches
        });
        let removed = before - pending.len();
        if pending.is_empty() {
            self.tables.remove(table);
        }
        self.bytes -= freed;
        self.entries -= removed;
        removed
    }

    /// Entries staged for `table`, in staging order.
    pub(crate) fn entries(&self, table: &str) -> &[(Vec<u8>, PendingOp)] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of tables with pending entries, in name order.
    pub(crate) fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Removes a table's entries after they were committed.
    pub(crate) fn drain_table(&mut self, table: &str) {
        if let Some(pending) = self.tables.remove(table) {
            self.entries -= pending.len();
            self.bytes -= pending.iter().map(|(k, op)| op_size(k, op)).sum::<u64>();
        }
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// What caused a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// Explicit [`super::Store::flush`] call.
    Manual,
    /// The buffer crossed the configured threshold during staging.
    Threshold,
    /// Pending entries were committed ahead of a compaction.
    Compaction,
}

/// Outcome of one flush, also emitted as a `store.flush` tracing event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlushReport {
    /// What started the flush.
    pub trigger: FlushTrigger,
    /// Engine write transactions committed.
    pub transactions: usize,
    /// Inserted or overwritten entries.
    pub puts: u64,
    /// Applied tombstones.
    pub deletes: u64,
    /// Key and value bytes written.
    pub bytes: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl FlushReport {
    pub(crate) fn empty(trigger: FlushTrigger) -> Self {
        Self {
            trigger,
            transactions: 0,
            puts: 0,
            deletes: 0,
            bytes: 0,
            duration_ms: 0.0,
        }
    }

    /// True when nothing was written.
    pub fn is_noop(&self) -> bool {
        self.transactions == 0
    }
}
