use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use redb::ReadableTableMetadata;
use serde::Serialize;

use crate::error::Result;
use crate::storage::store::{open_raw, Store};

/// Space used by one physical table, or by the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableUsage {
    /// Committed entries.
    pub entries: u64,
    /// Key and value bytes.
    pub stored_bytes: u64,
    /// Stored bytes plus engine metadata and fragmentation.
    pub used_bytes: u64,
    /// Store capacity the ratio is measured against.
    pub capacity_bytes: u64,
    /// `used_bytes / capacity_bytes`.
    pub fill_ratio: f64,
}

impl TableUsage {
    fn with_capacity(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self.fill_ratio = if capacity_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / capacity_bytes as f64
        };
        self
    }
}

/// Output of [`Store::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Usage per physical table, by name.
    pub tables: BTreeMap<String, TableUsage>,
    /// Sum over every physical table.
    pub total: TableUsage,
    /// Size of the engine file on disk.
    pub file_size_bytes: u64,
}

impl Store {
    /// Reports how much of the configured capacity each table uses.
    pub fn stats(&self) -> Result<StatsReport> {
        let capacity = self.options.capacity_bytes;
        let txn = self.db.begin_read()?;
        let mut tables = BTreeMap::new();
        let mut total = TableUsage::default();
        for physical in self.physical_tables() {
            let usage = match open_raw(&txn, &physical)? {
                Some(table) => {
                    let engine = table.stats()?;
                    TableUsage {
                        entries: table.len()?,
                        stored_bytes: engine.stored_bytes(),
                        used_bytes: engine.stored_bytes()
                            + engine.metadata_bytes()
                            + engine.fragmented_bytes(),
                        ..TableUsage::default()
                    }
                }
                None => TableUsage::default(),
            };
            total.entries += usage.entries;
            total.stored_bytes += usage.stored_bytes;
            total.used_bytes += usage.used_bytes;
            tables.insert(physical, usage.with_capacity(capacity));
        }
        Ok(StatsReport {
            tables,
            total: total.with_capacity(capacity),
            file_size_bytes: fs::metadata(self.data_path())?.len(),
        })
    }
}

/// Formats a byte count with binary units, e.g. `21.2MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

fn write_usage(f: &mut fmt::Formatter<'_>, name: &str, usage: &TableUsage) -> fmt::Result {
    writeln!(
        f,
        "{name} : {:.2}% - {}/{}",
        usage.fill_ratio * 100.0,
        format_bytes(usage.used_bytes),
        format_bytes(usage.capacity_bytes)
    )
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, usage) in &self.tables {
            write_usage(f, name, usage)?;
        }
        write_usage(f, "Total", &self.total)
    }
}
