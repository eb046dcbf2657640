use std::fs;
use std::path::Path;
use std::time::Instant;

use redb::{ReadableTable, WriteTransaction};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FreadError, Result};
use crate::storage::store::{build_engine, open_raw, raw_table, Engine, Store};
use crate::storage::FlushTrigger;

/// Name prefix of the scratch table used by single-table compaction.
const SCRATCH_PREFIX: &str = "__compact__";

/// Report generated after a compaction completes.
#[derive(Debug, Clone, Serialize)]
pub struct CompactReport {
    /// Duration of the compaction in milliseconds.
    pub duration_ms: f64,
    /// Physical tables that were rewritten.
    pub tables: Vec<String>,
    /// Entries copied into the rewritten tables.
    pub entries_copied: u64,
    /// Engine file size before compaction.
    pub file_bytes_before: u64,
    /// Engine file size after compaction.
    pub file_bytes_after: u64,
}

fn copy_table(txn: &WriteTransaction, from: &str, to: &str) -> Result<u64> {
    let source = txn.open_table(raw_table(from))?;
    let mut target = txn.open_table(raw_table(to))?;
    let mut copied = 0;
    for entry in source.iter()? {
        let (key, value) = entry?;
        target.insert(key.value(), value.value())?;
        copied += 1;
    }
    Ok(copied)
}

impl Store {
    /// Rewrites the whole store, or only the physical table backing `table`,
    /// in key order and trims unused engine pages.
    ///
    /// Staged entries are flushed first. A failure leaves the committed data
    /// as it was before the call. If the swapped engine file cannot be
    /// reopened the store reports [`FreadError::Detached`] until reopened.
    pub fn compress(&mut self, table: Option<&str>) -> Result<CompactReport> {
        self.ensure_writable("compress")?;
        let physical = match table {
            Some(name) => {
                let schema = self.schema.table(name)?;
                Some(self.layout().physical_name(schema).to_string())
            }
            None => None,
        };
        self.flush_with(FlushTrigger::Compaction)?;

        let start = Instant::now();
        let data_path = self.data_path();
        let file_bytes_before = fs::metadata(&data_path)?.len();
        let (tables, entries_copied) = match physical {
            Some(physical) => {
                let copied = self.rewrite_table(&physical)?;
                (vec![physical], copied)
            }
            None => self.rewrite_store(&data_path)?,
        };
        let report = CompactReport {
            duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
            tables,
            entries_copied,
            file_bytes_before,
            file_bytes_after: fs::metadata(&data_path)?.len(),
        };
        info!(
            tables = report.tables.len(),
            entries_copied = report.entries_copied,
            file_bytes_before = report.file_bytes_before,
            file_bytes_after = report.file_bytes_after,
            duration_ms = report.duration_ms,
            "store.compact"
        );
        Ok(report)
    }

    fn rewrite_table(&mut self, physical: &str) -> Result<u64> {
        let scratch = format!("{SCRATCH_PREFIX}{physical}");
        let txn = self.db.writer("compress")?.begin_write()?;
        let copied = copy_table(&txn, physical, &scratch)?;
        txn.delete_table(raw_table(physical))?;
        copy_table(&txn, &scratch, physical)?;
        txn.delete_table(raw_table(&scratch))?;
        txn.commit()
            .map_err(|err| FreadError::TransactionFailure(err.to_string()))?;
        self.db.writer_mut("compress")?.compact()?;
        Ok(copied)
    }

    fn rewrite_store(&mut self, data_path: &Path) -> Result<(Vec<String>, u64)> {
        let staging = data_path.with_extension("redb.compact");
        if staging.exists() {
            fs::remove_file(&staging)?;
        }
        let tables = self.physical_tables();
        let copied = match self.copy_into(&staging, &tables) {
            Ok(copied) => copied,
            Err(err) => {
                warn!(staging = %staging.display(), error = %err, "store.compact.failed");
                let _ = fs::remove_file(&staging);
                return Err(err);
            }
        };
        // The live handle is closed before the swap so no write can land in an unlinked file.
        drop(std::mem::replace(&mut self.db, Engine::Detached));
        let swapped = fs::rename(&staging, data_path);
        if swapped.is_err() {
            let _ = fs::remove_file(&staging);
        }
        self.reattach(data_path)?;
        swapped?;
        Ok((tables, copied))
    }

    /// Reopens the engine file after a swap. On failure the store stays
    /// detached and every later operation reports [`FreadError::Detached`].
    fn reattach(&mut self, data_path: &Path) -> Result<()> {
        match build_engine(self.options.cache_size_bytes).create(data_path) {
            Ok(db) => {
                self.db = Engine::Writable(db);
                Ok(())
            }
            Err(err) => {
                warn!(path = %data_path.display(), error = %err, "store.compact.reopen_failed");
                Err(FreadError::Detached)
            }
        }
    }

    /// Copies every physical table into a fresh engine file at `staging`.
    fn copy_into(&self, staging: &Path, tables: &[String]) -> Result<u64> {
        let mut target = build_engine(self.options.cache_size_bytes).create(staging)?;
        let source_txn = self.db.begin_read()?;
        let mut copied = 0;
        for physical in tables {
            let Some(source) = open_raw(&source_txn, physical)? else {
                continue;
            };
            let txn = target.begin_write()?;
            {
                let mut dest = txn.open_table(raw_table(physical))?;
                for entry in source.iter()? {
                    let (key, value) = entry?;
                    dest.insert(key.value(), value.value())?;
                    copied += 1;
                }
            }
            txn.commit()
                .map_err(|err| FreadError::TransactionFailure(err.to_string()))?;
        }
        drop(source_txn);
        target.compact()?;
        Ok(copied)
    }
}
