#![forbid(unsafe_code)]

//! Store maintenance: compaction and space usage reporting.

mod compact;
mod stats;

/// Rewrites tables in key order and trims the engine file.
pub use compact::CompactReport;

/// Per-table and whole-store space usage.
pub use stats::{format_bytes, StatsReport, TableUsage};
