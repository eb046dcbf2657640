use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FreadError>;

/// Errors surfaced by the storage layer.
///
/// A missing key is never an error: lookups return `None` instead.
#[derive(Debug, Error)]
pub enum FreadError {
    /// The table name is not declared in the store's schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// The key does not match the table's key kind or arity.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Stored key bytes cannot be decoded with the table's key kind.
    #[error("corrupt key: {0}")]
    CorruptKey(String),
    /// The value cannot be represented by the table's codec.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// Stored value bytes cannot be decoded or decompressed.
    #[error("corrupt value: {0}")]
    CorruptValue(String),
    /// The stored frame was produced by a different codec than the table declares.
    #[error("codec mismatch: expected {expected}, found {found}")]
    CodecMismatch {
        /// Codec declared by the schema.
        expected: String,
        /// Codec recorded in the stored frame.
        found: String,
    },
    /// A write, flush, or compaction was attempted on a read-only store.
    #[error("operation not allowed in read-only mode: {0}")]
    InvalidOperationForMode(&'static str),
    /// An engine write transaction could not be committed.
    #[error("transaction failed: {0}")]
    TransactionFailure(String),
    /// Schema or option misuse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No store exists at the given directory.
    #[error("store not found: {0}")]
    MissingStore(PathBuf),
    /// The engine file was replaced during compaction and could not be reopened.
    #[error("store handle is detached from its engine file; reopen the store")]
    Detached,
    /// Sidecar metadata could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Error reported by the underlying engine.
    #[error(transparent)]
    Engine(#[from] redb::Error),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FreadError {
                fn from(err: $ty) -> Self {
                    FreadError::Engine(err.into())
                }
            }
        )*
    };
}

engine_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    redb::CompactionError,
);

impl From<serde_json::Error> for FreadError {
    fn from(err: serde_json::Error) -> Self {
        FreadError::Serialization(err.to_string())
    }
}

impl FreadError {
    pub(crate) fn missing_store(path: impl Into<PathBuf>) -> Self {
        FreadError::MissingStore(path.into())
    }
}
