//! Schema-driven storage: key and value codecs, the write buffer, and the
//! [`Store`] handle with its commit protocol and query layer.

/// Order-preserving key encoding.
pub mod key;

/// Per-table value codecs and the stored frame format.
pub mod codec;

mod buffer;
mod options;
mod query;
mod schema;
mod sidecar;
pub(crate) mod store;
mod value;

pub use buffer::{FlushReport, FlushTrigger};
pub use codec::ValueCodecKind;
pub use key::{Key, KeyKind, DEFAULT_TUPLE_ARITY};
pub use options::{
    OpenMode, StoreOptions, DEFAULT_BUFFER_LIMIT, DEFAULT_CACHE_SIZE, DEFAULT_CAPACITY, SIZE_1GB,
};
pub use query::{PrefixIter, SCAN_CHUNK};
pub use schema::{Schema, SchemaSnapshot, TableSchema};
pub use sidecar::{load_json, save_json};
pub use store::{Store, DATA_FILE, SCHEMA_FILE, SHARED_TABLE};
pub use value::Value;
