#![forbid(unsafe_code)]

//! Order-preserving key encoding.
//!
//! Every logical key is mapped to the byte string the engine orders by. Integer
//! components are written as fixed-width big-endian u64 values, so byte order
//! equals numeric order and a tuple's encoded prefix selects exactly the keys
//! sharing its leading components. Signed keys flip the sign bit first.

use std::convert::TryFrom;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FreadError, Result};
use crate::primitives::bytes::ord::{self, U64_LEN};
use crate::storage::value::Value;

/// Arity used for tuple keys when a schema does not specify one.
pub const DEFAULT_TUPLE_ARITY: usize = 2;

/// Shape of the keys stored in one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyKind {
    /// Opaque byte strings (UTF-8 for string keys), ordered lexicographically.
    Bytes,
    /// Unsigned 64-bit integers.
    Int,
    /// Signed 64-bit integers.
    SignedInt,
    /// Fixed-arity tuples of unsigned 64-bit integers.
    Tuple {
        /// Number of components in every key.
        arity: usize,
    },
}

impl KeyKind {
    /// Tuple keys with the given arity.
    pub fn tuple(arity: usize) -> Self {
        KeyKind::Tuple { arity }
    }

    /// Encoded width for fixed-width kinds, `None` for byte keys.
    pub fn encoded_len(self) -> Option<usize> {
        match self {
            KeyKind::Bytes => None,
            KeyKind::Int | KeyKind::SignedInt => Some(U64_LEN),
            KeyKind::Tuple { arity } => Some(arity * U64_LEN),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Bytes => f.write_str("bytes"),
            KeyKind::Int => f.write_str("int"),
            KeyKind::SignedInt => f.write_str("signed_int"),
            KeyKind::Tuple { arity } => write!(f, "tuple({arity})"),
        }
    }
}

/// A logical key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Opaque bytes; strings convert into their UTF-8 bytes.
    Bytes(Vec<u8>),
    /// Unsigned integer.
    Int(u64),
    /// Signed integer.
    SignedInt(i64),
    /// Composite key of integer components.
    Tuple(Vec<u64>),
}

impl Key {
    /// Returns the key bytes when this is a byte key holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Key::Bytes(_) => "bytes".to_string(),
            Key::Int(_) => "int".to_string(),
            Key::SignedInt(_) => "signed_int".to_string(),
            Key::Tuple(parts) => format!("tuple({})", parts.len()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => write!(f, "{bytes:?}"),
            },
            Key::Int(v) => write!(f, "{v}"),
            Key::SignedInt(v) => write!(f, "{v}"),
            Key::Tuple(parts) => {
                f.write_str("(")?;
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Key::Int(v)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::SignedInt(v)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key::Bytes(bytes)
    }
}

impl From<Vec<u64>> for Key {
    fn from(parts: Vec<u64>) -> Self {
        Key::Tuple(parts)
    }
}

impl<const N: usize> From<[u64; N]> for Key {
    fn from(parts: [u64; N]) -> Self {
        Key::Tuple(parts.to_vec())
    }
}

impl From<(u64, u64)> for Key {
    fn from((a, b): (u64, u64)) -> Self {
        Key::Tuple(vec![a, b])
    }
}

impl From<(u64, u64, u64)> for Key {
    fn from((a, b, c): (u64, u64, u64)) -> Self {
        Key::Tuple(vec![a, b, c])
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

fn int_component(value: &Value) -> Result<u64> {
    match value {
        Value::Int(v) => u64::try_from(*v)
            .map_err(|_| FreadError::InvalidKey(format!("negative integer key component {v}"))),
        other => Err(FreadError::InvalidKey(format!(
            "{} cannot be used as an integer key component",
            other.type_name()
        ))),
    }
}

/// Converts a decoded value back into a key, e.g. to chain an ID mapping lookup.
impl TryFrom<&Value> for Key {
    type Error = FreadError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(u64::try_from(*v).map_or(Key::SignedInt(*v), Key::Int)),
            Value::Str(s) => Ok(Key::from(s.as_str())),
            Value::Bytes(bytes) => Ok(Key::Bytes(bytes.clone())),
            Value::List(items) => items
                .iter()
                .map(int_component)
                .collect::<Result<Vec<_>>>()
                .map(Key::Tuple),
            other => Err(FreadError::InvalidKey(format!(
                "{} cannot be used as a key",
                other.type_name()
            ))),
        }
    }
}

/// Parses the textual form of a key for a table of the given kind.
///
/// Integer keys are decimal, tuple keys are comma-separated decimals, and
/// byte keys are taken verbatim.
pub fn parse_key(text: &str, kind: KeyKind) -> Result<Key> {
    match kind {
        KeyKind::Bytes => Ok(Key::from(text)),
        KeyKind::Int => parse_component(text).map(Key::Int),
        KeyKind::SignedInt => text
            .trim()
            .parse()
            .map(Key::SignedInt)
            .map_err(|err| FreadError::InvalidKey(format!("{text:?} is not an integer: {err}"))),
        KeyKind::Tuple { .. } => parse_components(text).map(Key::Tuple),
    }
}

/// Parses comma-separated decimal components, e.g. a scan prefix `1,2`.
pub fn parse_components(text: &str) -> Result<Vec<u64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',').map(parse_component).collect()
}

fn parse_component(text: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|err| FreadError::InvalidKey(format!("{text:?} is not an unsigned integer: {err}")))
}

/// Appends the encoded form of `key` to `out`, validating it against `kind`.
pub fn encode_key(key: &Key, kind: KeyKind, out: &mut Vec<u8>) -> Result<()> {
    match (kind, key) {
        (KeyKind::Bytes, Key::Bytes(bytes)) => out.extend_from_slice(bytes),
        (KeyKind::Int, Key::Int(v)) => ord::push_u64_be(out, *v),
        (KeyKind::Int, Key::SignedInt(v)) => {
            let v = u64::try_from(*v)
                .map_err(|_| FreadError::InvalidKey(format!("negative key {v} for int table")))?;
            ord::push_u64_be(out, v);
        }
        (KeyKind::SignedInt, Key::SignedInt(v)) => ord::push_i64_be(out, *v),
        (KeyKind::SignedInt, Key::Int(v)) => {
            let v = i64::try_from(*v).map_err(|_| {
                FreadError::InvalidKey(format!("key {v} exceeds the signed_int range"))
            })?;
            ord::push_i64_be(out, v);
        }
        (KeyKind::Tuple { arity }, Key::Tuple(parts)) => {
            if parts.len() != arity {
                return Err(FreadError::InvalidKey(format!(
                    "tuple key has {} components, table expects {arity}",
                    parts.len()
                )));
            }
            out.reserve(arity * U64_LEN);
            for part in parts {
                ord::push_u64_be(out, *part);
            }
        }
        (kind, key) => {
            return Err(FreadError::InvalidKey(format!(
                "{} key given for {kind} table",
                key.describe()
            )))
        }
    }
    Ok(())
}

/// Encodes `key` into a fresh buffer.
pub fn encode_key_vec(key: &Key, kind: KeyKind) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(kind.encoded_len().unwrap_or(16));
    encode_key(key, kind, &mut out)?;
    Ok(out)
}

/// Appends the byte prefix selecting every tuple key whose leading components equal `prefix`.
///
/// `prefix` may hold fewer components than the arity; an empty prefix selects the whole table.
pub fn encode_prefix(prefix: &[u64], kind: KeyKind, out: &mut Vec<u8>) -> Result<()> {
    let KeyKind::Tuple { arity } = kind else {
        return Err(FreadError::InvalidKey(format!(
            "prefix scans require tuple keys, table has {kind} keys"
        )));
    };
    if prefix.len() > arity {
        return Err(FreadError::InvalidKey(format!(
            "prefix has {} components, table arity is {arity}",
            prefix.len()
        )));
    }
    for part in prefix {
        ord::push_u64_be(out, *part);
    }
    Ok(())
}

/// Decodes stored key bytes back to their logical form.
pub fn decode_key(bytes: &[u8], kind: KeyKind) -> Result<Key> {
    match kind {
        KeyKind::Bytes => Ok(Key::Bytes(bytes.to_vec())),
        KeyKind::Int => {
            if bytes.len() != U64_LEN {
                return Err(FreadError::CorruptKey(format!(
                    "integer key must be {U64_LEN} bytes, found {}",
                    bytes.len()
                )));
            }
            let v = ord::get_u64_be(bytes).map_err(|e| FreadError::CorruptKey(e.to_string()))?;
            Ok(Key::Int(v))
        }
        KeyKind::SignedInt => {
            if bytes.len() != U64_LEN {
                return Err(FreadError::CorruptKey(format!(
                    "signed integer key must be {U64_LEN} bytes, found {}",
                    bytes.len()
                )));
            }
            let v = ord::get_i64_be(bytes).map_err(|e| FreadError::CorruptKey(e.to_string()))?;
            Ok(Key::SignedInt(v))
        }
        KeyKind::Tuple { arity } => {
            if bytes.len() % U64_LEN != 0 || bytes.len() / U64_LEN != arity {
                return Err(FreadError::CorruptKey(format!(
                    "tuple key of arity {arity} must be {} bytes, found {}",
                    arity * U64_LEN,
                    bytes.len()
                )));
            }
            bytes
                .chunks_exact(U64_LEN)
                .map(|chunk| ord::get_u64_be(chunk).map_err(|e| FreadError::CorruptKey(e.to_string())))
                .collect::<Result<Vec<_>>>()
                .map(Key::Tuple)
        }
    }
}
