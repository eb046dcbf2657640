#![forbid(unsafe_code)]

//! Value codec registry.
//!
//! Every stored value is a frame: one header byte followed by the payload. The
//! low bits of the header name the codec that produced the payload and
//! [`COMPRESSED_FLAG`] marks a Snappy-compressed payload. Reading a frame with
//! a different codec than the table declares fails with `CodecMismatch`.

use std::fmt;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::error::{FreadError, Result};
use crate::primitives::bytes::buf::Cursor;
use crate::primitives::bytes::var;
use crate::storage::value::Value;

/// Header bit set when the payload is compressed.
pub const COMPRESSED_FLAG: u8 = 0x80;
const CODEC_MASK: u8 = 0x7f;
const INT_WIDTH: usize = 8;
const MAX_DEPTH: usize = 128;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

/// Serialization strategy applied to a table's values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueCodecKind {
    /// Tagged, schema-free binary encoding of any [`Value`].
    #[default]
    Object,
    /// Whole-object `bincode` serialization of any [`Value`].
    Pickle,
    /// Identity over [`Value::Bytes`].
    Bytes,
    /// Integer list packed as little-endian 8-byte integers.
    IntArray,
    /// Set of integers in `0..=u32::MAX` stored as a roaring bitmap.
    IntBitmap,
}

impl ValueCodecKind {
    fn id(self) -> u8 {
        match self {
            ValueCodecKind::Object => 1,
            ValueCodecKind::Pickle => 2,
            ValueCodecKind::Bytes => 3,
            ValueCodecKind::IntArray => 4,
            ValueCodecKind::IntBitmap => 5,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(ValueCodecKind::Object),
            2 => Some(ValueCodecKind::Pickle),
            3 => Some(ValueCodecKind::Bytes),
            4 => Some(ValueCodecKind::IntArray),
            5 => Some(ValueCodecKind::IntBitmap),
            _ => None,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueCodecKind::Object => "object",
            ValueCodecKind::Pickle => "pickle",
            ValueCodecKind::Bytes => "bytes",
            ValueCodecKind::IntArray => "int_array",
            ValueCodecKind::IntBitmap => "int_bitmap",
        }
    }
}

impl fmt::Display for ValueCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn frame_name(codec: ValueCodecKind, compressed: bool) -> String {
    if compressed {
        format!("{codec}+snappy")
    } else {
        codec.to_string()
    }
}

/// Encodes `value` with `codec`, optionally compressing the payload, into a stored frame.
pub fn encode_value(value: &Value, codec: ValueCodecKind, compress: bool) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    match codec {
        ValueCodecKind::Object => write_object(&mut payload, value, 0)?,
        ValueCodecKind::Pickle => {
            payload = bincode::serialize(value)
                .map_err(|e| FreadError::InvalidValue(format!("pickle encode failed: {e}")))?;
        }
        ValueCodecKind::Bytes => match value {
            Value::Bytes(bytes) => payload.extend_from_slice(bytes),
            other => {
                return Err(FreadError::InvalidValue(format!(
                    "bytes codec requires a bytes value, got {}",
                    other.type_name()
                )))
            }
        },
        ValueCodecKind::IntArray => {
            let ints = int_list(value, codec)?;
            payload.reserve(ints.len() * INT_WIDTH);
            for v in ints {
                payload.extend_from_slice(&v.to_le_bytes());
            }
        }
        ValueCodecKind::IntBitmap => {
            let mut bitmap = RoaringBitmap::new();
            for v in int_list(value, codec)? {
                let member = u32::try_from(v).map_err(|_| {
                    FreadError::InvalidValue(format!("bitmap member {v} outside 0..=u32::MAX"))
                })?;
                bitmap.insert(member);
            }
            payload.reserve(bitmap.serialized_size());
            bitmap.serialize_into(&mut payload)?;
        }
    }

    let mut header = codec.id();
    if compress {
        header |= COMPRESSED_FLAG;
        payload = snap::raw::Encoder::new()
            .compress_vec(&payload)
            .map_err(|e| FreadError::InvalidValue(format!("compression failed: {e}")))?;
    }
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(header);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes a stored frame, checking that it was produced by `codec` with the same compression.
pub fn decode_value(frame: &[u8], codec: ValueCodecKind, compress: bool) -> Result<Value> {
    let (&header, body) = frame
        .split_first()
        .ok_or_else(|| FreadError::CorruptValue("empty value frame".into()))?;
    let compressed = header & COMPRESSED_FLAG != 0;
    let found = ValueCodecKind::from_id(header & CODEC_MASK).ok_or_else(|| {
        FreadError::CorruptValue(format!("unknown codec id {}", header & CODEC_MASK))
    })?;
    if found != codec || compressed != compress {
        return Err(FreadError::CodecMismatch {
            expected: frame_name(codec, compress),
            found: frame_name(found, compressed),
        });
    }

    let decompressed;
    let payload = if compressed {
        decompressed = snap::raw::Decoder::new()
            .decompress_vec(body)
            .map_err(|e| FreadError::CorruptValue(format!("decompression failed: {e}")))?;
        decompressed.as_slice()
    } else {
        body
    };

    match codec {
        ValueCodecKind::Object => {
            let mut cursor = Cursor::new(payload);
            let value = read_object(&mut cursor, 0)?;
            if !cursor.is_empty() {
                return Err(FreadError::CorruptValue(format!(
                    "{} trailing bytes after object value",
                    cursor.remaining()
                )));
            }
            Ok(value)
        }
        ValueCodecKind::Pickle => bincode::deserialize(payload)
            .map_err(|e| FreadError::CorruptValue(format!("pickle decode failed: {e}"))),
        ValueCodecKind::Bytes => Ok(Value::Bytes(payload.to_vec())),
        ValueCodecKind::IntArray => {
            if payload.len() % INT_WIDTH != 0 {
                return Err(FreadError::CorruptValue(format!(
                    "integer array length {} is not a multiple of {INT_WIDTH}",
                    payload.len()
                )));
            }
            Ok(Value::List(
                payload
                    .chunks_exact(INT_WIDTH)
                    .map(|chunk| {
                        let mut raw = [0u8; INT_WIDTH];
                        raw.copy_from_slice(chunk);
                        Value::Int(i64::from_le_bytes(raw))
                    })
                    .collect(),
            ))
        }
        ValueCodecKind::IntBitmap => {
            let bitmap = RoaringBitmap::deserialize_from(payload)
                .map_err(|e| FreadError::CorruptValue(format!("bitmap decode failed: {e}")))?;
            Ok(Value::List(
                bitmap.iter().map(|v| Value::Int(v as i64)).collect(),
            ))
        }
    }
}

fn int_list(value: &Value, codec: ValueCodecKind) -> Result<Vec<i64>> {
    value.to_int_vec().ok_or_else(|| {
        FreadError::InvalidValue(format!(
            "{codec} codec requires a list of integers, got {}",
            value.type_name()
        ))
    })
}

fn corrupt(err: impl fmt::Display) -> FreadError {
    FreadError::CorruptValue(err.to_string())
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    var::encode_u64(len as u64, out);
}

fn write_object(out: &mut Vec<u8>, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(FreadError::InvalidValue(format!(
            "value nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(v) => {
            out.push(TAG_INT);
            var::encode_i64(*v, out);
        }
        Value::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Str(s) => {
            out.push(TAG_STRING);
            write_len(out, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(bytes) => {
            out.push(TAG_BYTES);
            write_len(out, bytes.len());
            out.extend_from_slice(bytes);
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            write_len(out, items.len());
            for item in items {
                write_object(out, item, depth + 1)?;
            }
        }
        Value::Map(pairs) => {
            out.push(TAG_MAP);
            write_len(out, pairs.len());
            for (k, v) in pairs {
                write_object(out, k, depth + 1)?;
                write_object(out, v, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn read_len(cursor: &mut Cursor<'_>) -> Result<usize> {
    let len = cursor.read_var_u64().map_err(corrupt)?;
    usize::try_from(len).map_err(|_| FreadError::CorruptValue(format!("length {len} overflows")))
}

fn read_object(cursor: &mut Cursor<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(FreadError::CorruptValue(format!(
            "value nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    let tag = cursor.read_u8().map_err(corrupt)?;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => match cursor.read_u8().map_err(corrupt)? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(FreadError::CorruptValue(format!("invalid bool byte {other}"))),
        },
        TAG_INT => Value::Int(cursor.read_var_i64().map_err(corrupt)?),
        TAG_FLOAT => Value::Float(cursor.read_f64_le().map_err(corrupt)?),
        TAG_STRING => {
            let len = read_len(cursor)?;
            let raw = cursor.take(len).map_err(corrupt)?;
            let s = std::str::from_utf8(raw).map_err(corrupt)?;
            Value::Str(s.to_string())
        }
        TAG_BYTES => {
            let len = read_len(cursor)?;
            Value::Bytes(cursor.take(len).map_err(corrupt)?.to_vec())
        }
        TAG_LIST => {
            let count = read_len(cursor)?;
            let mut items = Vec::with_capacity(count.min(cursor.remaining()));
            for _ in 0..count {
                items.push(read_object(cursor, depth + 1)?);
            }
            Value::List(items)
        }
        TAG_MAP => {
            let count = read_len(cursor)?;
            let mut pairs = Vec::with_capacity(count.min(cursor.remaining() / 2));
            for _ in 0..count {
                let k = read_object(cursor, depth + 1)?;
                let v = read_object(cursor, depth + 1)?;
                pairs.push((k, v));
            }
            Value::Map(pairs)
        }
        other => return Err(FreadError::CorruptValue(format!("unknown value tag {other:#04x}"))),
    };
    Ok(value)
}
