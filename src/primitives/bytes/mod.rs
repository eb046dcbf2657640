#![forbid(unsafe_code)]
//! Encoding, varint, and buffer utilities shared by the key and value codecs.

use thiserror::Error;

/// Failure while decoding a byte slice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes remained than the decoder needed.
    #[error("truncated input: need {need} bytes, have {have}")]
    Truncated {
        /// Bytes required.
        need: usize,
        /// Bytes available.
        have: usize,
    },
    /// A varint ran past 64 bits.
    #[error("varint exceeds 64 bits")]
    VarintOverflow,
}

pub mod ord {
    //! Order-preserving encoders for fixed-width integer keys.

    use core::convert::TryInto;

    use super::DecodeError;

    /// Width in bytes of one encoded integer component.
    pub const U64_LEN: usize = core::mem::size_of::<u64>();

    /// Appends `v` in big-endian order so byte order equals numeric order.
    pub fn push_u64_be(dst: &mut Vec<u8>, v: u64) {
        dst.extend_from_slice(&v.to_be_bytes());
    }

    /// Decodes a big-endian u64 from the first eight bytes of `src`.
    pub fn get_u64_be(src: &[u8]) -> Result<u64, DecodeError> {
        let head: [u8; U64_LEN] = src
            .get(..U64_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(DecodeError::Truncated {
                need: U64_LEN,
                have: src.len(),
            })?;
        Ok(u64::from_be_bytes(head))
    }

    /// Appends `v` with its sign bit flipped so negative values sort first.
    pub fn push_i64_be(dst: &mut Vec<u8>, v: i64) {
        push_u64_be(dst, (v as u64) ^ SIGN_BIT);
    }

    /// Inverse of [`push_i64_be`].
    pub fn get_i64_be(src: &[u8]) -> Result<i64, DecodeError> {
        get_u64_be(src).map(|raw| (raw ^ SIGN_BIT) as i64)
    }

    const SIGN_BIT: u64 = 1 << 63;
}

pub mod var {
    //! Unsigned varints and ZigZag signed integers.

    use super::DecodeError;

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    /// Decodes a u64 varint from a slice, updating the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64, DecodeError> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *src.get(*off).ok_or(DecodeError::Truncated {
                need: *off + 1,
                have: src.len(),
            })?;
            *off += 1;
            let payload = (byte & 0x7f) as u64;
            if shift == 63 && payload > 1 {
                return Err(DecodeError::VarintOverflow);
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(DecodeError::VarintOverflow);
            }
        }
    }

    /// Encodes an i64 as a ZigZag-encoded varint.
    pub fn encode_i64(v: i64, out: &mut Vec<u8>) {
        let zigzag = ((v << 1) ^ (v >> 63)) as u64;
        encode_u64(zigzag, out);
    }

    /// Decodes a ZigZag-encoded i64 varint from a slice, updating the offset.
    pub fn decode_i64(src: &[u8], off: &mut usize) -> Result<i64, DecodeError> {
        let zigzag = decode_u64(src, off)?;
        Ok(((zigzag >> 1) as i64) ^ (-((zigzag & 1) as i64)))
    }
}

pub mod buf {
    //! A slice-backed cursor for parsing value payloads.

    use core::fmt;

    use super::{var, DecodeError};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        buf: &'a [u8],
        off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
            let remaining = self.remaining();
            if n > remaining {
                return Err(DecodeError::Truncated {
                    need: n,
                    have: remaining,
                });
            }
            let slice = &self.buf[self.off..self.off + n];
            self.off += n;
            Ok(slice)
        }

        /// Reads one byte.
        pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
            Ok(self.take(1)?[0])
        }

        /// Reads an unsigned varint.
        pub fn read_var_u64(&mut self) -> Result<u64, DecodeError> {
            var::decode_u64(self.buf, &mut self.off)
        }

        /// Reads a ZigZag varint.
        pub fn read_var_i64(&mut self) -> Result<i64, DecodeError> {
            var::decode_i64(self.buf, &mut self.off)
        }

        /// Reads a little-endian f64.
        pub fn read_f64_le(&mut self) -> Result<f64, DecodeError> {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(self.take(8)?);
            Ok(f64::from_le_bytes(raw))
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Returns true once every byte has been consumed.
        pub fn is_empty(&self) -> bool {
            self.remaining() == 0
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
