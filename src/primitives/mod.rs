//! Low-level byte primitives shared by the codecs.

/// Byte-level encoding and decoding utilities.
pub mod bytes;
