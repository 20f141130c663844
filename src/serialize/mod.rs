//! Serializer plugins converting typed keys and values to and from the
//! fixed-size regions of a word.
//!
//! A serializer writes into a caller-provided buffer whose length is the
//! configured region size and reports how many bytes it used. It must never
//! write past the buffer; a value that does not fit is rejected.

pub mod bincode;
pub mod time;

pub use self::bincode::StructSerializer;
pub use self::time::TimestampSerializer;

use crate::error::Result;
use crate::Error;

/// Converts `T` to and from bytes.
pub trait Serializer<T>: Send + Sync {
    /// Writes `value` into `out` and returns the number of bytes written.
    fn serialize(&self, value: &T, out: &mut [u8]) -> Result<usize>;

    /// Reads a value back from the bytes previously written by `serialize`.
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Raw byte sequences, copied as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn serialize(&self, value: &Vec<u8>, out: &mut [u8]) -> Result<usize> {
        if value.len() > out.len() {
            return Err(Error::ValueTooLong(value.len(), out.len()));
        }
        out[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Fixed-size byte arrays. Shorter inputs are zero-extended on read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArraySerializer<const N: usize>;

impl<const N: usize> Serializer<[u8; N]> for ArraySerializer<N> {
    fn serialize(&self, value: &[u8; N], out: &mut [u8]) -> Result<usize> {
        if N > out.len() {
            return Err(Error::ValueTooLong(N, out.len()));
        }
        out[..N].copy_from_slice(value);
        Ok(N)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        let n = bytes.len().min(N);
        array[..n].copy_from_slice(&bytes[..n]);
        Ok(array)
    }
}

pub const NULL_CHAR: u8 = 0;

/// NUL-terminated ASCII text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiSerializer;

impl Serializer<String> for AsciiSerializer {
    fn serialize(&self, value: &String, out: &mut [u8]) -> Result<usize> {
        if !value.is_ascii() {
            return Err(Error::NotAscii);
        }
        if value.len() > out.len() {
            return Err(Error::ValueTooLong(value.len(), out.len()));
        }
        out[..value.len()].copy_from_slice(value.as_bytes());
        // A text filling the whole region has no room for its terminator.
        if value.len() < out.len() {
            out[value.len()] = NULL_CHAR;
        }
        Ok(value.len())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        let end = bytes
            .iter()
            .position(|b| *b == NULL_CHAR)
            .unwrap_or(bytes.len());
        let text = &bytes[..end];
        if !text.is_ascii() {
            return Err(Error::NotAscii);
        }
        Ok(String::from_utf8_lossy(text).into_owned())
    }
}

/// Unit keys or values occupying no bytes at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidSerializer;

impl Serializer<()> for VoidSerializer {
    fn serialize(&self, _value: &(), _out: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn deserialize(&self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Serializes a key into a fresh zero-padded buffer of exactly `size` bytes.
pub fn serialize_key<K>(serializer: &dyn Serializer<K>, key: &K, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    serializer.serialize(key, &mut buf).map_err(|e| match e {
        Error::ValueTooLong(len, max) => Error::KeyTooLong(len, max),
        other => other,
    })?;
    Ok(buf)
}
