use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder};
use serde::{de::DeserializeOwned, Serialize};

use super::Serializer;
use crate::error::Result;
use crate::Error;

const FRAME_SIZE: usize = 4;

/// Length-framed generic structures: a `u32` byte count followed by the
/// bincode encoding of the value.
pub struct StructSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> StructSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for StructSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for StructSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for StructSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StructSerializer<{}>", std::any::type_name::<T>())
    }
}

impl<T> Serializer<T> for StructSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T, out: &mut [u8]) -> Result<usize> {
        let size = ::bincode::serialized_size(value)
            .map_err(|e| Error::Serialize(format!("sizing failed: {}", e)))? as usize;
        let total = FRAME_SIZE + size;
        if total > out.len() {
            return Err(Error::ValueTooLong(total, out.len()));
        }

        BigEndian::write_u32(&mut out[..FRAME_SIZE], size as u32);
        ::bincode::serialize_into(&mut out[FRAME_SIZE..total], value)
            .map_err(|e| Error::Serialize(e.to_string()))?;
        Ok(total)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        if bytes.len() < FRAME_SIZE {
            return Err(Error::Serialize("truncated frame".to_string()));
        }
        let size = BigEndian::read_u32(&bytes[..FRAME_SIZE]) as usize;
        let payload = bytes
            .get(FRAME_SIZE..FRAME_SIZE + size)
            .ok_or_else(|| Error::Serialize(format!("frame of {} bytes is truncated", size)))?;
        ::bincode::deserialize(payload)
            .map_err(|e| Error::Serialize(format!("deserialization failed: {}", e)))
    }
}
