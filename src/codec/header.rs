use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Euid, Identity, Layout};
use crate::error::Result;
use crate::Error;

/// Bytes needed to compare identities: type tag + version.
pub const IDENTITY_SIZE: usize = 12;

/// Bytes needed to set a codec up: identity + the three region sizes.
pub const HEADER_SIZE: usize = 24;

/// Self-describing codec descriptor.
///
/// ```text
/// offset 0  : bytes[8] type tag
/// offset 8  : i32      version
/// offset 12 : i32      stateSize
/// offset 16 : i32      keySize
/// offset 20 : i32      valSize
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub identity: Identity,
    pub layout: Layout,
}

impl Header {
    pub fn new(identity: Identity, layout: Layout) -> Self {
        Header { identity, layout }
    }

    /// Encodes the header, zero-padded to `max(word_size, HEADER_SIZE)`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.layout.word_size().max(HEADER_SIZE);
        let mut buf = Vec::with_capacity(len);
        HeaderEncoder::new(&mut buf).encode(self)?;
        buf.resize(len, 0);
        Ok(buf)
    }

    /// Reads only the identity. `None` when fewer than 12 bytes are given.
    pub fn peek_identity(bytes: &[u8]) -> Option<Identity> {
        if bytes.len() < IDENTITY_SIZE {
            return None;
        }
        HeaderDecoder::new(bytes).decode_identity().ok()
    }
}

impl TryFrom<&[u8]> for Header {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort(bytes.len(), HEADER_SIZE));
        }
        HeaderDecoder::new(bytes).decode()
    }
}

impl TryFrom<&Vec<u8>> for Header {
    type Error = Error;

    fn try_from(value: &Vec<u8>) -> Result<Self> {
        Header::try_from(value.as_slice())
    }
}

pub struct HeaderDecoder<R: Read> {
    reader: R,
}

impl<'a> HeaderDecoder<Cursor<&'a [u8]>> {
    pub fn new(bytes: &'a [u8]) -> Self {
        HeaderDecoder {
            reader: Cursor::new(bytes),
        }
    }
}

impl<R: Read> HeaderDecoder<R> {
    fn decode_identity(&mut self) -> Result<Identity> {
        let euid = self
            .reader
            .read_u64::<BigEndian>()
            .map_err(|e| Error::Decode("euid", e))?;

        let version = self
            .reader
            .read_i32::<BigEndian>()
            .map_err(|e| Error::Decode("version", e))?;

        Ok(Identity::new(Euid(euid), version))
    }

    fn decode_size(&mut self, field: &'static str) -> Result<usize> {
        let size = self
            .reader
            .read_i32::<BigEndian>()
            .map_err(|e| Error::Decode(field, e))?;
        usize::try_from(size).map_err(|_| Error::InvalidHeader)
    }

    pub fn decode(&mut self) -> Result<Header> {
        let identity = self.decode_identity()?;
        let state_size = self.decode_size("stateSize")?;
        let key_size = self.decode_size("keySize")?;
        let val_size = self.decode_size("valSize")?;

        Ok(Header {
            identity,
            layout: Layout::new(state_size, key_size, val_size),
        })
    }
}

pub struct HeaderEncoder<W: Write> {
    writer: W,
}

impl<W: Write> HeaderEncoder<W> {
    pub fn new(writer: W) -> Self {
        HeaderEncoder { writer }
    }

    fn encode_size(&mut self, field: &'static str, size: usize) -> Result<()> {
        let size = i32::try_from(size)
            .map_err(|_| Error::InvalidInput(format!("{} does not fit an i32", field)))?;
        self.writer
            .write_i32::<BigEndian>(size)
            .map_err(|e| Error::Encode(field, e))
    }

    pub fn encode(&mut self, header: &Header) -> Result<()> {
        self.writer
            .write_u64::<BigEndian>(header.identity.euid.0)
            .map_err(|e| Error::Encode("euid", e))?;

        self.writer
            .write_i32::<BigEndian>(header.identity.version)
            .map_err(|e| Error::Encode("version", e))?;

        self.encode_size("stateSize", header.layout.state_size)?;
        self.encode_size("keySize", header.layout.key_size)?;
        self.encode_size("valSize", header.layout.val_size)?;

        Ok(())
    }
}
