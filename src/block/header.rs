use byteorder::{BigEndian, ByteOrder};

use super::CRC32;
use crate::error::Result;
use crate::Error;

pub const HEADER_SIZE: usize = 64;
pub const BLOCK_HEADER_SIZE: usize = 8;

const MAGIC: &[u8; 8] = b"WRDLOG\x00\x01";
const VERSION: u32 = 1;

/// Fixed header at the start of every block file.
///
/// ```text
/// offset 0  : bytes[8] magic
/// offset 8  : u32      version
/// offset 12 : u32      block_size
/// offset 16 : u32      descriptor_len
/// offset 20 : u32      crc32(descriptor)
/// offset 24 : reserved up to 64 bytes
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub magic: [u8; 8],
    pub version: u32,
    pub block_size: u32,
    pub descriptor_len: u32,
    pub descriptor_crc: u32,
}

impl Header {
    pub fn new(block_size: usize, descriptor: &[u8]) -> Result<Self> {
        let block_size = u32::try_from(block_size)
            .map_err(|_| Error::InvalidInput(format!("block size {} is too large", block_size)))?;
        let descriptor_len = u32::try_from(descriptor.len()).map_err(|_| {
            Error::InvalidInput(format!("descriptor of {} bytes is too large", descriptor.len()))
        })?;

        Ok(Header {
            magic: *MAGIC,
            version: VERSION,
            block_size,
            descriptor_len,
            descriptor_crc: CRC32.checksum(descriptor),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic != *MAGIC {
            return Err(Error::InvalidMagic);
        }
        if self.version != VERSION {
            return Err(Error::UnsupportedVersion(self.version));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidHeader);
        }
        Ok(())
    }

    pub fn verify_descriptor(&self, descriptor: &[u8]) -> Result<()> {
        if descriptor.len() != self.descriptor_len as usize
            || CRC32.checksum(descriptor) != self.descriptor_crc
        {
            return Err(Error::ChecksumMismatch);
        }
        Ok(())
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.magic);
        BigEndian::write_u32(&mut buf[8..12], self.version);
        BigEndian::write_u32(&mut buf[12..16], self.block_size);
        BigEndian::write_u32(&mut buf[16..20], self.descriptor_len);
        BigEndian::write_u32(&mut buf[20..24], self.descriptor_crc);
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&buf[0..8]);

        let header = Self {
            magic,
            version: BigEndian::read_u32(&buf[8..12]),
            block_size: BigEndian::read_u32(&buf[12..16]),
            descriptor_len: BigEndian::read_u32(&buf[16..20]),
            descriptor_crc: BigEndian::read_u32(&buf[20..24]),
        };
        header.validate()?;
        Ok(header)
    }
}

impl TryFrom<&[u8]> for Header {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let buf: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|head| head.try_into().ok())
            .ok_or(Error::InvalidHeader)?;
        Header::decode(buf)
    }
}

/// Per-block prefix: bytes in use and the checksum over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub used: u32,
    pub crc: u32,
}

impl BlockHeader {
    pub fn for_data(data: &[u8]) -> Self {
        BlockHeader {
            used: data.len() as u32,
            crc: CRC32.checksum(data),
        }
    }

    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.used);
        BigEndian::write_u32(&mut buf[4..8], self.crc);
        buf
    }

    pub fn decode(buf: &[u8; BLOCK_HEADER_SIZE]) -> Self {
        BlockHeader {
            used: BigEndian::read_u32(&buf[0..4]),
            crc: BigEndian::read_u32(&buf[4..8]),
        }
    }

    pub fn verify(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.used as usize || CRC32.checksum(data) != self.crc {
            return Err(Error::ChecksumMismatch);
        }
        Ok(())
    }
}
