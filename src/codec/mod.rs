//! Fixed-width word codec.
//!
//! Every record of an index is a *word* of `word_size` bytes:
//!
//! ```text
//! +---------+------------------+----------------+-------------+------------------+
//! | seq:u32 | state[stateSize] | key[keySize]   | val_len:u32 | value[valSize]   |
//! +---------+------------------+----------------+-------------+------------------+
//! ```
//!
//! All integers are big-endian. The value region is zero-padded past
//! `val_len`. A codec is identified by an 8-byte type tag and a version;
//! the [`header`] module turns identity and layout into a self-describing
//! descriptor written once per log.

pub mod header;
pub mod word;

pub use header::{Header, HEADER_SIZE, IDENTITY_SIZE};
pub use word::{Word, WordCodec};

use std::fmt;

/// 8-byte type tag of a codec.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Euid(pub u64);

impl Euid {
    pub const fn from_tag(tag: &[u8; 8]) -> Self {
        Euid(u64::from_be_bytes(*tag))
    }

    pub fn tag(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Euid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Euid({:?})", String::from_utf8_lossy(&self.tag()))
    }
}

pub const VOID_EUID: Euid = Euid::from_tag(b"void0000");
pub const BYTES_EUID: Euid = Euid::from_tag(b"bytes000");
pub const ASCII_EUID: Euid = Euid::from_tag(b"ascii000");

/// Which codec, in which version, produced a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub euid: Euid,
    pub version: i32,
}

impl Identity {
    pub const fn new(euid: Euid, version: i32) -> Self {
        Self { euid, version }
    }
}

/// Region sizes of a word. Fixed for the lifetime of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Layout {
    pub state_size: usize,
    pub key_size: usize,
    pub val_size: usize,
}

impl Layout {
    pub const fn new(state_size: usize, key_size: usize, val_size: usize) -> Self {
        Self {
            state_size,
            key_size,
            val_size,
        }
    }

    /// seq + state + key + value length + value.
    pub const fn word_size(&self) -> usize {
        8 + self.state_size + self.key_size + self.val_size
    }

    pub(crate) const fn key_offset(&self) -> usize {
        4 + self.state_size
    }

    pub(crate) const fn value_len_offset(&self) -> usize {
        4 + self.state_size + self.key_size
    }

    pub(crate) const fn value_offset(&self) -> usize {
        8 + self.state_size + self.key_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euid_tag_round_trip() {
        let euid = Euid::from_tag(b"layer000");
        assert_eq!(&euid.tag(), b"layer000");
        assert_ne!(euid, ASCII_EUID);
    }

    #[test]
    fn test_layout_offsets() {
        let layout = Layout::new(10, 8, 100);
        assert_eq!(layout.word_size(), 126);
        assert_eq!(layout.key_offset(), 14);
        assert_eq!(layout.value_len_offset(), 22);
        assert_eq!(layout.value_offset(), 26);
    }

    #[test]
    fn test_layout_without_key() {
        let layout = Layout::new(8, 0, 16);
        assert_eq!(layout.word_size(), 32);
        assert_eq!(layout.key_offset(), layout.value_len_offset());
    }
}
