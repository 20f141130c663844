//! Append-only block storage underneath an index.
//!
//! A block log is a sequence of fixed-capacity blocks. Words are appended to
//! the newest block; a write never straddles two blocks, so every block
//! holds whole words only. Each log carries a format descriptor written once
//! at creation, which the index uses to configure its codec.
//!
//! # File Format
//!
//! ```text
//! +---------------------+
//! | Header (64 bytes)   |
//! +---------------------+
//! | Descriptor          |
//! +---------------------+
//! | Block 0             |
//! +---------------------+
//! | Block 1             |
//! +---------------------+
//! | ...                 |
//! +---------------------+
//! ```
//!
//! Each block is:
//!
//! ```text
//! +-------------+-----------+------------------------+
//! |used_len:u32 | crc32:u32 | data (block_size bytes)|
//! +-------------+-----------+------------------------+
//! ```
//!
//! The checksum covers the first `used_len` bytes of data.

pub mod file;
pub mod header;
pub mod memory;

pub use file::BlockFile;
pub use memory::MemoryLog;

use crc::{Crc, CRC_32_ISCSI};

use crate::error::Result;
use crate::types::Order;

pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Contents of one block, trimmed to the bytes in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: u64,
    pub data: Vec<u8>,
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub type Blocks = Box<dyn Iterator<Item = Result<Block>> + Send>;

pub trait BlockLog: Send + Sync {
    /// Stable name of the log, used to key per-log counters.
    fn name(&self) -> &str;

    /// Format descriptor stored when the log was created.
    fn descriptor(&self) -> &[u8];

    /// Appends `data` and returns the byte offset it was written at.
    fn write(&self, data: &[u8]) -> Result<u64>;

    /// Lazily reads the blocks present at call time, in `order`.
    fn blocks(&self, order: Order) -> Result<Blocks>;

    /// `None` when the log holds no data yet.
    fn last_non_empty_block(&self) -> Result<Option<Block>>;
}

/// Block ids `0..count` in traversal order.
pub(crate) fn block_ids(count: u64, order: Order) -> Box<dyn Iterator<Item = u64> + Send> {
    match order {
        Order::TopToBottom => Box::new(0..count),
        Order::BottomToTop => Box::new((0..count).rev()),
    }
}
