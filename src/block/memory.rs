use std::sync::{Arc, RwLock};

use super::{block_ids, Block, BlockLog, Blocks};
use crate::error::Result;
use crate::types::Order;
use crate::Error;

/// Volatile block log kept entirely in memory.
///
/// Same block semantics as [`super::BlockFile`], without persistence. Handy
/// for tests and short-lived indexes.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    name: String,
    descriptor: Vec<u8>,
    block_size: usize,
    blocks: Arc<RwLock<Vec<Vec<u8>>>>,
}

impl MemoryLog {
    pub fn new(name: impl Into<String>, descriptor: Vec<u8>, block_size: usize) -> Self {
        Self {
            name: name.into(),
            descriptor,
            block_size,
            blocks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().map(|b| b.len()).unwrap_or(0)
    }
}

impl BlockLog for MemoryLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }

    fn write(&self, data: &[u8]) -> Result<u64> {
        if data.len() > self.block_size {
            return Err(Error::BlockOverflow(data.len(), self.block_size));
        }
        let mut blocks = self.blocks.write()?;
        let needs_block = blocks
            .last()
            .map_or(true, |tail| tail.len() + data.len() > self.block_size);
        if needs_block {
            blocks.push(Vec::with_capacity(self.block_size));
        }

        let id = blocks.len() - 1;
        let tail = &mut blocks[id];
        let offset = (id * self.block_size + tail.len()) as u64;
        tail.extend_from_slice(data);
        Ok(offset)
    }

    fn blocks(&self, order: Order) -> Result<Blocks> {
        let count = self.blocks.read()?.len() as u64;
        let blocks = Arc::clone(&self.blocks);
        Ok(Box::new(block_ids(count, order).map(move |id| -> Result<Block> {
            let blocks = blocks.read()?;
            Ok(Block {
                id,
                data: blocks[id as usize].clone(),
            })
        })))
    }

    fn last_non_empty_block(&self) -> Result<Option<Block>> {
        let blocks = self.blocks.read()?;
        Ok(blocks
            .iter()
            .enumerate()
            .rev()
            .find(|(_, data)| !data.is_empty())
            .map(|(id, data)| Block {
                id: id as u64,
                data: data.clone(),
            }))
    }
}
