use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::header::{BlockHeader, Header, BLOCK_HEADER_SIZE, HEADER_SIZE};
use super::{block_ids, Block, BlockLog, Blocks, CRC32};
use crate::config::BlockFileOptions;
use crate::error::Result;
use crate::flock::FileLock;
use crate::types::Order;
use crate::Error;

/// File-backed [`BlockLog`].
///
/// Blocks are fixed-size slots after the header and descriptor. The newest
/// block is mirrored in memory; older blocks are full and never change, so
/// they are read straight from disk.
#[derive(Clone)]
pub struct BlockFile {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    path: PathBuf,
    file: File,
    descriptor: Vec<u8>,
    block_size: usize,
    data_offset: u64,
    writable: bool,
    sync_writes: bool,
    tail: RwLock<Tail>,
    _lock: Option<FileLock>,
}

#[derive(Default)]
struct Tail {
    /// Number of allocated blocks.
    count: u64,
    /// Bytes in use of block `count - 1`.
    data: Vec<u8>,
}

impl std::fmt::Debug for BlockFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFile")
            .field("path", &self.inner.path)
            .field("block_size", &self.inner.block_size)
            .field("writable", &self.inner.writable)
            .finish()
    }
}

impl BlockFile {
    /// Opens `path` for appending, creating it with `descriptor` when missing.
    ///
    /// An existing file keeps its own descriptor and block size.
    pub fn open(path: impl AsRef<Path>, descriptor: &[u8], opts: BlockFileOptions) -> Result<Self> {
        let path = path.as_ref();
        if opts.block_size == 0 {
            return Err(Error::InvalidInput("block size must be positive".to_string()));
        }

        let lock = if opts.lock {
            Some(FileLock::lock(FileLock::path_for(path))?)
        } else {
            None
        };

        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() == 0 {
            let header = Header::new(opts.block_size, descriptor)?;
            file.write_all_at(&header.encode(), 0)?;
            file.write_all_at(descriptor, HEADER_SIZE as u64)?;
            file.sync_all()?;
            tracing::info!(
                path = %path.display(),
                block_size = opts.block_size,
                "Created block file"
            );
        }

        Self::load(path, file, true, opts.sync_writes, lock)
    }

    /// Opens an existing file for scanning only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::load(path, file, false, false, None)
    }

    fn load(
        path: &Path,
        file: File,
        writable: bool,
        sync_writes: bool,
        lock: Option<FileLock>,
    ) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact_at(&mut buf, 0)?;
        let header = Header::decode(&buf)?;

        let mut descriptor = vec![0u8; header.descriptor_len as usize];
        file.read_exact_at(&mut descriptor, HEADER_SIZE as u64)?;
        header.verify_descriptor(&descriptor)?;

        let block_size = header.block_size as usize;
        let data_offset = (HEADER_SIZE + descriptor.len()) as u64;
        let stride = (BLOCK_HEADER_SIZE + block_size) as u64;
        let data_len = file.metadata()?.len().saturating_sub(data_offset);
        let count = data_len.div_ceil(stride);

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput(format!("bad block file name: {:?}", path)))?;

        let mut inner = Inner {
            name,
            path: path.to_path_buf(),
            file,
            descriptor,
            block_size,
            data_offset,
            writable,
            sync_writes,
            tail: RwLock::new(Tail::default()),
            _lock: lock,
        };

        let tail = match count {
            0 => Tail::default(),
            n => Tail {
                count: n,
                data: inner.read_from_disk(n - 1)?,
            },
        };
        inner.tail = RwLock::new(tail);

        tracing::debug!(
            path = %path.display(),
            blocks = count,
            writable,
            "Opened block file"
        );
        Ok(BlockFile {
            inner: Arc::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    pub fn block_count(&self) -> Result<u64> {
        Ok(self.inner.tail.read()?.count)
    }

    pub fn is_writable(&self) -> bool {
        self.inner.writable
    }
}

impl Inner {
    fn stride(&self) -> u64 {
        (BLOCK_HEADER_SIZE + self.block_size) as u64
    }

    fn block_offset(&self, id: u64) -> u64 {
        self.data_offset + id * self.stride()
    }

    fn read_from_disk(&self, id: u64) -> Result<Vec<u8>> {
        let offset = self.block_offset(id);
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        self.file.read_exact_at(&mut buf, offset)?;
        let header = BlockHeader::decode(&buf);
        if header.used as usize > self.block_size {
            return Err(Error::ChecksumMismatch);
        }

        let mut data = vec![0u8; header.used as usize];
        self.file
            .read_exact_at(&mut data, offset + BLOCK_HEADER_SIZE as u64)?;
        header.verify(&data)?;
        Ok(data)
    }

    fn read_block(&self, id: u64) -> Result<Block> {
        {
            let tail = self.tail.read()?;
            if id >= tail.count {
                return Err(Error::InvalidInput(format!(
                    "block {} out of range ({} blocks)",
                    id, tail.count
                )));
            }
            if id + 1 == tail.count {
                return Ok(Block {
                    id,
                    data: tail.data.clone(),
                });
            }
        }
        Ok(Block {
            id,
            data: self.read_from_disk(id)?,
        })
    }

    fn append(&self, data: &[u8]) -> Result<u64> {
        if !self.writable {
            return Err(Error::InvalidInput(format!("{} is read-only", self.name)));
        }
        if data.len() > self.block_size {
            return Err(Error::BlockOverflow(data.len(), self.block_size));
        }

        let mut tail = self.tail.write()?;
        let new_block = tail.count == 0 || tail.data.len() + data.len() > self.block_size;
        let (id, existing): (u64, &[u8]) = if new_block {
            (tail.count, &[])
        } else {
            (tail.count - 1, &tail.data)
        };

        let mut digest = CRC32.digest();
        digest.update(existing);
        digest.update(data);
        let header = BlockHeader {
            used: (existing.len() + data.len()) as u32,
            crc: digest.finalize(),
        };

        let block_offset = self.block_offset(id);
        let position = block_offset + (BLOCK_HEADER_SIZE + existing.len()) as u64;
        let written = self
            .file
            .write_all_at(data, position)
            .and_then(|()| self.file.write_all_at(&header.encode(), block_offset))
            .and_then(|()| {
                if self.sync_writes {
                    self.file.sync_data()
                } else {
                    Ok(())
                }
            });
        if let Err(e) = written {
            self.rollback(id, new_block, existing);
            return Err(e.into());
        }

        if new_block {
            tail.count += 1;
            tail.data = Vec::with_capacity(self.block_size);
            tracing::debug!(log = %self.name, block = id, "Allocated block");
        }
        tail.data.extend_from_slice(data);
        Ok(position)
    }

    /// Puts block `id` back the way it was before a failed append.
    fn rollback(&self, id: u64, new_block: bool, existing: &[u8]) {
        let offset = self.block_offset(id);
        let restored = if new_block {
            self.file.set_len(offset)
        } else {
            self.file
                .write_all_at(&BlockHeader::for_data(existing).encode(), offset)
        };
        if let Err(e) = restored {
            tracing::error!(log = %self.name, block = id, error = %e, "Failed to roll back append");
        }
    }
}

impl BlockLog for BlockFile {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn descriptor(&self) -> &[u8] {
        &self.inner.descriptor
    }

    fn write(&self, data: &[u8]) -> Result<u64> {
        self.inner.append(data)
    }

    fn blocks(&self, order: Order) -> Result<Blocks> {
        let count = self.inner.tail.read()?.count;
        let inner = Arc::clone(&self.inner);
        Ok(Box::new(
            block_ids(count, order).map(move |id| inner.read_block(id)),
        ))
    }

    fn last_non_empty_block(&self) -> Result<Option<Block>> {
        let count = self.inner.tail.read()?.count;
        for id in block_ids(count, Order::BottomToTop) {
            let block = self.inner.read_block(id)?;
            if !block.is_empty() {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }
}
