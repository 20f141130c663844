use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_PRELOAD_PAGES: usize = 1;
pub const DEFAULT_WORDS_PER_BLOCK: usize = 64;

/// Configuration of an on-disk index
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory holding the index logs (default: ./wordlog)
    pub dir: PathBuf,

    /// Index name, first part of every log file name (default: "index")
    pub qualifier: String,

    /// Device owning the writable log (default: "local")
    pub device: String,

    /// Entries per page when a scan does not ask for a size (default: 10)
    pub page_size: usize,

    /// Pages a scan may queue ahead of its reader (default: 1)
    pub preload_pages: usize,

    /// Capacity of a block, in words (default: 64)
    pub words_per_block: usize,

    /// Sync the log to disk after every add (default: false)
    pub sync_writes: bool,

    /// Include other devices' logs found in `dir`, read-only (default: true)
    pub scan_other_devices: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./wordlog"),
            qualifier: "index".to_string(),
            device: "local".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            preload_pages: DEFAULT_PRELOAD_PAGES,
            words_per_block: DEFAULT_WORDS_PER_BLOCK,
            sync_writes: false,
            scan_other_devices: true,
        }
    }
}

impl IndexConfig {
    /// Create a new config with the given directory and qualifier
    pub fn new(dir: impl Into<PathBuf>, qualifier: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            qualifier: qualifier.into(),
            ..Default::default()
        }
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn preload_pages(mut self, pages: usize) -> Self {
        self.preload_pages = pages;
        self
    }

    pub fn words_per_block(mut self, words: usize) -> Self {
        self.words_per_block = words;
        self
    }

    pub fn sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    pub fn scan_other_devices(mut self, enabled: bool) -> Self {
        self.scan_other_devices = enabled;
        self
    }

    /// Checks that log names of this index can be told apart from those of
    /// other indexes sharing the directory.
    pub fn validate(&self) -> Result<()> {
        if self.qualifier.is_empty() || self.qualifier.contains('-') {
            return Err(Error::InvalidInput(format!(
                "qualifier {:?} must be non-empty and contain no '-'",
                self.qualifier
            )));
        }
        if self.device.is_empty() {
            return Err(Error::InvalidInput("device must be non-empty".to_string()));
        }
        Ok(())
    }

    /// File name of the `n`th log of `device`, e.g. `doc-laptop-001.idx`.
    pub fn log_name(&self, device: &str, n: usize) -> String {
        format!("{}-{}-{:03}.idx", self.qualifier, device, n)
    }

    pub fn device_log_path(&self) -> PathBuf {
        self.dir.join(self.log_name(&self.device, 1))
    }

    /// Device encoded in a log file name of this index, if it is one.
    pub fn device_of(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let rest = name
            .strip_prefix(self.qualifier.as_str())?
            .strip_prefix('-')?
            .strip_suffix(".idx")?;
        let (device, number) = rest.rsplit_once('-')?;
        if device.is_empty() || number.len() != 3 || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(device.to_string())
    }

    /// Page size a scan runs with; 0 picks the configured default.
    pub fn effective_page_size(&self, requested: usize) -> usize {
        match requested {
            0 => self.page_size.max(1),
            n => n,
        }
    }
}

/// Options of a single block file
#[derive(Debug, Clone)]
pub struct BlockFileOptions {
    /// Data bytes per block, ignored when opening an existing file
    pub block_size: usize,

    /// Sync after every write (default: false)
    pub sync_writes: bool,

    /// Take the exclusive writer lock (default: true)
    pub lock: bool,
}

impl BlockFileOptions {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            sync_writes: false,
            lock: true,
        }
    }

    pub fn sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    pub fn lock(mut self, enabled: bool) -> Self {
        self.lock = enabled;
        self
    }
}
