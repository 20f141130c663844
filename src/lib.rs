pub mod block;
pub mod codec;
pub mod config;
pub mod error;
pub mod flock;
pub mod index;
pub mod journal;
pub mod loader;
pub mod paginer;
pub mod serialize;
pub mod types;

pub use block::{Block, BlockFile, BlockLog, MemoryLog};
pub use codec::{Euid, Identity, Layout, Word, WordCodec};
pub use config::{BlockFileOptions, IndexConfig};
pub use error::{Error, Result};
pub use index::{Index, ScanErrors};
pub use loader::Loader;
pub use paginer::{Entry, Page, Paginer};
pub use serialize::Serializer;
pub use types::{Order, State, StopSignal};
