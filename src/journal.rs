//! Ready-made indexes of the text journal.
//!
//! A journal stores documents and dumps as stacks of layers. These indexes
//! map bucket uids, document names, texts and creation times to references
//! into the block files holding the actual content.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{Euid, Identity, Layout, WordCodec, ASCII_EUID, BYTES_EUID};
use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::Index;
use crate::serialize::{
    ArraySerializer, AsciiSerializer, BytesSerializer, StructSerializer, TimestampSerializer,
    VoidSerializer,
};
use crate::types::{Order, State, StopSignal};
use crate::Error;

pub const STATE_SIZE: usize = 8;
pub const PAGE_SIZE: usize = 10;
pub const BUCKET_UID_SIZE: usize = 128;
/// Room for an ASCII value in the bucket index.
pub const ASCII_VALUE_SIZE: usize = 80;

pub const LAYER_EUID: Euid = Euid::from_tag(b"layer000");
pub const DOCUMENT_EUID: Euid = Euid::from_tag(b"doc00000");
pub const TEXT_EUID: Euid = Euid::from_tag(b"txt00000");

/// Well-known state tags.
pub mod states {
    pub const DOCUMENT: &str = "doc";
    pub const DUMP: &str = "dmp";
    pub const DUMP_NEW: &str = "dmpNew";
    pub const LAYER: &str = "lyr";
    pub const LAYER_SNAPSHOT: &str = "lyrSnap";
    pub const ROOT: &str = "root";
}

/// A journal state, padded to [`STATE_SIZE`].
pub fn state(tag: &str) -> Result<State> {
    State::build(STATE_SIZE, tag)
}

pub type BucketUid = [u8; BUCKET_UID_SIZE];

/// Left-justifies `uid` into a bucket uid; longer input is truncated.
pub fn bucket_uid(uid: &str) -> BucketUid {
    let mut out = [0u8; BUCKET_UID_SIZE];
    let n = uid.len().min(BUCKET_UID_SIZE);
    out[..n].copy_from_slice(&uid.as_bytes()[..n]);
    out
}

/// Where a layer's content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    pub blocks_path: String,
    pub block_id: u64,
    pub state: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub bucket: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRef {
    pub blocks_path: String,
    pub block_id: u64,
    pub offset: u32,
    pub len: u32,
}

pub type LayerIndex = Index<BucketUid, LayerRef>;
pub type DocumentIndex = Index<Vec<u8>, DocumentRef>;
pub type TextIndex = Index<[u8; BUCKET_UID_SIZE], TextRef>;
pub type CreationTimeIndex = Index<DateTime<Utc>, Vec<u8>>;
pub type BucketIndex = Index<(), String>;

fn config(dir: impl Into<PathBuf>, qualifier: &str, device: &str) -> IndexConfig {
    IndexConfig::new(dir, qualifier)
        .device(device)
        .page_size(PAGE_SIZE)
}

/// Known buckets, one ASCII value per word and no key.
pub fn bucket_index(dir: impl Into<PathBuf>, device: &str) -> Result<BucketIndex> {
    let codec = WordCodec::new(
        Identity::new(ASCII_EUID, 0),
        Layout::new(STATE_SIZE, 0, ASCII_VALUE_SIZE),
        AsciiSerializer,
    );
    Index::open(config(dir, "bucket", device), VoidSerializer, codec)
}

/// Layers of every bucket, keyed by bucket uid.
pub fn layer_index(dir: impl Into<PathBuf>, device: &str) -> Result<LayerIndex> {
    let codec = WordCodec::new(
        Identity::new(LAYER_EUID, 0),
        Layout::new(STATE_SIZE, BUCKET_UID_SIZE, 200),
        StructSerializer::<LayerRef>::new(),
    );
    Index::open(
        config(dir, "layer", device),
        ArraySerializer::<BUCKET_UID_SIZE>,
        codec,
    )
}

/// Documents keyed by name.
pub fn document_index(dir: impl Into<PathBuf>, device: &str) -> Result<DocumentIndex> {
    let codec = WordCodec::new(
        Identity::new(DOCUMENT_EUID, 0),
        Layout::new(STATE_SIZE, 32, 200),
        StructSerializer::<DocumentRef>::new(),
    );
    Index::open(config(dir, "doc", device), BytesSerializer, codec)
}

pub fn text_index(dir: impl Into<PathBuf>, device: &str) -> Result<TextIndex> {
    let codec = WordCodec::new(
        Identity::new(TEXT_EUID, 0),
        Layout::new(STATE_SIZE, BUCKET_UID_SIZE, 200),
        StructSerializer::<TextRef>::new(),
    );
    Index::open(
        config(dir, "text", device),
        ArraySerializer::<BUCKET_UID_SIZE>,
        codec,
    )
}

/// Bucket hashes keyed by creation time.
pub fn creation_time_index(dir: impl Into<PathBuf>, device: &str) -> Result<CreationTimeIndex> {
    let codec = WordCodec::new(
        Identity::new(BYTES_EUID, 0),
        Layout::new(STATE_SIZE, 32, 200),
        BytesSerializer,
    );
    Index::open(
        config(dir, "creationTime", device),
        TimestampSerializer,
        codec,
    )
}

/// The `count` most recently added distinct keys whose state starts with
/// `state_prefix`, newest first.
///
/// The scan runs bottom to top and stops as soon as enough keys were seen.
pub async fn recent_keys<K, V>(
    index: &Index<K, V>,
    state_prefix: &[u8],
    count: usize,
) -> Result<Vec<K>>
where
    K: Clone + PartialEq + Send + 'static,
    V: Send + 'static,
{
    if count == 0 {
        return Ok(Vec::new());
    }

    let prefix = state_prefix.to_vec();
    let mut seen: Vec<K> = Vec::with_capacity(count);
    let (mut paginer, mut errors) = index.filter_all(
        Order::BottomToTop,
        count,
        move |state: &State, _: &StopSignal| state.starts_with(&prefix),
        move |key: &K, _: &State, stop: &StopSignal| {
            if seen.contains(key) {
                return false;
            }
            seen.push(key.clone());
            if seen.len() >= count {
                stop.stop();
            }
            true
        },
    );

    let mut keys = Vec::with_capacity(count);
    let mut failure = None;
    paginer
        .all(|error, page| {
            keys.extend(page.iter().map(|entry| entry.key.clone()));
            match error {
                Some(e) => {
                    failure = Some(e);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        })
        .await;
    drop(paginer);

    for error in errors.drain() {
        tracing::warn!(error = %error, "Recent keys scan skipped a word");
    }

    match failure {
        None => Ok(keys),
        Some(shared) => Err(Arc::try_unwrap(shared)
            .unwrap_or_else(|shared| Error::InvalidInput(format!("scan failed: {}", shared)))),
    }
}
