//! Keyed, append-only index over one or more block logs.
//!
//! Every add appends one word to the device's own log. Scans walk every log
//! (the device's and, read-only, those of other devices sharing the
//! directory), decode each block and push the accepted words into a
//! [`Paginer`]. The logs are walked in list order top to bottom and in
//! reverse bottom to top.

pub mod scan;

pub use scan::ScanErrors;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::block::{BlockFile, BlockLog};
use crate::codec::{Word, WordCodec};
use crate::config::{BlockFileOptions, IndexConfig};
use crate::error::Result;
use crate::loader::Loader;
use crate::paginer::{Entry, Paginer};
use crate::serialize::{serialize_key, Serializer};
use crate::types::{Order, State, StopSignal};
use crate::Error;

use scan::{ErrorSink, WordScan};

/// A log together with the codec configured from its own descriptor.
pub(crate) struct Shard<V> {
    pub(crate) log: Arc<dyn BlockLog>,
    pub(crate) codec: WordCodec<V>,
}

impl<V> Shard<V> {
    pub(crate) fn new(log: Arc<dyn BlockLog>, template: &WordCodec<V>) -> Result<Self> {
        let mut codec = template.clone();
        if let Err(e) = codec.setup(log.descriptor()) {
            tracing::error!(
                log = log.name(),
                error = %e,
                "Log descriptor does not fit the index codec"
            );
            return Err(e);
        }
        Ok(Shard { log, codec })
    }

    /// Sequence number the next word of this log gets.
    fn next_seq(&self) -> Result<u32> {
        match self.log.last_non_empty_block()? {
            None => Ok(0),
            Some(block) => Ok(self.codec.decode_last_word(&block.data)?.seq + 1),
        }
    }
}

pub struct Index<K, V> {
    config: IndexConfig,
    key_serializer: Arc<dyn Serializer<K>>,
    device_logs: Vec<Arc<Shard<V>>>,
    other_logs: Vec<Arc<Shard<V>>>,
    counters: Mutex<HashMap<String, u32>>,
}

impl<K, V> std::fmt::Debug for Index<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("qualifier", &self.config.qualifier)
            .field("device", &self.config.device)
            .field("logs", &self.log_names())
            .finish()
    }
}

impl<K, V> Index<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Opens (or creates) the device log under `config.dir` and, when
    /// enabled, the logs other devices left there.
    ///
    /// `codec` must be configured: its layout is used when the device log is
    /// created. Every log's stored descriptor must match its identity.
    pub fn open(
        config: IndexConfig,
        key_serializer: impl Serializer<K> + 'static,
        codec: WordCodec<V>,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir)?;

        let descriptor = codec.header()?;
        let block_size = config.words_per_block.max(1) * codec.word_size()?;
        let options = BlockFileOptions::new(block_size).sync_writes(config.sync_writes);
        let device_log: Arc<dyn BlockLog> =
            Arc::new(BlockFile::open(config.device_log_path(), &descriptor, options)?);

        let mut other_logs: Vec<Arc<dyn BlockLog>> = Vec::new();
        if config.scan_other_devices {
            for path in Self::other_device_paths(&config)? {
                let log = BlockFile::open_read_only(&path)?;
                if !codec.matches(log.descriptor()) {
                    tracing::warn!(
                        path = %path.display(),
                        "Skipping log written by another codec"
                    );
                    continue;
                }
                other_logs.push(Arc::new(log));
            }
        }

        Self::with_logs(config, key_serializer, codec, vec![device_log], other_logs)
    }

    fn other_device_paths(config: &IndexConfig) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&config.dir)? {
            let path = entry?.path();
            if config
                .device_of(&path)
                .is_some_and(|device| device != config.device)
            {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Builds an index over caller-supplied logs. New words go to the first
    /// of `device_logs`; `other_logs` are only scanned.
    pub fn with_logs(
        config: IndexConfig,
        key_serializer: impl Serializer<K> + 'static,
        codec: WordCodec<V>,
        device_logs: Vec<Arc<dyn BlockLog>>,
        other_logs: Vec<Arc<dyn BlockLog>>,
    ) -> Result<Self> {
        if device_logs.is_empty() {
            return Err(Error::InvalidInput("an index needs a device log".to_string()));
        }

        let shard = |log: Arc<dyn BlockLog>| Shard::new(log, &codec).map(Arc::new);
        let device_logs = device_logs.into_iter().map(shard).collect::<Result<Vec<_>>>()?;
        let other_logs = other_logs.into_iter().map(shard).collect::<Result<Vec<_>>>()?;

        let index = Index {
            config,
            key_serializer: Arc::new(key_serializer),
            device_logs,
            other_logs,
            counters: Mutex::new(HashMap::new()),
        };
        index.preload()?;
        Ok(index)
    }
}

impl<K, V> Index<K, V> {
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn log_names(&self) -> Vec<&str> {
        self.shards().map(|shard| shard.log.name()).collect()
    }

    fn shards(&self) -> impl Iterator<Item = &Arc<Shard<V>>> {
        self.device_logs.iter().chain(self.other_logs.iter())
    }

    /// Rebuilds every per-log counter from the last word of the log.
    fn preload(&self) -> Result<()> {
        let mut counters = self.counters.lock()?;
        for shard in self.shards() {
            let next = shard.next_seq()?;
            tracing::debug!(log = shard.log.name(), next_seq = next, "Rebuilt log counter");
            counters.insert(shard.log.name().to_string(), next);
        }

        tracing::info!(
            index = %self.config.qualifier,
            device = %self.config.device,
            logs = counters.len(),
            words = counters.values().map(|c| *c as u64).sum::<u64>(),
            "Index loaded"
        );
        Ok(())
    }

    /// Log receiving the next word. A single device log for now.
    fn select_device_log(&self, _state: &State) -> &Arc<Shard<V>> {
        &self.device_logs[0]
    }

    /// Appends one word. Nothing is written when the key, state or value
    /// does not fit the layout.
    pub fn add(&self, state: &State, key: &K, value: &V) -> Result<()> {
        let shard = self.select_device_log(state);
        let key = serialize_key(self.key_serializer.as_ref(), key, shard.codec.key_size()?)?;
        let name = shard.log.name();

        let mut counters = self.counters.lock()?;
        let seq = counters.get(name).copied().unwrap_or(0);
        let word = shard.codec.encode(seq, state, &key, value)?;
        shard.log.write(&word)?;
        counters.insert(name.to_string(), seq + 1);
        Ok(())
    }

    /// Words held by all logs, from the counters alone.
    pub fn count(&self) -> Result<usize> {
        let counters = self.counters.lock()?;
        Ok(counters.values().map(|c| *c as usize).sum())
    }

    fn scan(&self, order: Order) -> (WordScan<V>, ScanErrors) {
        let (sink, errors) = ScanErrors::channel();
        let shards = self.shards().cloned().collect();
        (WordScan::new(shards, order, sink), errors)
    }

    /// The query key serialized for every distinct key size among the logs.
    fn query_keys(&self, key: &K) -> Result<Vec<Vec<u8>>> {
        let mut keys: Vec<Vec<u8>> = Vec::new();
        for shard in self.shards() {
            let size = shard.codec.key_size()?;
            if keys.iter().all(|k| k.len() != size) {
                keys.push(serialize_key(self.key_serializer.as_ref(), key, size)?);
            }
        }
        Ok(keys)
    }
}

/// Outcome of looking at one word during a scan.
enum Selection<K> {
    Skip,
    Take(Result<K>),
}

impl<K, V> Index<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Runs a scan on the blocking pool, pushing the words `select` takes.
    fn paginate_with<F>(
        &self,
        order: Order,
        page_size: usize,
        mut select: F,
    ) -> (Paginer<K, V>, ScanErrors)
    where
        F: FnMut(&Word<V>, &StopSignal) -> Selection<K> + Send + 'static,
    {
        let (words, errors) = self.scan(order);
        let page_size = self.config.effective_page_size(page_size);

        let paginer = Paginer::new(page_size, self.config.preload_pages, move |pusher| {
            let stop = StopSignal::new();
            for word in words {
                if let Selection::Take(key) = select(&word, &stop) {
                    let entry = key.map(|key| Entry {
                        state: word.state,
                        key,
                        value: word.value,
                    });
                    if !pusher.push(entry) {
                        tracing::debug!("Scan ended by its cursor");
                        return;
                    }
                }
                if stop.is_stopped() {
                    tracing::debug!("Scan stopped by filter");
                    return;
                }
            }
        });
        (paginer, errors)
    }

    fn key_matcher(&self, key: &K) -> Result<impl Fn(&[u8]) -> bool + Send + 'static> {
        let keys = self.query_keys(key)?;
        Ok(move |candidate: &[u8]| keys.iter().any(|k| k.as_slice() == candidate))
    }

    /// Every word whose key equals `key`, in `order`. A `page_size` of 0
    /// uses the configured one.
    ///
    /// # Panics
    ///
    /// When called outside a Tokio runtime.
    pub fn paginate(
        &self,
        key: &K,
        order: Order,
        page_size: usize,
    ) -> Result<(Paginer<K, V>, ScanErrors)> {
        let matches = self.key_matcher(key)?;
        let serializer = Arc::clone(&self.key_serializer);
        Ok(self.paginate_with(order, page_size, move |word, _| {
            if matches(&word.key) {
                Selection::Take(serializer.deserialize(&word.key))
            } else {
                Selection::Skip
            }
        }))
    }

    /// Every word, in `order`.
    ///
    /// # Panics
    ///
    /// When called outside a Tokio runtime.
    pub fn paginate_all(&self, order: Order, page_size: usize) -> (Paginer<K, V>, ScanErrors) {
        let serializer = Arc::clone(&self.key_serializer);
        self.paginate_with(order, page_size, move |word, _| {
            Selection::Take(serializer.deserialize(&word.key))
        })
    }

    /// Words with key `key` whose state passes `state_filter`.
    ///
    /// # Panics
    ///
    /// When called outside a Tokio runtime.
    pub fn filter<S>(
        &self,
        key: &K,
        order: Order,
        page_size: usize,
        mut state_filter: S,
    ) -> Result<(Paginer<K, V>, ScanErrors)>
    where
        S: FnMut(&State, &StopSignal) -> bool + Send + 'static,
    {
        let matches = self.key_matcher(key)?;
        let serializer = Arc::clone(&self.key_serializer);
        Ok(self.paginate_with(order, page_size, move |word, stop| {
            if matches(&word.key) && state_filter(&word.state, stop) {
                Selection::Take(serializer.deserialize(&word.key))
            } else {
                Selection::Skip
            }
        }))
    }

    /// Words whose state passes `state_filter` and whose decoded key then
    /// passes `key_filter`.
    ///
    /// # Panics
    ///
    /// When called outside a Tokio runtime.
    pub fn filter_all<S, F>(
        &self,
        order: Order,
        page_size: usize,
        mut state_filter: S,
        mut key_filter: F,
    ) -> (Paginer<K, V>, ScanErrors)
    where
        S: FnMut(&State, &StopSignal) -> bool + Send + 'static,
        F: FnMut(&K, &State, &StopSignal) -> bool + Send + 'static,
    {
        let serializer = Arc::clone(&self.key_serializer);
        self.paginate_with(order, page_size, move |word, stop| {
            if !state_filter(&word.state, stop) {
                return Selection::Skip;
            }
            match serializer.deserialize(&word.key) {
                Ok(key) if key_filter(&key, &word.state, stop) => Selection::Take(Ok(key)),
                Ok(_) => Selection::Skip,
                Err(e) => Selection::Take(Err(e)),
            }
        })
    }

    /// Lazily decoded `(key, value)` stream with `preload` pairs read ahead.
    ///
    /// Words whose key cannot be decoded are skipped and reported. Blocks
    /// are always read on the blocking pool, so a `preload` of 0 still
    /// reads one pair ahead.
    ///
    /// # Panics
    ///
    /// When called outside a Tokio runtime.
    pub fn all(&self, order: Order, preload: usize) -> (Loader<(K, V)>, ScanErrors) {
        let (words, errors) = self.scan(order);
        let serializer = Arc::clone(&self.key_serializer);
        let sink: ErrorSink = words.errors().clone();

        let pairs = words.filter_map(move |word| match serializer.deserialize(&word.key) {
            Ok(key) => Some((key, word.value)),
            Err(e) => {
                tracing::warn!(seq = word.seq, error = %e, "Skipping word with undecodable key");
                sink.report(e);
                None
            }
        });
        (Loader::eager2(pairs, preload.max(1)), errors)
    }
}
