use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::Shard;
use crate::block::Blocks;
use crate::codec::Word;
use crate::error::Result;
use crate::types::Order;
use crate::Error;

/// Side channel collecting the errors a scan ran into without stopping.
///
/// Undecodable words and unreadable blocks land here; the cursor itself only
/// carries errors that end the scan.
#[derive(Debug)]
pub struct ScanErrors {
    rx: mpsc::UnboundedReceiver<Error>,
}

#[derive(Debug, Clone)]
pub(crate) struct ErrorSink {
    tx: mpsc::UnboundedSender<Error>,
}

impl ErrorSink {
    pub(crate) fn report(&self, error: Error) {
        // A dropped receiver means nobody listens; the error is already logged.
        let _ = self.tx.send(error);
    }
}

impl ScanErrors {
    pub(crate) fn channel() -> (ErrorSink, ScanErrors) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ErrorSink { tx }, ScanErrors { rx })
    }

    /// Errors reported so far, without waiting.
    pub fn drain(&mut self) -> Vec<Error> {
        let mut errors = Vec::new();
        while let Ok(error) = self.rx.try_recv() {
            errors.push(error);
        }
        errors
    }

    /// Next error, or `None` once the scan is over and every error was read.
    pub async fn recv(&mut self) -> Option<Error> {
        self.rx.recv().await
    }

    /// Waits for the scan to end and folds its errors into one result.
    ///
    /// Call it once the cursor is consumed, closed or dropped; a scan blocked
    /// on a full cursor never ends.
    pub async fn finish(mut self) -> Result<()> {
        let mut errors = Vec::new();
        while let Some(error) = self.rx.recv().await {
            errors.push(error);
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregated(errors)),
        }
    }
}

/// Pull-style walk over every word of a set of logs.
///
/// Blocks are read lazily, one at a time, and decoded in the scan order.
pub(crate) struct WordScan<V> {
    shards: VecDeque<Arc<Shard<V>>>,
    order: Order,
    current: Option<(Arc<Shard<V>>, Blocks)>,
    words: VecDeque<Word<V>>,
    errors: ErrorSink,
}

impl<V> WordScan<V> {
    /// `shards` are given top to bottom; a bottom-to-top scan walks them
    /// backwards.
    pub(crate) fn new(shards: Vec<Arc<Shard<V>>>, order: Order, errors: ErrorSink) -> Self {
        let shards = match order {
            Order::TopToBottom => shards.into_iter().collect(),
            Order::BottomToTop => shards.into_iter().rev().collect(),
        };
        WordScan {
            shards,
            order,
            current: None,
            words: VecDeque::new(),
            errors,
        }
    }

    pub(crate) fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Decodes the next non-empty block into `words`. `false` once every log
    /// is exhausted.
    fn fill(&mut self) -> bool {
        loop {
            let Some((shard, blocks)) = self.current.as_mut() else {
                let Some(shard) = self.shards.pop_front() else {
                    return false;
                };
                match shard.log.blocks(self.order) {
                    Ok(blocks) => self.current = Some((shard, blocks)),
                    Err(e) => {
                        tracing::error!(
                            log = shard.log.name(),
                            error = %e,
                            "Failed to list blocks"
                        );
                        self.errors.report(e);
                    }
                }
                continue;
            };

            match blocks.next() {
                Some(Ok(block)) => {
                    let words = &mut self.words;
                    let errors = &self.errors;
                    let log = shard.log.name();
                    // Undecodable words are skipped, never ending the block.
                    let flow = shard.codec.decode_all(self.order, &block.data, |word| {
                        match word {
                            Ok(word) => words.push_back(word),
                            Err(e) => {
                                tracing::warn!(
                                    log,
                                    block = block.id,
                                    error = %e,
                                    "Skipping undecodable word"
                                );
                                errors.report(e);
                            }
                        }
                        ControlFlow::Continue(())
                    });
                    debug_assert!(flow.is_continue());
                    if !self.words.is_empty() {
                        return true;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(
                        log = shard.log.name(),
                        error = %e,
                        "Block read failed, skipping rest of log"
                    );
                    self.errors.report(e);
                    self.current = None;
                }
                None => self.current = None,
            }
        }
    }
}

impl<V> Iterator for WordScan<V> {
    type Item = Word<V>;

    fn next(&mut self) -> Option<Word<V>> {
        if self.words.is_empty() && !self.fill() {
            return None;
        }
        self.words.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockLog, MemoryLog};
    use crate::codec::{Identity, Layout, WordCodec, ASCII_EUID};
    use crate::serialize::AsciiSerializer;
    use crate::types::State;

    fn codec() -> WordCodec<String> {
        WordCodec::new(
            Identity::new(ASCII_EUID, 0),
            Layout::new(4, 4, 8),
            AsciiSerializer,
        )
    }

    fn shard(name: &str, values: &[&str]) -> Arc<Shard<String>> {
        let codec = codec();
        let log = MemoryLog::new(name, codec.header().unwrap(), codec.word_size().unwrap() * 2);
        let state = State::build(4, "st").unwrap();
        for (seq, value) in values.iter().enumerate() {
            let word = codec
                .encode(seq as u32, &state, b"k", &value.to_string())
                .unwrap();
            log.write(&word).unwrap();
        }
        Arc::new(Shard::new(Arc::new(log), &codec).unwrap())
    }

    fn values(scan: WordScan<String>) -> Vec<String> {
        scan.map(|word| word.value).collect()
    }

    #[tokio::test]
    async fn test_scan_orders() {
        let shards = vec![shard("a", &["1", "2", "3"]), shard("b", &["4", "5"])];

        let (sink, _errors) = ScanErrors::channel();
        let scan = WordScan::new(shards.clone(), Order::TopToBottom, sink);
        assert_eq!(values(scan), vec!["1", "2", "3", "4", "5"]);

        let (sink, _errors) = ScanErrors::channel();
        let scan = WordScan::new(shards, Order::BottomToTop, sink);
        assert_eq!(values(scan), vec!["5", "4", "3", "2", "1"]);
    }

    struct BrokenLog {
        inner: MemoryLog,
    }

    impl BlockLog for BrokenLog {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn descriptor(&self) -> &[u8] {
            self.inner.descriptor()
        }

        fn write(&self, data: &[u8]) -> Result<u64> {
            self.inner.write(data)
        }

        fn blocks(&self, order: Order) -> Result<Blocks> {
            let mut blocks = self.inner.blocks(order)?;
            let first = blocks.next();
            let failing = std::iter::once(Err(Error::ChecksumMismatch));
            Ok(Box::new(first.into_iter().chain(failing).chain(blocks)))
        }

        fn last_non_empty_block(&self) -> Result<Option<Block>> {
            self.inner.last_non_empty_block()
        }
    }

    #[tokio::test]
    async fn test_block_error_ends_log_traversal() {
        let codec = codec();
        let memory = MemoryLog::new("broken", codec.header().unwrap(), codec.word_size().unwrap());
        let state = State::build(4, "st").unwrap();
        for (seq, value) in ["x", "y", "z"].iter().enumerate() {
            memory
                .write(&codec.encode(seq as u32, &state, b"k", &value.to_string()).unwrap())
                .unwrap();
        }
        let broken = Arc::new(Shard::new(Arc::new(BrokenLog { inner: memory }), &codec).unwrap());
        let healthy = shard("ok", &["1"]);

        let (sink, mut errors) = ScanErrors::channel();
        let scan = WordScan::new(vec![broken, healthy], Order::TopToBottom, sink);
        assert_eq!(values(scan), vec!["x", "1"]);

        let reported = errors.drain();
        assert_eq!(reported.len(), 1);
        assert!(matches!(reported[0], Error::ChecksumMismatch));
    }

    #[tokio::test]
    async fn test_undecodable_words_are_reported() {
        let codec = codec();
        let log = MemoryLog::new("bad", codec.header().unwrap(), 1024);
        let state = State::build(4, "st").unwrap();
        log.write(&codec.encode(0, &state, b"k", &"good".to_string()).unwrap())
            .unwrap();
        let mut corrupt = codec.encode(1, &state, b"k", &"bad".to_string()).unwrap();
        corrupt[12..16].copy_from_slice(&500u32.to_be_bytes());
        log.write(&corrupt).unwrap();
        log.write(&codec.encode(2, &state, b"k", &"good2".to_string()).unwrap())
            .unwrap();

        let shard = Arc::new(Shard::new(Arc::new(log), &codec).unwrap());
        let (sink, errors) = ScanErrors::channel();
        let scan = WordScan::new(vec![shard], Order::TopToBottom, sink);
        assert_eq!(values(scan), vec!["good", "good2"]);

        assert!(matches!(
            errors.finish().await,
            Err(Error::BadValueLength(500, 8))
        ));
    }

    #[tokio::test]
    async fn test_finish_aggregates() {
        let (sink, errors) = ScanErrors::channel();
        sink.report(Error::ChecksumMismatch);
        sink.report(Error::NotAscii);
        drop(sink);
        match errors.finish().await {
            Err(Error::Aggregated(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }

        let (sink, errors) = ScanErrors::channel();
        drop(sink);
        errors.finish().await.unwrap();
    }
}
