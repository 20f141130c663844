//! Bounded look-ahead over a lazy sequence.
//!
//! An eager loader pulls from its source on the blocking pool so that up to
//! `count` items are ready before the consumer asks. A lazy loader waits for
//! the first [`Loader::next`] before starting. With `count == 0` the source is
//! pulled in place, with no background task.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Polling period of a paused producer.
pub const LOADER_PAUSE_INTERVAL: Duration = Duration::from_millis(100);

type Source<T> = Box<dyn Iterator<Item = T> + Send>;
type Pause<T> = Box<dyn FnMut(&T) -> bool + Send>;

enum Stage<T> {
    Passthrough(Source<T>),
    Pending {
        source: Source<T>,
        count: usize,
        pause: Option<Pause<T>>,
    },
    Running(mpsc::Receiver<T>),
    Done,
}

pub struct Loader<T> {
    stage: Stage<T>,
}

impl<T: Send + 'static> Loader<T> {
    /// Eager when `lazy` is false, lazy otherwise.
    pub fn new<I>(source: I, count: usize, lazy: bool) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::build(Box::new(source.into_iter()), count, None, lazy)
    }

    /// Starts pulling right away. Must be called within a Tokio runtime.
    pub fn eager<I>(source: I, count: usize) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(source, count, false)
    }

    /// Starts pulling on the first [`Loader::next`].
    pub fn lazy<I>(source: I, count: usize) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(source, count, true)
    }

    /// Like [`Loader::eager`], but after every item for which `pause` is true
    /// the producer waits until the consumer has drained the queue.
    pub fn pausing_eager<I, P>(source: I, count: usize, pause: P) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        Self::build(Box::new(source.into_iter()), count, Some(Box::new(pause)), false)
    }

    pub fn pausing_lazy<I, P>(source: I, count: usize, pause: P) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        Self::build(Box::new(source.into_iter()), count, Some(Box::new(pause)), true)
    }

    fn build(source: Source<T>, count: usize, pause: Option<Pause<T>>, lazy: bool) -> Self {
        if count == 0 {
            return Loader {
                stage: Stage::Passthrough(source),
            };
        }
        let stage = if lazy {
            Stage::Pending {
                source,
                count,
                pause,
            }
        } else {
            Stage::Running(spawn_producer(source, count, pause))
        };
        Loader { stage }
    }

    /// Next item of the source, `None` once it is exhausted.
    pub async fn next(&mut self) -> Option<T> {
        if matches!(self.stage, Stage::Pending { .. }) {
            if let Stage::Pending {
                source,
                count,
                pause,
            } = std::mem::replace(&mut self.stage, Stage::Done)
            {
                self.stage = Stage::Running(spawn_producer(source, count, pause));
            }
        }

        let item = match &mut self.stage {
            Stage::Passthrough(source) => source.next(),
            Stage::Running(rx) => rx.recv().await,
            Stage::Pending { .. } | Stage::Done => None,
        };
        if item.is_none() {
            self.stage = Stage::Done;
        }
        item
    }

    /// Drains the remaining items.
    pub async fn collect(mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }
}

impl<K, V> Loader<(K, V)>
where
    K: Send + 'static,
    V: Send + 'static,
{
    pub fn eager2<I>(source: I, count: usize) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: Send + 'static,
    {
        Self::eager(source, count)
    }

    pub fn lazy2<I>(source: I, count: usize) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: Send + 'static,
    {
        Self::lazy(source, count)
    }

    pub fn pausing_eager2<I, P>(source: I, count: usize, mut pause: P) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: Send + 'static,
        P: FnMut(&K, &V) -> bool + Send + 'static,
    {
        Self::pausing_eager(source, count, move |(k, v): &(K, V)| pause(k, v))
    }

    pub fn pausing_lazy2<I, P>(source: I, count: usize, mut pause: P) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: Send + 'static,
        P: FnMut(&K, &V) -> bool + Send + 'static,
    {
        Self::pausing_lazy(source, count, move |(k, v): &(K, V)| pause(k, v))
    }
}

fn spawn_producer<T: Send + 'static>(
    mut source: Source<T>,
    count: usize,
    mut pause: Option<Pause<T>>,
) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(count);
    let handle = Handle::current();

    tokio::task::spawn_blocking(move || loop {
        // A slot is reserved before pulling so that at most `count` items
        // are taken from the source ahead of the consumer.
        let Ok(permit) = handle.block_on(tx.reserve()) else {
            return;
        };
        let Some(item) = source.next() else {
            return;
        };
        let paused = pause.as_mut().is_some_and(|pause| pause(&item));
        permit.send(item);

        if paused {
            while tx.capacity() < tx.max_capacity() {
                if tx.is_closed() {
                    return;
                }
                tracing::trace!(queued = tx.max_capacity() - tx.capacity(), "Loader paused");
                std::thread::sleep(LOADER_PAUSE_INTERVAL);
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Yields 0..n and records how many items were pulled.
    fn tracked(n: usize) -> (impl Iterator<Item = usize> + Send + 'static, Arc<AtomicUsize>) {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let iter = (0..n).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (iter, pulled)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_passthrough_pulls_on_demand() {
        let (iter, pulled) = tracked(10);
        let mut loader = Loader::eager(iter, 0);
        settle().await;
        assert_eq!(pulled.load(Ordering::SeqCst), 0);

        assert_eq!(loader.next().await, Some(0));
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert_eq!(loader.collect().await, (1..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_eager_pulls_count_ahead() {
        for count in [1, 5] {
            let (iter, pulled) = tracked(100);
            let mut loader = Loader::eager(iter, count);
            settle().await;
            assert_eq!(pulled.load(Ordering::SeqCst), count);

            assert_eq!(loader.next().await, Some(0));
            settle().await;
            assert_eq!(pulled.load(Ordering::SeqCst), count + 1);
        }
    }

    #[tokio::test]
    async fn test_eager_keeps_order() {
        let loader = Loader::eager(0..1000, 7);
        assert_eq!(loader.collect().await, (0..1000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_lazy_waits_for_first_next() {
        let (iter, pulled) = tracked(10);
        let mut loader = Loader::lazy(iter, 3);
        settle().await;
        assert_eq!(pulled.load(Ordering::SeqCst), 0);

        assert_eq!(loader.next().await, Some(0));
        settle().await;
        assert_eq!(pulled.load(Ordering::SeqCst), 4);
        assert_eq!(loader.collect().await, (1..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pausing_eager_waits_for_drain() {
        let (iter, pulled) = tracked(10);
        let mut loader = Loader::pausing_eager(iter, 5, |item: &usize| *item == 1);
        settle().await;
        // Paused after item 1 with two items queued.
        assert_eq!(pulled.load(Ordering::SeqCst), 2);

        assert_eq!(loader.next().await, Some(0));
        assert_eq!(loader.next().await, Some(1));
        tokio::time::sleep(LOADER_PAUSE_INTERVAL * 3).await;
        assert_eq!(pulled.load(Ordering::SeqCst), 7);
        assert_eq!(loader.collect().await, (2..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pair_variants() {
        let pairs = vec![("a", 1), ("b", 2), ("c", 3)];
        let loader = Loader::eager2(pairs.clone(), 2);
        assert_eq!(loader.collect().await, pairs);

        let loader = Loader::lazy2(pairs.clone(), 0);
        assert_eq!(loader.collect().await, pairs);

        let loader = Loader::pausing_lazy2(pairs.clone(), 1, |k: &&str, _v: &i32| *k == "a");
        assert_eq!(loader.collect().await, pairs);

        let loader = Loader::pausing_eager2(pairs.clone(), 3, |_k: &&str, v: &i32| *v > 1);
        assert_eq!(loader.collect().await, pairs);
    }

    #[tokio::test]
    async fn test_exhausted_loader_stays_exhausted() {
        let mut loader = Loader::eager(vec![1], 1);
        assert_eq!(loader.next().await, Some(1));
        assert_eq!(loader.next().await, None);
        assert_eq!(loader.next().await, None);
    }
}
