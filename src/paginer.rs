//! Page-oriented cursor over a push-style producer.
//!
//! The producer runs on the blocking pool and pushes entries into a bounded
//! queue; the consumer pulls whole pages. A full queue blocks the producer,
//! and a closed cursor makes its next push return `false`.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::State;
use crate::Error;

/// One accepted word of a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<K, V> {
    pub state: State,
    pub key: K,
    pub value: V,
}

/// Immutable slice of a scan's results.
#[derive(Debug)]
pub struct Page<K, V> {
    number: usize,
    size: usize,
    entries: Vec<Entry<K, V>>,
    error: Option<Arc<Error>>,
}

impl<K, V> Page<K, V> {
    /// 0-based position of the page in the scan.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Target size the page was built with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of entries actually held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry<K, V>] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry<K, V>> {
        self.entries.iter()
    }

    /// Error that ended the scan while this page was being built.
    pub fn error(&self) -> Option<&Arc<Error>> {
        self.error.as_ref()
    }
}

impl<'a, K, V> IntoIterator for &'a Page<K, V> {
    type Item = &'a Entry<K, V>;
    type IntoIter = std::slice::Iter<'a, Entry<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Producer side of a [`Paginer`].
pub struct Pusher<K, V> {
    tx: mpsc::Sender<Result<Entry<K, V>>>,
}

impl<K, V> Pusher<K, V> {
    /// Queues `item`, blocking while the queue is full.
    ///
    /// Returns whether the producer should go on: `false` once the cursor is
    /// closed or after pushing an error. Must not be called from async code.
    pub fn push(&self, item: Result<Entry<K, V>>) -> bool {
        let ok = item.is_ok();
        self.tx.blocking_send(item).is_ok() && ok
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What [`Paginer::next`] and [`Paginer::prev`] return: the page, whether
/// another page exists in that direction, and the page's error if any.
pub type PageResult<K, V> = (Arc<Page<K, V>>, bool, Option<Arc<Error>>);

pub struct Paginer<K, V> {
    page_size: usize,
    rx: mpsc::Receiver<Result<Entry<K, V>>>,
    loaded: Vec<Arc<Page<K, V>>>,
    current: Option<usize>,
    end_reached: bool,
    closed: bool,
}

impl<K, V> Paginer<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Starts `producer` on the blocking pool. Up to
    /// `page_size * preload_pages` entries are queued ahead of the reader.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<F>(page_size: usize, preload_pages: usize, producer: F) -> Self
    where
        F: FnOnce(Pusher<K, V>) + Send + 'static,
    {
        let page_size = page_size.max(1);
        let capacity = (page_size * preload_pages).max(1);
        let (tx, rx) = mpsc::channel(capacity);

        tokio::task::spawn_blocking(move || producer(Pusher { tx }));

        Paginer {
            page_size,
            rx,
            loaded: Vec::new(),
            current: None,
            end_reached: false,
            closed: false,
        }
    }
}

impl<K, V> Paginer<K, V> {
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether [`Paginer::next`] may be called.
    pub fn has_next(&self) -> bool {
        match self.current {
            None => true,
            Some(current) => current + 1 < self.loaded.len(),
        }
    }

    /// Whether [`Paginer::prev`] may be called.
    pub fn has_prev(&self) -> bool {
        self.current.is_some_and(|current| current > 0)
    }

    /// Moves to the next page and reads one page ahead.
    ///
    /// # Panics
    ///
    /// When the previous call reported no further page.
    pub async fn next(&mut self) -> PageResult<K, V> {
        let next = self.current.map_or(0, |current| current + 1);

        if self.loaded.is_empty() {
            // The first page exists even when the scan yields nothing.
            let first = self.build_page(0).await.unwrap_or_else(|| self.empty_page(0));
            self.loaded.push(Arc::new(first));
        }
        if next >= self.loaded.len() {
            panic!("next page does not exist (current page: {:?})", self.current);
        }
        self.current = Some(next);

        if next + 1 == self.loaded.len() {
            if let Some(ahead) = self.build_page(next + 1).await {
                if !ahead.is_empty() || ahead.error.is_some() {
                    self.loaded.push(Arc::new(ahead));
                }
            }
        }

        let page = Arc::clone(&self.loaded[next]);
        let error = page.error.clone();
        (page, next + 1 < self.loaded.len(), error)
    }

    /// Moves back to an already built page.
    ///
    /// # Panics
    ///
    /// When the cursor is on the first page or before it.
    pub fn prev(&mut self) -> PageResult<K, V> {
        let current = match self.current {
            Some(current) if current > 0 => current - 1,
            _ => panic!("previous page does not exist"),
        };
        self.current = Some(current);

        let page = Arc::clone(&self.loaded[current]);
        let error = page.error.clone();
        (page, current > 0, error)
    }

    /// Drives [`Paginer::next`] until the last page or until `visit` breaks.
    pub async fn all<F>(&mut self, mut visit: F)
    where
        F: FnMut(Option<Arc<Error>>, Arc<Page<K, V>>) -> ControlFlow<()>,
    {
        while self.has_next() {
            let (page, more, error) = self.next().await;
            if visit(error, page).is_break() || !more {
                break;
            }
        }
    }

    /// Stops the producer at its next push. Queued entries stay readable.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rx.close();
            tracing::debug!(pages = self.loaded.len(), "Cursor closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn empty_page(&self, number: usize) -> Page<K, V> {
        Page {
            number,
            size: self.page_size,
            entries: Vec::new(),
            error: None,
        }
    }

    async fn build_page(&mut self, number: usize) -> Option<Page<K, V>> {
        if self.end_reached {
            return None;
        }

        let mut page = self.empty_page(number);
        while page.entries.len() < self.page_size {
            match self.rx.recv().await {
                Some(Ok(entry)) => page.entries.push(entry),
                Some(Err(e)) => {
                    page.error = Some(Arc::new(e));
                    break;
                }
                None => break,
            }
        }

        self.end_reached = page.entries.len() < self.page_size || page.error.is_some();
        Some(page)
    }
}
