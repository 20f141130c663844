use std::cell::Cell;
use std::fmt;

use crate::error::Result;
use crate::Error;

/// Traversal direction over blocks and the words inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Oldest to newest.
    #[default]
    TopToBottom,
    /// Newest to oldest.
    BottomToTop,
}

impl Order {
    pub fn reverse(self) -> Self {
        match self {
            Order::TopToBottom => Order::BottomToTop,
            Order::BottomToTop => Order::TopToBottom,
        }
    }
}

/// Fixed-length tag attached to every word.
///
/// All states written through one index share the same length, the index
/// codec's `state_size`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State(Vec<u8>);

impl State {
    /// Left-justifies `tag` into a zero-padded buffer of `size` bytes.
    pub fn build(size: usize, tag: &str) -> Result<Self> {
        if tag.len() > size {
            return Err(Error::StateSizeMismatch(tag.len(), size));
        }
        let mut data = vec![0u8; size];
        data[..tag.len()].copy_from_slice(tag.as_bytes());
        Ok(State(data))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        State(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// The tag with its zero padding stripped.
    pub fn tag(&self) -> &[u8] {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        &self.0[..end]
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State({:?})", String::from_utf8_lossy(self.tag()))
    }
}

impl AsRef<[u8]> for State {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Handed to scan filters so they can end the whole scan early.
///
/// The word being filtered when `stop` is called is still accepted or
/// rejected by the filter's return value; no further word is examined.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Cell<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

pub type StateFilter = Box<dyn FnMut(&State, &StopSignal) -> bool + Send>;
pub type KeyFilter<K> = Box<dyn FnMut(&K, &State, &StopSignal) -> bool + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_state_pads_with_zeros() {
        let state = State::build(8, "dump").unwrap();
        assert_eq!(state.as_bytes(), b"dump\0\0\0\0");
        assert_eq!(state.len(), 8);
        assert_eq!(state.tag(), b"dump");
    }

    #[test]
    fn test_build_state_too_long() {
        let result = State::build(3, "document");
        assert!(matches!(result, Err(Error::StateSizeMismatch(8, 3))));
    }

    #[test]
    fn test_states_compare_by_bytes() {
        let a = State::build(10, "lyr").unwrap();
        let b = State::build(10, "lyrSnap").unwrap();
        assert_ne!(a, b);
        assert!(b.starts_with(b"lyr"));
        assert_eq!(a, State::from_bytes(b"lyr\0\0\0\0\0\0\0".to_vec()));
    }

    #[test]
    fn test_stop_signal() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopped());
        stop.stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_order_reverse() {
        assert_eq!(Order::TopToBottom.reverse(), Order::BottomToTop);
        assert_eq!(Order::BottomToTop.reverse(), Order::TopToBottom);
    }
}
