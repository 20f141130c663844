use std::io::Cursor;
use std::ops::ControlFlow;
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::header::Header;
use super::{Identity, Layout};
use crate::error::Result;
use crate::serialize::Serializer;
use crate::types::{Order, State};
use crate::Error;

/// One decoded word.
#[derive(Debug, Clone, PartialEq)]
pub struct Word<V> {
    pub seq: u32,
    pub state: State,
    /// The whole key region, zero padding included.
    pub key: Vec<u8>,
    pub value: V,
}

/// Encodes and decodes words of one layout, values going through a
/// pluggable serializer.
pub struct WordCodec<V> {
    identity: Identity,
    layout: Option<Layout>,
    serializer: Arc<dyn Serializer<V>>,
}

impl<V> Clone for WordCodec<V> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity,
            layout: self.layout,
            serializer: Arc::clone(&self.serializer),
        }
    }
}

impl<V> std::fmt::Debug for WordCodec<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordCodec")
            .field("identity", &self.identity)
            .field("layout", &self.layout)
            .finish()
    }
}

impl<V> WordCodec<V> {
    pub fn new(
        identity: Identity,
        layout: Layout,
        serializer: impl Serializer<V> + 'static,
    ) -> Self {
        Self {
            identity,
            layout: Some(layout),
            serializer: Arc::new(serializer),
        }
    }

    /// A codec that only knows its identity. Encoding and decoding fail with
    /// [`Error::CodecNotConfigured`] until [`WordCodec::setup`] succeeds.
    pub fn unconfigured(identity: Identity, serializer: impl Serializer<V> + 'static) -> Self {
        Self {
            identity,
            layout: None,
            serializer: Arc::new(serializer),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn is_configured(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> Result<Layout> {
        self.layout.ok_or(Error::CodecNotConfigured)
    }

    pub fn word_size(&self) -> Result<usize> {
        Ok(self.layout()?.word_size())
    }

    pub fn key_size(&self) -> Result<usize> {
        Ok(self.layout()?.key_size)
    }

    /// Format descriptor for this codec, `max(word_size, 24)` bytes long.
    pub fn header(&self) -> Result<Vec<u8>> {
        Header::new(self.identity, self.layout()?).encode()
    }

    /// True iff `header` carries this codec's type tag and version.
    pub fn matches(&self, header: &[u8]) -> bool {
        Header::peek_identity(header).is_some_and(|identity| identity == self.identity)
    }

    /// Adopts the region sizes of a matching header.
    pub fn setup(&mut self, header: &[u8]) -> Result<()> {
        if !self.matches(header) {
            return Err(Error::NotMatchingEncoder);
        }
        let header = Header::try_from(header)?;
        self.layout = Some(header.layout);
        Ok(())
    }

    pub fn encode(&self, seq: u32, state: &State, key: &[u8], value: &V) -> Result<Vec<u8>> {
        let layout = self.layout()?;
        if state.len() != layout.state_size {
            return Err(Error::StateSizeMismatch(state.len(), layout.state_size));
        }
        if key.len() > layout.key_size {
            return Err(Error::KeyTooLong(key.len(), layout.key_size));
        }

        let mut buf = vec![0u8; layout.word_size()];

        let value_region = &mut buf[layout.value_offset()..];
        let value_len = self.serializer.serialize(value, value_region)?;
        if value_len > layout.val_size {
            return Err(Error::ValueTooLong(value_len, layout.val_size));
        }

        (&mut buf[0..4])
            .write_u32::<BigEndian>(seq)
            .map_err(|e| Error::Encode("seq", e))?;

        buf[4..layout.key_offset()].copy_from_slice(state.as_bytes());

        // The key region sits at a fixed offset; a short key is zero-padded.
        let key_offset = layout.key_offset();
        buf[key_offset..key_offset + key.len()].copy_from_slice(key);

        (&mut buf[layout.value_len_offset()..layout.value_offset()])
            .write_u32::<BigEndian>(value_len as u32)
            .map_err(|e| Error::Encode("value length", e))?;

        Ok(buf)
    }

    /// Decodes the first word of `buf`.
    pub fn decode(&self, buf: &[u8]) -> Result<Word<V>> {
        let layout = self.layout()?;
        let word_size = layout.word_size();
        if buf.len() < word_size {
            return Err(Error::ShortWord(buf.len(), word_size));
        }

        let mut cursor = Cursor::new(&buf[..4]);
        let seq = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| Error::Decode("seq", e))?;

        let state = State::from_bytes(&buf[4..layout.key_offset()]);
        let key = buf[layout.key_offset()..layout.value_len_offset()].to_vec();

        let mut cursor = Cursor::new(&buf[layout.value_len_offset()..layout.value_offset()]);
        let value_len = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| Error::Decode("value length", e))?;
        if value_len as usize > layout.val_size {
            return Err(Error::BadValueLength(value_len, layout.val_size));
        }

        let start = layout.value_offset();
        let value = self
            .serializer
            .deserialize(&buf[start..start + value_len as usize])?;

        Ok(Word {
            seq,
            state,
            key,
            value,
        })
    }

    /// Decodes the last whole word of `buf`.
    pub fn decode_last_word(&self, buf: &[u8]) -> Result<Word<V>> {
        let word_size = self.word_size()?;
        let count = buf.len() / word_size;
        if count == 0 {
            return Err(Error::ShortWord(buf.len(), word_size));
        }
        let start = (count - 1) * word_size;
        self.decode(&buf[start..start + word_size])
    }

    /// Decodes every whole word of `buf` in `order`.
    ///
    /// Per-word failures are handed to `visit` and the walk goes on; only a
    /// `Break` from the visitor ends it early. Trailing bytes too short for a
    /// word are reported once as [`Error::ShortWord`].
    pub fn decode_all<F>(&self, order: Order, buf: &[u8], mut visit: F) -> ControlFlow<()>
    where
        F: FnMut(Result<Word<V>>) -> ControlFlow<()>,
    {
        let word_size = match self.word_size() {
            Ok(size) => size,
            Err(e) => return visit(Err(e)),
        };
        let count = buf.len() / word_size;
        let remainder = buf.len() % word_size;
        let word_at = |i: usize| &buf[i * word_size..(i + 1) * word_size];

        match order {
            Order::TopToBottom => {
                for i in 0..count {
                    visit(self.decode(word_at(i)))?;
                }
                if remainder > 0 {
                    visit(Err(Error::ShortWord(remainder, word_size)))?;
                }
            }
            Order::BottomToTop => {
                if remainder > 0 {
                    visit(Err(Error::ShortWord(remainder, word_size)))?;
                }
                for i in (0..count).rev() {
                    visit(self.decode(word_at(i)))?;
                }
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ASCII_EUID, BYTES_EUID};
    use crate::serialize::{AsciiSerializer, BytesSerializer, StructSerializer, VoidSerializer};

    fn bytes_codec(state: usize, key: usize, val: usize) -> WordCodec<Vec<u8>> {
        WordCodec::new(
            Identity::new(BYTES_EUID, 0),
            Layout::new(state, key, val),
            BytesSerializer,
        )
    }

    fn ascii_codec(state: usize, key: usize, val: usize) -> WordCodec<String> {
        WordCodec::new(
            Identity::new(ASCII_EUID, 0),
            Layout::new(state, key, val),
            AsciiSerializer,
        )
    }

    #[test]
    fn test_header_length() {
        let codec = bytes_codec(10, 32, 100);
        assert_eq!(codec.word_size().unwrap(), 150);
        assert_eq!(codec.header().unwrap().len(), 150);
    }

    #[test]
    fn test_match() {
        let codec = bytes_codec(10, 32, 100);
        let header = codec.header().unwrap();

        assert!(!codec.matches(&[0u8; 16]));
        assert!(!codec.matches(&vec![0u8; codec.word_size().unwrap()]));
        assert!(!codec.matches(&header[..11]));
        assert!(codec.matches(&header));
        assert!(codec.matches(&header[..crate::codec::IDENTITY_SIZE]));

        let other_version =
            WordCodec::<Vec<u8>>::unconfigured(Identity::new(BYTES_EUID, 1), BytesSerializer);
        assert!(!other_version.matches(&header));
        let other_tag = WordCodec::<()>::unconfigured(Identity::new(ASCII_EUID, 0), VoidSerializer);
        assert!(!other_tag.matches(&header));
    }

    #[test]
    fn test_encode_decode() {
        let codec = bytes_codec(10, 8, 100);
        let state = State::build(10, "abcdefg").unwrap();

        let buf = codec.encode(3, &state, b"key", &b"foobarbaz".to_vec()).unwrap();
        assert_eq!(buf.len(), codec.word_size().unwrap());

        let word = codec.decode(&buf).unwrap();
        assert_eq!(word.seq, 3);
        assert_eq!(word.state, state);
        assert_eq!(word.key, b"key\0\0\0\0\0");
        assert_eq!(word.value, b"foobarbaz");

        assert!(matches!(
            codec.decode(&[0u8; 16]),
            Err(Error::ShortWord(16, 126))
        ));
    }

    #[test]
    fn test_wire_layout() {
        let codec = bytes_codec(4, 2, 6);
        let state = State::build(4, "st").unwrap();
        let buf = codec.encode(0x01020304, &state, b"k", &b"abc".to_vec()).unwrap();
        assert_eq!(
            buf,
            vec![1, 2, 3, 4, b's', b't', 0, 0, b'k', 0, 0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0]
        );
    }

    #[test]
    fn test_setup_from_header() {
        let codec = ascii_codec(10, 4, 100);
        let header = codec.header().unwrap();
        let state = State::build(10, "abcdefg").unwrap();
        let buf = codec.encode(3, &state, b"key", &"foobarbaz".to_string()).unwrap();

        let mut fresh = WordCodec::unconfigured(Identity::new(ASCII_EUID, 0), AsciiSerializer);
        assert!(matches!(fresh.decode(&buf), Err(Error::CodecNotConfigured)));
        assert!(matches!(
            fresh.encode(0, &state, b"", &String::new()),
            Err(Error::CodecNotConfigured)
        ));

        assert!(!fresh.matches(&[0u8; 16]));
        assert!(matches!(
            fresh.setup(&[0u8; 16]),
            Err(Error::NotMatchingEncoder)
        ));
        assert!(matches!(
            fresh.setup(&header[..20]),
            Err(Error::HeaderTooShort(20, 24))
        ));

        assert!(fresh.matches(&header));
        fresh.setup(&header).unwrap();
        assert_eq!(fresh.layout().unwrap(), codec.layout().unwrap());

        let word = fresh.decode(&buf).unwrap();
        assert_eq!(word.seq, 3);
        assert_eq!(word.state, state);
        assert_eq!(word.value, "foobarbaz");
        assert_eq!(
            fresh.encode(3, &state, b"key", &"foobarbaz".to_string()).unwrap(),
            buf
        );
    }

    #[test]
    fn test_void_key_round_trip() {
        let codec = WordCodec::new(
            Identity::new(ASCII_EUID, 2),
            Layout::new(8, 0, 32),
            AsciiSerializer,
        );
        let state = State::build(8, "dump").unwrap();
        let buf = codec.encode(7, &state, &[], &"only a value".to_string()).unwrap();
        assert_eq!(buf.len(), 48);

        let word = codec.decode(&buf).unwrap();
        assert_eq!(word.seq, 7);
        assert!(word.key.is_empty());
        assert_eq!(word.value, "only a value");

        let header = codec.header().unwrap();
        let mut fresh = WordCodec::unconfigured(Identity::new(ASCII_EUID, 2), AsciiSerializer);
        assert!(fresh.matches(&header));
        fresh.setup(&header).unwrap();
        assert_eq!(fresh.key_size().unwrap(), 0);
        assert_eq!(fresh.decode(&buf).unwrap(), word);
    }

    #[test]
    fn test_zero_length_key_keeps_value_offset() {
        let codec = bytes_codec(4, 8, 16);
        let state = State::build(4, "s").unwrap();
        let buf = codec.encode(1, &state, &[], &b"value".to_vec()).unwrap();
        let word = codec.decode(&buf).unwrap();
        assert_eq!(word.key, vec![0u8; 8]);
        assert_eq!(word.value, b"value");
    }

    #[test]
    fn test_void_value() {
        let codec = WordCodec::new(
            Identity::new(BYTES_EUID, 0),
            Layout::new(4, 4, 0),
            VoidSerializer,
        );
        let state = State::build(4, "s").unwrap();
        let buf = codec.encode(9, &state, b"abcd", &()).unwrap();
        assert_eq!(buf.len(), 16);
        let word = codec.decode(&buf).unwrap();
        assert_eq!(word.seq, 9);
        assert_eq!(word.key, b"abcd");
    }

    #[test]
    fn test_capacity_errors() {
        let codec = bytes_codec(4, 2, 4);
        let state = State::build(4, "s").unwrap();

        assert!(matches!(
            codec.encode(0, &state, b"abc", &b"v".to_vec()),
            Err(Error::KeyTooLong(3, 2))
        ));
        assert!(matches!(
            codec.encode(0, &state, b"ab", &b"12345".to_vec()),
            Err(Error::ValueTooLong(5, 4))
        ));
        let wrong_state = State::build(6, "s").unwrap();
        assert!(matches!(
            codec.encode(0, &wrong_state, b"ab", &b"v".to_vec()),
            Err(Error::StateSizeMismatch(6, 4))
        ));
    }

    #[test]
    fn test_corrupted_value_length() {
        let codec = bytes_codec(4, 2, 4);
        let state = State::build(4, "s").unwrap();
        let mut buf = codec.encode(0, &state, b"ab", &b"v".to_vec()).unwrap();
        buf[10..14].copy_from_slice(&99u32.to_be_bytes());
        assert!(matches!(
            codec.decode(&buf),
            Err(Error::BadValueLength(99, 4))
        ));
    }

    #[test]
    fn test_struct_values() {
        let codec = WordCodec::new(
            Identity::new(BYTES_EUID, 0),
            Layout::new(4, 4, 64),
            StructSerializer::<(u32, String)>::new(),
        );
        let state = State::build(4, "s").unwrap();
        let value = (12u32, "layer".to_string());
        let buf = codec.encode(0, &state, b"k", &value).unwrap();
        assert_eq!(codec.decode(&buf).unwrap().value, value);
    }

    fn encode_run(codec: &WordCodec<String>, texts: &[&str]) -> Vec<u8> {
        let state = State::build(10, "pif").unwrap();
        let mut bufs = Vec::new();
        for (seq, text) in texts.iter().enumerate() {
            let key = format!("k{}", seq);
            let buf = codec
                .encode(seq as u32, &state, key.as_bytes(), &text.to_string())
                .unwrap();
            bufs.extend_from_slice(&buf);
        }
        bufs
    }

    #[test]
    fn test_decode_all_order_symmetry() {
        let codec = ascii_codec(10, 4, 100);
        let bufs = encode_run(&codec, &["foo", "bar", "baz"]);

        let mut forward = Vec::new();
        let flow = codec.decode_all(Order::TopToBottom, &bufs, |word| {
            let word = word.unwrap();
            forward.push((word.seq, word.value));
            ControlFlow::Continue(())
        });
        assert!(flow.is_continue());

        let mut backward = Vec::new();
        let flow = codec.decode_all(Order::BottomToTop, &bufs, |word| {
            let word = word.unwrap();
            backward.push((word.seq, word.value));
            ControlFlow::Continue(())
        });
        assert!(flow.is_continue());

        assert_eq!(
            forward,
            vec![
                (0, "foo".to_string()),
                (1, "bar".to_string()),
                (2, "baz".to_string())
            ]
        );
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_decode_all_reports_errors_and_continues() {
        let codec = ascii_codec(10, 4, 100);
        let mut bufs = encode_run(&codec, &["foo", "bar", "baz"]);
        let word_size = codec.word_size().unwrap();
        // Corrupt the value length of the middle word.
        let at = word_size + 18;
        bufs[at..at + 4].copy_from_slice(&1000u32.to_be_bytes());
        bufs.extend_from_slice(&[1, 2, 3]);

        let mut values = Vec::new();
        let mut errors = 0;
        let flow = codec.decode_all(Order::TopToBottom, &bufs, |word| {
            match word {
                Ok(word) => values.push(word.value),
                Err(_) => errors += 1,
            }
            ControlFlow::Continue(())
        });
        assert!(flow.is_continue());
        assert_eq!(values, vec!["foo".to_string(), "baz".to_string()]);
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_decode_all_visitor_stop() {
        let codec = ascii_codec(10, 4, 100);
        let bufs = encode_run(&codec, &["foo", "bar", "baz"]);

        let mut seen = Vec::new();
        let flow = codec.decode_all(Order::BottomToTop, &bufs, |word| {
            seen.push(word.unwrap().value);
            ControlFlow::Break(())
        });
        assert!(flow.is_break());
        assert_eq!(seen, vec!["baz".to_string()]);
    }

    #[test]
    fn test_decode_last_word() {
        let codec = ascii_codec(10, 4, 100);
        let bufs = encode_run(&codec, &["foo", "bar", "baz"]);
        let word = codec.decode_last_word(&bufs).unwrap();
        assert_eq!(word.seq, 2);
        assert_eq!(word.value, "baz");

        assert!(codec.decode_last_word(&bufs[..10]).is_err());
    }
}
