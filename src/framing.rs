//! Newline framing for chunked byte streams.
//!
//! The lobby streams its matchmaking progress as newline-delimited JSON over a
//! chunked HTTP body. Chunk boundaries carry no meaning: a single record may be
//! split across several chunks, and one chunk may hold several records or the
//! tail of one and the head of the next.
//!
//! [`LineFrameDecoder`] reassembles complete lines from such chunks.
//! [`LineReader`] drives a decoder from any byte-chunk [`Stream`] and yields
//! lines lazily.
//!
//! Splitting happens on the raw `\n` byte before UTF-8 decoding. UTF-8 never
//! uses `0x0A` inside a multi-byte sequence, so a character cut in half by a
//! chunk boundary simply stays in the carry buffer until its remaining bytes
//! arrive.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;

/// Incremental newline splitter with a carry buffer for the unfinished line.
///
/// # Example
///
/// ```
/// use guess_duel_client::framing::LineFrameDecoder;
///
/// let mut decoder = LineFrameDecoder::new();
/// assert!(decoder.push(b"{\"status\":").is_empty());
/// let lines = decoder.push(b"\"waiting\"}\n{\"sta");
/// assert_eq!(lines, vec![r#"{"status":"waiting"}"#.to_string()]);
/// assert_eq!(decoder.pending_len(), 4);
/// ```
#[derive(Debug, Default, Clone)]
pub struct LineFrameDecoder {
    carry: Vec<u8>,
}

impl LineFrameDecoder {
    /// Create a decoder with an empty carry buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes, in order.
    ///
    /// The `\n` terminator is not included in the returned lines. Anything
    /// after the last `\n` stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            self.carry.extend_from_slice(head);
            lines.push(decode_line(&self.carry));
            self.carry.clear();
            // `tail` starts with the newline itself.
            rest = tail.get(1..).unwrap_or_default();
        }

        self.carry.extend_from_slice(rest);
        lines
    }

    /// Number of buffered bytes belonging to the unfinished line.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Signal end of stream.
    ///
    /// An unterminated trailing fragment is never emitted. Returns the number
    /// of bytes that were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.carry.len();
        if self.carry.iter().any(|b| !b.is_ascii_whitespace()) {
            debug!(bytes = dropped, "discarding incomplete trailing line");
        }
        self.carry.clear();
        dropped
    }
}

/// Decode a completed line. Invalid UTF-8 is replaced rather than rejected,
/// so a single corrupt record cannot stall the whole stream.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Lazily yields complete lines from a stream of byte chunks.
///
/// Drives a [`LineFrameDecoder`] and hands out one line per
/// [`next_line`](LineReader::next_line) call. A stream error is returned once
/// and ends the sequence.
pub struct LineReader<S> {
    stream: S,
    decoder: LineFrameDecoder,
    ready: VecDeque<String>,
    done: bool,
}

impl<S, E> LineReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    /// Wrap a byte-chunk stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: LineFrameDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Return the next complete line.
    ///
    /// - `Some(Ok(line))`: a newline-terminated line
    /// - `Some(Err(e))`: the underlying stream failed; the reader is finished
    /// - `None`: the stream ended (any unterminated tail is discarded)
    pub async fn next_line(&mut self) -> Option<Result<String, E>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => {
                    self.ready.extend(self.decoder.push(&chunk));
                }
                Some(Err(e)) => {
                    self.done = true;
                    self.decoder.finish();
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    self.decoder.finish();
                }
            }
        }
    }
}

impl<S> fmt::Debug for LineReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineReader")
            .field("pending_bytes", &self.decoder.pending_len())
            .field("ready_lines", &self.ready.len())
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = LineFrameDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        out
    }

    #[test]
    fn single_chunk_with_several_lines() {
        let lines = decode_all(&[b"one\ntwo\nthree\n"]);
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn partial_line_is_withheld_until_completed() {
        let mut decoder = LineFrameDecoder::new();
        assert!(decoder.push(b"hel").is_empty());
        assert!(decoder.push(b"lo").is_empty());
        assert_eq!(decoder.pending_len(), 5);
        assert_eq!(decoder.push(b"\n"), vec!["hello"]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn every_split_point_matches_whole_input() {
        let input = "{\"status\":\"waiting\",\"message\":\"正在匹配玩家...\"}\n\
                     {\"status\":\"matched\",\"message\":\"m2\",\"wsUrl\":\"ws://x\"}\n"
            .as_bytes();
        let expected = decode_all(&[input]);
        assert_eq!(expected.len(), 2);

        for a in 0..=input.len() {
            for b in a..=input.len() {
                let lines = decode_all(&[&input[..a], &input[a..b], &input[b..]]);
                assert_eq!(lines, expected, "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn byte_at_a_time_splits_multibyte_characters() {
        let input = "轮到你猜测\n范围：1-100\n".as_bytes();
        let chunks: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(decode_all(&chunks), vec!["轮到你猜测", "范围：1-100"]);
    }

    #[test]
    fn empty_lines_are_preserved() {
        assert_eq!(decode_all(&[b"\n\na\n"]), vec!["", "", "a"]);
    }

    #[test]
    fn carriage_returns_are_kept_verbatim() {
        assert_eq!(decode_all(&[b"a\r\n"]), vec!["a\r"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let lines = decode_all(&[b"ok\xFF\n"]);
        assert_eq!(lines, vec!["ok\u{FFFD}"]);
    }

    #[test]
    fn finish_discards_trailing_fragment() {
        let mut decoder = LineFrameDecoder::new();
        decoder.push(b"done\n{\"status\":\"matc");
        assert_eq!(decoder.finish(), 15);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[tokio::test]
    async fn reader_yields_lines_across_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"first\nsec")),
            Ok(Bytes::from_static(b"ond\nthird\nunterminated")),
        ];
        let mut reader = LineReader::new(stream::iter(chunks));

        assert_eq!(reader.next_line().await.unwrap().unwrap(), "first");
        assert_eq!(reader.next_line().await.unwrap().unwrap(), "second");
        assert_eq!(reader.next_line().await.unwrap().unwrap(), "third");
        assert!(reader.next_line().await.is_none());
        assert!(reader.next_line().await.is_none());
    }

    #[tokio::test]
    async fn reader_surfaces_stream_error_once() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"a\n")),
            Err(std::io::Error::other("reset")),
            Ok(Bytes::from_static(b"never\n")),
        ];
        let mut reader = LineReader::new(stream::iter(chunks));

        assert_eq!(reader.next_line().await.unwrap().unwrap(), "a");
        assert!(reader.next_line().await.unwrap().is_err());
        assert!(reader.next_line().await.is_none());
    }
}
