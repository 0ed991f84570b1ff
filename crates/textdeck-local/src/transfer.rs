//! Streaming body decoder: chunked or fixed-length framing, with timeout
//! discipline and a hard byte cap.
//!
//! Each payload byte is handed to the sink before the next one is read, so
//! memory stays bounded by one small read buffer no matter how large the
//! document is. An idle stall after streaming has started is a partial
//! success, not an error: the bytes received so far are the body.

use std::time::{Duration, Instant};

use textdeck_core::{limits, ByteSink, ByteSource, Error, Result};

const READ_CHUNK: usize = 512;
/// Hex digits accepted in one chunk-size line.
const CHUNK_SIZE_LINE_MAX: usize = 14;
/// Window for the CRLF that trails each chunk.
const CHUNK_TRAILER_WINDOW: Duration = Duration::from_millis(800);
const POLL_SLEEP: Duration = Duration::from_millis(2);

/// Response body framing, selected from the response headers by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Chunked,
    /// Fixed framing; `None` means the length is unknown and the body runs
    /// to disconnect/idle-timeout (bounded by the byte cap).
    Fixed { content_length: Option<usize> },
}

/// Decoder configuration. Defaults carry the production windows; tests
/// shrink them.
#[derive(Debug, Clone)]
pub struct TransferDecoder {
    pub first_byte_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_bytes: usize,
}

impl Default for TransferDecoder {
    fn default() -> Self {
        Self {
            first_byte_timeout: limits::FIRST_BYTE_TIMEOUT,
            idle_timeout: limits::IDLE_TIMEOUT,
            max_bytes: limits::MAX_BODY_BYTES,
        }
    }
}

impl TransferDecoder {
    /// Drive `src` to completion, feeding payload bytes to `sink`.
    ///
    /// Returns the number of payload bytes delivered. `Err(NoData)` only
    /// when nothing at all arrived within the first-byte window; every
    /// later stall or framing hiccup ends the body as a partial success.
    pub fn run<S, K>(&self, src: &mut S, framing: Framing, sink: &mut K) -> Result<usize>
    where
        S: ByteSource,
        K: ByteSink + ?Sized,
    {
        let mut reader = SourceReader::new(src);
        if !reader.wait_for_data(self.first_byte_timeout) {
            return Err(Error::NoData);
        }
        let total = match framing {
            Framing::Chunked => self.run_chunked(&mut reader, sink),
            Framing::Fixed { content_length } => {
                self.run_fixed(&mut reader, content_length, sink)
            }
        };
        Ok(total)
    }

    fn run_chunked<K: ByteSink + ?Sized>(
        &self,
        reader: &mut SourceReader<'_>,
        sink: &mut K,
    ) -> usize {
        let mut total = 0usize;
        while total < self.max_bytes {
            // A zero size, an unparsable size line, or a stall all end the
            // body here; the bytes already delivered stand.
            let size = match self.read_chunk_size(reader) {
                Some(n) if n > 0 => n,
                _ => break,
            };
            let mut remaining = size;
            while remaining > 0 && total < self.max_bytes {
                match reader.next_byte(self.idle_timeout) {
                    Some(b) => {
                        sink.feed(b);
                        remaining -= 1;
                        total += 1;
                    }
                    None => return total,
                }
            }
            self.consume_chunk_trailer(reader);
        }
        total
    }

    fn run_fixed<K: ByteSink + ?Sized>(
        &self,
        reader: &mut SourceReader<'_>,
        content_length: Option<usize>,
        sink: &mut K,
    ) -> usize {
        let mut remaining = content_length.unwrap_or(self.max_bytes);
        let mut total = 0usize;
        while remaining > 0 && total < self.max_bytes {
            match reader.next_byte(self.idle_timeout) {
                Some(b) => {
                    sink.feed(b);
                    remaining -= 1;
                    total += 1;
                }
                None => break,
            }
        }
        total
    }

    /// Parse one hex chunk-size line terminated by CRLF. Chunk extensions
    /// (`1a;ext`) are tolerated by parsing only the leading hex digits.
    fn read_chunk_size(&self, reader: &mut SourceReader<'_>) -> Option<usize> {
        let mut line = String::new();
        let mut saw_cr = false;
        loop {
            let b = reader.next_byte(self.idle_timeout)?;
            match b {
                b'\r' => saw_cr = true,
                b'\n' if saw_cr => break,
                _ => {
                    saw_cr = false;
                    if line.len() < CHUNK_SIZE_LINE_MAX {
                        line.push(b as char);
                    }
                }
            }
        }
        let hex: String = line
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        usize::from_str_radix(&hex, 16).ok()
    }

    /// Eat the CRLF after a chunk's payload. Best-effort: anything else is
    /// left in place for the next size line.
    fn consume_chunk_trailer(&self, reader: &mut SourceReader<'_>) {
        for _ in 0..2 {
            match reader.peek_byte(CHUNK_TRAILER_WINDOW) {
                Some(b'\r') | Some(b'\n') => {
                    reader.next_byte(CHUNK_TRAILER_WINDOW);
                }
                _ => break,
            }
        }
    }
}

/// Small buffered front end over a `ByteSource` with per-byte timeout
/// polling. The active polling loop (short sleeps, wall-clock bound) is the
/// whole concurrency story: ingestion is synchronous by design.
struct SourceReader<'a> {
    src: &'a mut dyn ByteSource,
    buf: [u8; READ_CHUNK],
    len: usize,
    pos: usize,
}

impl<'a> SourceReader<'a> {
    fn new(src: &'a mut dyn ByteSource) -> Self {
        Self {
            src,
            buf: [0u8; READ_CHUNK],
            len: 0,
            pos: 0,
        }
    }

    /// Poll until at least one byte is buffered or the window closes.
    fn wait_for_data(&mut self, window: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.pos < self.len || self.fill() {
                return true;
            }
            if !self.src.is_connected() || start.elapsed() >= window {
                return false;
            }
            std::thread::sleep(POLL_SLEEP);
        }
    }

    fn next_byte(&mut self, window: Duration) -> Option<u8> {
        if !self.wait_for_data(window) {
            return None;
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Some(b)
    }

    fn peek_byte(&mut self, window: Duration) -> Option<u8> {
        if !self.wait_for_data(window) {
            return None;
        }
        Some(self.buf[self.pos])
    }

    fn fill(&mut self) -> bool {
        match self.src.read_some(&mut self.buf) {
            Ok(0) | Err(_) => false,
            Ok(n) => {
                self.len = n;
                self.pos = 0;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted source: a queue of byte bursts, optionally ending with the
    /// connection held open (to exercise idle stalls) or closed.
    struct Scripted {
        bursts: VecDeque<Vec<u8>>,
        hold_open: bool,
    }

    impl Scripted {
        fn new(bursts: &[&[u8]], hold_open: bool) -> Self {
            Self {
                bursts: bursts.iter().map(|b| b.to_vec()).collect(),
                hold_open,
            }
        }
    }

    impl ByteSource for Scripted {
        fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.bursts.pop_front() {
                Some(burst) => {
                    let n = burst.len().min(buf.len());
                    buf[..n].copy_from_slice(&burst[..n]);
                    if n < burst.len() {
                        self.bursts.push_front(burst[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn is_connected(&self) -> bool {
            self.hold_open || !self.bursts.is_empty()
        }
    }

    fn fast_decoder() -> TransferDecoder {
        TransferDecoder {
            first_byte_timeout: Duration::from_millis(50),
            idle_timeout: Duration::from_millis(30),
            max_bytes: limits::MAX_BODY_BYTES,
        }
    }

    #[test]
    fn decodes_chunked_body() {
        let mut src = Scripted::new(&[b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"], false);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(&mut src, Framing::Chunked, &mut out)
            .unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"Wikipedia");
    }

    #[test]
    fn decodes_chunked_body_split_across_reads() {
        let mut src = Scripted::new(
            &[b"4\r\nWi", b"ki\r\n5\r\npe", b"dia\r\n0\r\n\r\n"],
            false,
        );
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(&mut src, Framing::Chunked, &mut out)
            .unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"Wikipedia");
    }

    #[test]
    fn malformed_chunk_size_is_partial_success() {
        let mut src = Scripted::new(&[b"4\r\nWiki\r\nzz!\r\nmore"], false);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(&mut src, Framing::Chunked, &mut out)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, b"Wiki");
    }

    #[test]
    fn chunk_extension_is_tolerated() {
        let mut src = Scripted::new(&[b"4;name=val\r\nWiki\r\n0\r\n\r\n"], false);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(&mut src, Framing::Chunked, &mut out)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, b"Wiki");
    }

    #[test]
    fn fixed_framing_honors_content_length() {
        let mut src = Scripted::new(&[b"hello worldEXTRA"], true);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(
                &mut src,
                Framing::Fixed {
                    content_length: Some(11),
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(n, 11);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn fixed_framing_without_length_reads_until_stall() {
        let mut src = Scripted::new(&[b"partial body"], true);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(
                &mut src,
                Framing::Fixed {
                    content_length: None,
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(n, 12);
        assert_eq!(out, b"partial body");
    }

    #[test]
    fn silent_source_fails_with_no_data_before_feeding_sink() {
        let mut src = Scripted::new(&[], true);
        let mut out: Vec<u8> = Vec::new();
        let err = fast_decoder()
            .run(
                &mut src,
                Framing::Fixed {
                    content_length: Some(100),
                },
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, Error::NoData));
        assert!(out.is_empty(), "sink must never see a byte");
    }

    #[test]
    fn mid_chunk_stall_is_partial_success() {
        let mut src = Scripted::new(&[b"a\r\nonly-four"], true);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(&mut src, Framing::Chunked, &mut out)
            .unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"only-four");
    }

    #[test]
    fn byte_cap_stops_consumption() {
        let dec = TransferDecoder {
            max_bytes: 8,
            ..fast_decoder()
        };
        let mut src = Scripted::new(&[b"0123456789abcdef"], true);
        let mut out: Vec<u8> = Vec::new();
        let n = dec
            .run(
                &mut src,
                Framing::Fixed {
                    content_length: Some(16),
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(n, 8);
        assert_eq!(out, b"01234567");
    }

    #[test]
    fn disconnect_mid_body_is_partial_success() {
        let mut src = Scripted::new(&[b"some text"], false);
        let mut out: Vec<u8> = Vec::new();
        let n = fast_decoder()
            .run(
                &mut src,
                Framing::Fixed {
                    content_length: Some(100),
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"some text");
    }
}
