//! Shared types for the textdeck page pipeline.
//!
//! Everything here is backend-agnostic: fixed-capacity buffers, the error
//! taxonomy, and the `ByteSource` seam the transfer decoder consumes. The
//! working implementations live in `textdeck-local`.

use serde::{Deserialize, Serialize};

pub mod limits {
    //! Capacity and timing limits for the whole pipeline.
    //!
    //! These are sized for a small fixed-resolution display and a few hundred
    //! KiB of working memory; every unbounded loop downstream is bounded by
    //! one of these, a count cap, or a wall-clock timeout.

    use std::time::Duration;

    /// Plain-text arena for one page.
    pub const PAGE_CAPACITY: usize = 200 * 1024;
    /// Numbered links harvested per page.
    pub const MAX_LINKS: usize = 30;
    /// Stored bytes per link URL.
    pub const LINK_URL_MAX: usize = 256;
    /// Wrapped line spans per page.
    pub const MAX_LINES: usize = 400;
    /// Search results kept per query.
    pub const MAX_RESULTS: usize = 100;
    /// Bytes per result title.
    pub const TITLE_MAX: usize = 80;
    /// Bytes per result URL.
    pub const URL_MAX: usize = 256;
    /// Bytes per result snippet.
    pub const SNIPPET_MAX: usize = 160;
    /// Hard cap on payload bytes consumed from one response body.
    pub const MAX_BODY_BYTES: usize = 400_000;
    /// Visited-URL history depth.
    pub const HISTORY_MAX: usize = 16;
    /// Display columns the paginator wraps to.
    pub const WRAP_COLUMNS: usize = 40;

    /// How long the decoder waits for the first body byte.
    pub const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(8);
    /// How long the decoder tolerates a mid-body stall before treating the
    /// bytes received so far as the complete body.
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(4);
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls error: {0}")]
    Tls(String),
    /// No usable bytes arrived (empty or undersized response).
    #[error("no data received")]
    NoData,
    /// Nothing arrived within the first-byte window.
    #[error("timed out waiting for data")]
    Timeout,
    /// Non-200 status or a malformed response envelope.
    #[error("protocol mismatch: {0}")]
    Protocol(String),
    /// Heuristic paywall/bot-wall classification. Triggers the fallback
    /// path; only terminal if the fallback also fails.
    #[error("content blocked")]
    Blocked,
}

pub type Result<T> = std::result::Result<T, Error>;

/// An open, readable byte stream (already TLS-terminated).
///
/// `read_some` must not block for long: `Ok(0)` means "nothing available
/// right now", not end of stream. The decoder's polling loop supplies the
/// timeout discipline; implementations only need short internal waits.
pub trait ByteSource {
    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn is_connected(&self) -> bool;
}

/// Synchronous consumer of decoded payload bytes.
///
/// The transfer decoder feeds each payload byte here before reading the
/// next one; there is no intermediate full-body buffer.
pub trait ByteSink {
    fn feed(&mut self, byte: u8);
}

/// Plain collector, mostly useful in tests.
impl ByteSink for Vec<u8> {
    fn feed(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// Fixed-capacity plain-text arena for the current page.
///
/// Append-only while a page streams in, fully reset at the start of each
/// fetch. Writes past capacity are silently dropped: a partial, lossy
/// document is preferred over failing the whole fetch. Only ASCII is ever
/// appended, so the content is always valid UTF-8.
#[derive(Debug)]
pub struct PageBuffer {
    text: String,
    capacity: usize,
}

impl PageBuffer {
    pub fn new() -> Self {
        Self::with_capacity(limits::PAGE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
        }
    }

    /// Saturating append: a no-op once the arena is full.
    pub fn push(&mut self, c: char) {
        if self.text.len() < self.capacity {
            self.text.push(c);
        }
    }

    pub fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            self.push(c);
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn last_char(&self) -> Option<char> {
        self.text.chars().next_back()
    }
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered table of absolute link URLs for the current page.
///
/// Index 1..N matches the `[n]` markers embedded in the page text. Rebuilt
/// fully on each fetch; `push` refuses new entries once full and truncates
/// oversized URLs rather than erroring.
#[derive(Debug, Default)]
pub struct LinkTable {
    urls: Vec<String>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the 1-based link number, or `None` when the table is full.
    pub fn push(&mut self, url: &str) -> Option<usize> {
        if self.urls.len() >= limits::MAX_LINKS {
            return None;
        }
        self.urls.push(truncate_owned(url, limits::LINK_URL_MAX));
        Some(self.urls.len())
    }

    /// 1-based lookup, matching the `[n]` markers.
    pub fn get(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.urls.get(n - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.urls.len() >= limits::MAX_LINKS
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

/// One renderable line: a byte range into the page buffer.
///
/// Spans are source-ordered, non-overlapping, never longer than the wrap
/// width, and exclude the newline characters themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub len: u16,
}

/// One mined search result, in document order from the upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    /// Builds a result with the per-field byte caps applied.
    pub fn bounded(title: &str, url: &str, snippet: &str) -> Self {
        Self {
            title: truncate_owned(title, limits::TITLE_MAX),
            url: truncate_owned(url, limits::URL_MAX),
            snippet: truncate_owned(snippet, limits::SNIPPET_MAX),
        }
    }
}

fn truncate_owned(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.len() > max {
        // Content is ASCII in practice; still keep the cut on a char boundary.
        let mut cut = max;
        while cut > 0 && !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

/// Bounded stack of visited URLs for "back" navigation.
///
/// Pushes past the cap are dropped rather than rotating: the appliance
/// forgets the deep end of a long session, which is acceptable.
#[derive(Debug, Default)]
pub struct UrlHistory {
    stack: Vec<String>,
}

impl UrlHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, url: &str) {
        if self.stack.len() < limits::HISTORY_MAX {
            self.stack.push(url.to_string());
        }
    }

    /// Pops the current URL and returns the one to go back to.
    pub fn pop(&mut self) -> Option<String> {
        if self.stack.len() < 2 {
            return None;
        }
        self.stack.pop();
        self.stack.last().cloned()
    }

    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn reset(&mut self, url: &str) {
        self.stack.clear();
        self.stack.push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_buffer_saturates_at_capacity() {
        let mut b = PageBuffer::with_capacity(8);
        for _ in 0..32 {
            b.push('x');
        }
        assert_eq!(b.len(), 8);
        assert_eq!(b.as_str(), "xxxxxxxx");
        // Still a no-op, never a panic.
        b.push_str("more");
        assert_eq!(b.len(), 8);
    }

    #[test]
    fn link_table_caps_and_numbers() {
        let mut t = LinkTable::new();
        for i in 0..limits::MAX_LINKS {
            assert_eq!(t.push("https://e.com/x"), Some(i + 1));
        }
        assert!(t.is_full());
        assert_eq!(t.push("https://e.com/overflow"), None);
        assert_eq!(t.len(), limits::MAX_LINKS);
        assert_eq!(t.get(1), Some("https://e.com/x"));
        assert_eq!(t.get(0), None);
        assert_eq!(t.get(limits::MAX_LINKS + 1), None);
    }

    #[test]
    fn link_table_truncates_long_urls() {
        let mut t = LinkTable::new();
        let long = format!("https://e.com/{}", "a".repeat(400));
        t.push(&long);
        assert_eq!(t.get(1).unwrap().len(), limits::LINK_URL_MAX);

        let multibyte = format!("https://e.com/{}", "é".repeat(300));
        t.push(&multibyte);
        assert!(t.get(2).unwrap().len() <= limits::LINK_URL_MAX);
    }

    #[test]
    fn search_result_field_caps() {
        let r = SearchResult::bounded(
            &"t".repeat(200),
            &"u".repeat(400),
            &"s".repeat(400),
        );
        assert_eq!(r.title.len(), limits::TITLE_MAX);
        assert_eq!(r.url.len(), limits::URL_MAX);
        assert_eq!(r.snippet.len(), limits::SNIPPET_MAX);
    }

    #[test]
    fn history_back_semantics() {
        let mut h = UrlHistory::new();
        assert!(h.pop().is_none());
        h.push("https://a");
        assert!(h.pop().is_none(), "cannot go back past the first page");
        h.push("https://b");
        h.push("https://c");
        assert_eq!(h.pop().as_deref(), Some("https://b"));
        assert_eq!(h.current(), Some("https://b"));
    }

    #[test]
    fn history_depth_is_bounded() {
        let mut h = UrlHistory::new();
        for i in 0..64 {
            h.push(&format!("https://e.com/{i}"));
        }
        assert_eq!(h.len(), limits::HISTORY_MAX);
    }
}
