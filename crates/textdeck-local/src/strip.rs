//! Incremental HTML-to-plain-text stripping.
//!
//! `TextStripper` is a character-driven state machine fed one byte at a time
//! by the transfer decoder, so a page is stripped as it streams in and peak
//! memory stays at one small read chunk regardless of document size. It
//! writes normalized text into a `PageBuffer`, harvests anchor hrefs into a
//! `LinkTable` (with inline `[n]` markers), and never fails: garbled markup
//! degrades to garbled-but-bounded text.
//!
//! `strip_inline` is the flat companion used for result titles/snippets:
//! tag removal and a small entity set, no structure and no link harvesting.

use crate::resolve;
use textdeck_core::{ByteSink, LinkTable, PageBuffer};

const TAG_BUF_MAX: usize = 127;
const ENTITY_BUF_MAX: usize = 15;
const TAG_NAME_MAX: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Tag,
    Script,
    Style,
    Head,
    Comment,
}

/// Streaming HTML stripper for one page decode.
///
/// Borrows the output buffer and link table exclusively for the duration of
/// the decode; state is fresh per instance, so stripping the same input from
/// a new stripper is byte-identical.
pub struct TextStripper<'a> {
    state: State,
    tag_buf: String,
    entity_buf: String,
    in_entity: bool,
    in_anchor: bool,
    dash_count: u8,
    // Progress through the closing literal while skipping script/style/head.
    close_match: usize,
    base_domain: &'a str,
    current_url: &'a str,
    out: &'a mut PageBuffer,
    links: &'a mut LinkTable,
}

impl<'a> TextStripper<'a> {
    pub fn new(
        out: &'a mut PageBuffer,
        links: &'a mut LinkTable,
        base_domain: &'a str,
        current_url: &'a str,
    ) -> Self {
        out.clear();
        links.clear();
        Self {
            state: State::Text,
            tag_buf: String::new(),
            entity_buf: String::new(),
            in_entity: false,
            in_anchor: false,
            dash_count: 0,
            close_match: 0,
            base_domain,
            current_url,
            out,
            links,
        }
    }

    /// Whether the cursor is currently between `<a ...>` and `</a>`.
    pub fn in_anchor(&self) -> bool {
        self.in_anchor
    }

    /// Convenience for tests and whole-buffer callers.
    pub fn feed_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.feed(b);
        }
    }

    fn feed_byte(&mut self, b: u8) {
        let c = b as char;
        match self.state {
            State::Script => self.feed_raw_skip(b, b"</script"),
            State::Style => self.feed_raw_skip(b, b"</style"),
            State::Head => self.feed_raw_skip(b, b"</head"),
            State::Comment => {
                if b == b'-' {
                    self.dash_count = self.dash_count.saturating_add(1);
                } else if b == b'>' && self.dash_count >= 2 {
                    self.state = State::Text;
                    self.dash_count = 0;
                } else {
                    self.dash_count = 0;
                }
            }
            State::Tag => {
                if b == b'>' {
                    self.finish_tag();
                } else {
                    if self.tag_buf == "!" && b == b'-' {
                        self.state = State::Comment;
                        self.dash_count = 0;
                        self.tag_buf.clear();
                        return;
                    }
                    if self.tag_buf.len() < TAG_BUF_MAX {
                        self.tag_buf.push(c);
                    }
                }
            }
            State::Text => self.feed_text(b),
        }
    }

    /// Inside script/style/head everything is dropped; we only watch for the
    /// literal closing tag (case-insensitive), matched incrementally.
    fn feed_raw_skip(&mut self, b: u8, literal: &[u8]) {
        if self.close_match == literal.len() {
            if b == b'>' {
                self.state = State::Text;
                self.close_match = 0;
            } else if b == b'<' {
                self.close_match = 1;
            } else {
                self.close_match = 0;
            }
            return;
        }
        if b.to_ascii_lowercase() == literal[self.close_match] {
            self.close_match += 1;
        } else if b == b'<' {
            self.close_match = 1;
        } else {
            self.close_match = 0;
        }
    }

    fn feed_text(&mut self, b: u8) {
        let mut c = b as char;
        if b == b'<' {
            self.state = State::Tag;
            self.tag_buf.clear();
            // A still-open entity at a tag boundary is abandoned, not emitted.
            self.in_entity = false;
            self.entity_buf.clear();
            return;
        }
        if b == b'&' {
            self.in_entity = true;
            self.entity_buf.clear();
            self.entity_buf.push('&');
            return;
        }
        if self.in_entity {
            if self.entity_buf.len() < ENTITY_BUF_MAX {
                self.entity_buf.push(c);
            }
            if b == b';' {
                let d = decode_entity(&self.entity_buf);
                if d == ' ' {
                    // Decoded spaces join the normal run-collapsing.
                    if self.out.last_char() != Some(' ') {
                        self.out.push(' ');
                    }
                } else {
                    self.out.push(d);
                }
                self.in_entity = false;
                self.entity_buf.clear();
            } else if self.entity_buf.len() > 12 || b == b' ' || b == b'\n' {
                // Overlong or broken entity: drop it wholesale.
                self.in_entity = false;
                self.entity_buf.clear();
            }
            return;
        }
        if b == b'\r' {
            return;
        }
        if b == b'\t' {
            c = ' ';
        }
        if c == '\n' && self.out.last_char() == Some('\n') {
            return;
        }
        if c == ' ' && self.out.last_char() == Some(' ') {
            return;
        }
        if (c as u32) < 32 && c != '\n' {
            return;
        }
        // 7-bit output: bytes outside ASCII are dropped, not transcoded.
        if b >= 0x80 {
            return;
        }
        self.out.push(c);
    }

    fn finish_tag(&mut self) {
        let tag = std::mem::take(&mut self.tag_buf);
        self.state = State::Text;

        // `<!doctype ...>` and friends; comments were diverted earlier.
        if tag.starts_with('!') {
            return;
        }

        let closing = tag.starts_with('/');
        let inner = if closing { &tag[1..] } else { tag.as_str() };
        let name: String = inner
            .chars()
            .take_while(|&ch| ch != ' ')
            .take(TAG_NAME_MAX)
            .map(|ch| ch.to_ascii_lowercase())
            .collect();

        if !closing {
            match name.as_str() {
                "script" => {
                    self.state = State::Script;
                    self.close_match = 0;
                }
                "style" => {
                    self.state = State::Style;
                    self.close_match = 0;
                }
                "head" => {
                    self.state = State::Head;
                    self.close_match = 0;
                }
                "a" => self.open_anchor(&tag),
                _ => {
                    if is_block_tag(&name) {
                        self.ensure_newline();
                    }
                }
            }
        } else {
            if name == "a" {
                self.in_anchor = false;
            }
            if is_block_tag(&name) {
                self.ensure_newline();
            }
        }
    }

    fn open_anchor(&mut self, tag: &str) {
        let Some(href) = extract_attr(tag, "href") else {
            return;
        };
        let href_lc = href.to_ascii_lowercase();
        if href_lc.starts_with("javascript:") || href_lc.starts_with("mailto:") {
            return;
        }
        let resolved = resolve::resolve_href(&href, self.base_domain, self.current_url);
        // A full table degrades the anchor to plain inline text: no marker.
        if let Some(n) = self.links.push(&resolved) {
            self.out.push_str(&format!("[{n}]"));
            self.in_anchor = true;
        }
    }

    fn ensure_newline(&mut self) {
        if !self.out.is_empty() && self.out.last_char() != Some('\n') {
            self.out.push('\n');
        }
    }
}

impl ByteSink for TextStripper<'_> {
    fn feed(&mut self, byte: u8) {
        self.feed_byte(byte);
    }
}

/// Decode one buffered entity (`&...;` inclusive). Unrecognized entities
/// become a single space.
fn decode_entity(buf: &str) -> char {
    // Strip the leading '&' and trailing ';'.
    if buf.len() < 3 {
        return ' ';
    }
    let inner = &buf[1..buf.len() - 1];
    match inner {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" | "ndash" => '-',
        "hellip" => '.',
        _ => {
            if let Some(digits) = inner.strip_prefix('#') {
                let leading: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
                if let Ok(n) = leading.parse::<u32>() {
                    if (32..=127).contains(&n) {
                        return char::from_u32(n).unwrap_or(' ');
                    }
                }
            }
            ' '
        }
    }
}

/// Tag names that force a line break in the plain-text rendering.
fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "br"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "li"
            | "tr"
            | "td"
            | "th"
            | "article"
            | "section"
            | "header"
            | "footer"
            | "nav"
            | "main"
    )
}

/// Pull an attribute value out of raw tag content: quoted with `"` or `'`,
/// or unquoted up to space/`>`. Returns `None` for missing or empty values.
pub(crate) fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let at = tag.find(attr)?;
    let mut rest = tag[at + attr.len()..].chars().peekable();
    while matches!(rest.peek(), Some(' ') | Some('=')) {
        rest.next();
    }
    let quote = match rest.peek() {
        Some(&q @ ('"' | '\'')) => {
            rest.next();
            Some(q)
        }
        _ => None,
    };
    let mut out = String::new();
    for ch in rest {
        match quote {
            Some(q) if ch == q => break,
            None if ch == ' ' || ch == '>' => break,
            _ => out.push(ch),
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Flat strip for short fragments (result titles and snippets): drop tags,
/// decode the small entity set, collapse whitespace, trim the edges.
pub fn strip_inline(s: &str) -> String {
    let mut flat = String::with_capacity(s.len());
    let mut in_tag = false;
    let mut iter = s.char_indices();
    while let Some((i, c)) = iter.next() {
        if c == '<' {
            in_tag = true;
            continue;
        }
        if c == '>' {
            in_tag = false;
            continue;
        }
        if in_tag {
            continue;
        }
        if c == '&' {
            if let Some(rel) = s[i..].find(';') {
                if rel < 10 {
                    if let Some(d) = small_entity(&s[i + 1..i + rel]) {
                        flat.push(d);
                        // Skip ahead past the ';'.
                        for (j, _) in iter.by_ref() {
                            if j + 1 >= i + rel + 1 {
                                break;
                            }
                        }
                        continue;
                    }
                }
            }
        }
        flat.push(c);
    }

    let mut out = String::with_capacity(flat.len());
    let mut prev_space = true;
    for mut c in flat.chars() {
        if c == '\n' || c == '\r' || c == '\t' {
            c = ' ';
        }
        if c == ' ' && prev_space {
            continue;
        }
        prev_space = c == ' ';
        out.push(c);
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn small_entity(inner: &str) -> Option<char> {
    match inner {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "nbsp" => Some(' '),
        _ => None,
    }
}
