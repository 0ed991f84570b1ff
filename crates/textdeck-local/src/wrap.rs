//! Line-wrap pagination cache.
//!
//! Turns the finished page text into fixed-width display line spans with
//! word-aware breaking. Recomputed in full after every fetch; the display
//! layer only ever reads the resulting spans.

use textdeck_core::{limits, LineSpan};

/// Build the ordered span list for `text`, wrapped to `width` columns.
///
/// A literal newline ends the current span (zero-length spans are dropped).
/// At `width` characters the break point is the last space in the window
/// when the line would otherwise split a word; with no space in the window
/// the line hard-breaks at exactly `width`. Capped at `MAX_LINES` spans.
pub fn build_line_cache(text: &str, width: usize) -> Vec<LineSpan> {
    let bytes = text.as_bytes();
    // Span lengths are u16; an absurd width must not wrap around in the cast.
    let width = width.clamp(1, u16::MAX as usize);
    let mut spans: Vec<LineSpan> = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() && spans.len() < limits::MAX_LINES {
        let line_start = pos;
        let mut col = 0usize;
        let mut emitted = false;

        while pos < bytes.len() {
            if bytes[pos] == b'\n' {
                let len = pos - line_start;
                if len > 0 {
                    spans.push(span(line_start, len));
                }
                pos += 1;
                emitted = true;
                break;
            }
            col += 1;
            pos += 1;
            if col >= width {
                let mut wrap_at = pos;
                let splits_word =
                    pos < bytes.len() && bytes[pos] != b' ' && bytes[pos] != b'\n';
                if splits_word {
                    // Soft break: last space in the window, span ends just
                    // after it. No space means a hard break at the width.
                    let mut b = pos - 1;
                    while b > line_start {
                        if bytes[b] == b' ' {
                            wrap_at = b + 1;
                            break;
                        }
                        b -= 1;
                    }
                }
                let len = wrap_at - line_start;
                spans.push(span(line_start, len));
                pos = line_start + len;
                while pos < bytes.len() && bytes[pos] == b' ' {
                    pos += 1;
                }
                emitted = true;
                break;
            }
        }

        if !emitted {
            // Trailing partial line with no newline.
            let len = bytes.len() - line_start;
            if len > 0 {
                spans.push(span(line_start, len));
            }
            break;
        }
    }
    spans
}

fn span(start: usize, len: usize) -> LineSpan {
    LineSpan {
        start: start as u32,
        len: len as u16,
    }
}
