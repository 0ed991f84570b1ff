//! Extraction of search results from the lite search engine's HTML.
//!
//! Positional scanning over the raw markup rather than a DOM: result
//! anchors carry a `result-link` class and snippets a `result-snippet`
//! class, and the page is small enough that a forward scan is both faster
//! and far smaller than a real parser.

use textdeck_core::{limits, SearchResult};

use crate::strip::{extract_attr, strip_inline};

const LINK_MARKER: &str = "result-link";
const SNIPPET_MARKER: &str = "result-snippet";

/// Scan `html` for result anchors and return up to
/// [`limits::MAX_RESULTS`] entries. Malformed entries are skipped, never
/// fatal.
pub fn extract_results(html: &str) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let mut p = 0usize;
    while results.len() < limits::MAX_RESULTS {
        let Some(rel) = html[p..].find(LINK_MARKER) else {
            break;
        };
        let marker = p + rel;
        let past_marker = marker + LINK_MARKER.len();
        // Walk back to the anchor's opening bracket, never before the scan
        // cursor. No bracket in the window means the class text landed
        // outside a tag; skip it.
        let Some(tag_rel) = html[p..marker].rfind('<') else {
            p = past_marker;
            continue;
        };
        let tag_start = p + tag_rel;
        let Some(gt_rel) = html[tag_start..].find('>') else {
            break;
        };
        let tag_end = tag_start + gt_rel;
        let tag = &html[tag_start..=tag_end];

        let href = extract_attr(tag, "href").unwrap_or_default();
        if !href.starts_with("http") {
            // The cursor must clear the marker, or the same one would be
            // found again next round.
            p = (tag_end + 1).max(past_marker);
            continue;
        }

        let after_tag = tag_end + 1;
        let (title, scan_from) = match html[after_tag..].find("</a>") {
            Some(close) => {
                let inner = &html[after_tag..after_tag + close];
                let title = strip_inline(clip(inner, limits::TITLE_MAX - 2));
                (title, after_tag + close + 4)
            }
            None => (String::new(), after_tag),
        };
        let title = if title.is_empty() {
            "(no title)".to_string()
        } else {
            title
        };

        let snippet = extract_snippet(&html[scan_from..]);

        results.push(SearchResult::bounded(&title, &href, &snippet));
        p = scan_from.max(past_marker);
    }
    results
}

/// The snippet follows its anchor; stop at the enclosing cell or span.
fn extract_snippet(rest: &str) -> String {
    let Some(marker) = rest.find(SNIPPET_MARKER) else {
        return String::new();
    };
    let Some(open) = rest[marker..].find('>') else {
        return String::new();
    };
    let body_start = marker + open + 1;
    let body = &rest[body_start..];
    let end = body
        .find("</td>")
        .or_else(|| body.find("</span>"))
        .unwrap_or(body.len());
    strip_inline(clip(&body[..end], limits::SNIPPET_MAX - 2))
}

/// Byte-length clip that never splits a UTF-8 sequence.
fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lite_row(href: &str, title: &str, snippet: &str) -> String {
        format!(
            "<tr><td><a rel=\"nofollow\" href=\"{href}\" class=\"result-link\">{title}</a></td></tr>\
             <tr><td class=\"result-snippet\">{snippet}</td></tr>"
        )
    }

    #[test]
    fn extracts_title_url_and_snippet() {
        let html = lite_row(
            "https://example.com/rust",
            "Rust <b>Language</b>",
            "A systems language &amp; toolchain.",
        );
        let results = extract_results(&html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/rust");
        assert_eq!(results[0].title, "Rust Language");
        assert_eq!(results[0].snippet, "A systems language & toolchain.");
    }

    #[test]
    fn multiple_rows_extract_in_order() {
        let html = format!(
            "{}{}",
            lite_row("https://a.example/", "First", "one"),
            lite_row("https://b.example/", "Second", "two"),
        );
        let results = extract_results(&html);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example/");
        assert_eq!(results[1].url, "https://b.example/");
        assert_eq!(results[1].snippet, "two");
    }

    #[test]
    fn non_http_href_is_skipped() {
        let html = format!(
            "{}{}",
            lite_row("javascript:void(0)", "Bad", "nope"),
            lite_row("https://good.example/", "Good", "yes"),
        );
        let results = extract_results(&html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://good.example/");
    }

    #[test]
    fn missing_href_is_skipped() {
        let html = "<a class=\"result-link\">no link</a>";
        assert!(extract_results(html).is_empty());
    }

    #[test]
    fn empty_title_gets_placeholder() {
        let html = lite_row("https://example.com/", "", "text");
        let results = extract_results(&html);
        assert_eq!(results[0].title, "(no title)");
    }

    #[test]
    fn missing_snippet_is_empty() {
        let html =
            "<a href=\"https://example.com/\" class=\"result-link\">Title</a>";
        let results = extract_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "");
    }

    #[test]
    fn snippet_in_span_is_found() {
        let html = "<a href=\"https://example.com/\" class=\"result-link\">T</a>\
                    <span class=\"result-snippet\">spanned text</span>";
        let results = extract_results(html);
        assert_eq!(results[0].snippet, "spanned text");
    }

    #[test]
    fn unterminated_anchor_still_yields_result() {
        let html = "<a href=\"https://example.com/\" class=\"result-link\">dangling";
        let results = extract_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "(no title)");
    }

    #[test]
    fn result_count_is_capped() {
        let mut html = String::new();
        for i in 0..150 {
            html.push_str(&lite_row(
                &format!("https://example.com/{i}"),
                &format!("Result {i}"),
                "s",
            ));
        }
        assert_eq!(extract_results(&html).len(), limits::MAX_RESULTS);
    }

    #[test]
    fn marker_outside_a_tag_does_not_loop() {
        let html = "result-link plain text, no tags at all";
        assert!(extract_results(html).is_empty());
    }

    #[test]
    fn marker_after_unrelated_tag_terminates() {
        // The walk-back must not latch onto a tag before the scan cursor
        // and rescan the same marker forever.
        let html = "<b>x</b> result-link plain text";
        assert!(extract_results(html).is_empty());
    }

    #[test]
    fn stray_marker_text_does_not_hide_later_results() {
        let html = format!(
            "<b>bold</b> result-link as plain text {}",
            lite_row("https://ok.example/", "Ok", "s"),
        );
        let results = extract_results(&html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://ok.example/");
    }

    #[test]
    fn long_title_is_clipped_without_splitting_utf8() {
        let title = "é".repeat(200);
        let html = lite_row("https://example.com/", &title, "s");
        let results = extract_results(&html);
        assert!(results[0].title.len() <= limits::TITLE_MAX);
        assert!(results[0].title.starts_with('é'));
    }
}
