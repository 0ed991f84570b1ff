//! Heuristic paywall / bot-wall classifier.
//!
//! A signature scan over the head of the stripped text, not a parser.
//! False positives and negatives are accepted; a positive only redirects
//! the fetch to the archive fallback, it is never a terminal error.

/// How much of the page head is scanned.
const SCAN_WINDOW: usize = 2048;

/// Phrases that mark paywalls, login walls and bot-verification pages.
const BLOCK_SIGNATURES: &[&str] = &[
    "enable javascript",
    "please enable",
    "access denied",
    "subscribe to continue",
    "subscribe to read",
    "sign in to read",
    "create an account",
    "log in to continue",
    "you've reached your",
    "premium content",
    "403 forbidden",
    "just a moment",
    "checking your browser",
    "ddos protection",
    "ray id",
    "verifying you are human",
];

/// Classify the stripped page text. Anything shorter than 10 bytes is
/// treated as blocked too: a near-empty page is not worth showing.
pub fn looks_blocked(text: &str) -> bool {
    if text.len() < 10 {
        return true;
    }
    let mut cut = SCAN_WINDOW.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = text[..cut].to_ascii_lowercase();
    BLOCK_SIGNATURES.iter().any(|sig| head.contains(sig))
}
