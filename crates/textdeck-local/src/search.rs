//! Query submission against the lite search endpoint.

use std::time::Duration;

use textdeck_core::{Error, Result, SearchResult};

use crate::results::extract_results;
use crate::transfer::{Framing, TransferDecoder};
use crate::transport::HttpClient;

/// Responses shorter than this are error pages or empty shells, not result
/// listings.
const MIN_USEFUL_BODY: usize = 100;
const SEARCH_BODY_BUDGET: Duration = Duration::from_secs(15);

/// Percent-encode a query for a urlencoded form. Spaces become `+`;
/// unreserved characters pass through; everything else is `%XX` with
/// uppercase hex, per byte for multibyte characters.
pub fn encode_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len() * 3);
    for b in query.bytes() {
        match b {
            b' ' => out.push('+'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub struct LiteSearchClient<'a> {
    pub http: &'a HttpClient,
    pub url: &'a str,
}

impl LiteSearchClient<'_> {
    /// POST the query and extract results from the returned HTML.
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let form = format!("q={}", encode_query(query));
        log::debug!("search: {} ({} byte form)", self.url, form.len());
        let mut resp = self.http.post_form(self.url, &form, &[])?;
        if resp.status != 200 {
            return Err(Error::Protocol(format!(
                "search returned {}",
                resp.status_line
            )));
        }
        let framing = if resp.chunked {
            Framing::Chunked
        } else {
            Framing::Fixed {
                content_length: resp.content_length,
            }
        };
        let decoder = TransferDecoder {
            idle_timeout: SEARCH_BODY_BUDGET,
            ..TransferDecoder::default()
        };
        let mut raw: Vec<u8> = Vec::new();
        decoder.run(&mut resp.stream, framing, &mut raw)?;
        if raw.len() < MIN_USEFUL_BODY {
            return Err(Error::NoData);
        }
        let html = String::from_utf8_lossy(&raw);
        Ok(extract_results(&html))
    }
}
