//! Document acquisition pipeline for a small-screen text browser.
//!
//! Pages are fetched through a text-rendering reader proxy, stripped to
//! plain text with numbered link markers, and wrapped into a line cache
//! sized for a narrow display. When a page comes back behind a paywall or
//! bot wall, the pipeline retries through the web archive's most recent
//! snapshot before giving up.

use textdeck_core::{limits, Error, LineSpan, LinkTable, PageBuffer, Result, SearchResult, UrlHistory};

pub mod gate;
pub mod resolve;
pub mod results;
pub mod search;
pub mod strip;
pub mod transfer;
pub mod transport;
pub mod wrap;

use search::LiteSearchClient;
use strip::TextStripper;
use transfer::{Framing, TransferDecoder};
use transport::{HttpClient, TcpDialer};

/// Stripped pages shorter than this are treated as empty fetches.
const MIN_PAGE_BYTES: usize = 20;

const READER_HEADERS: &[&str] = &[
    "Accept-Encoding: identity",
    "X-Return-Format: text",
    "X-No-Cache: true",
];

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Upstream service locations. Overridable through the environment so the
/// pipeline can be pointed at mirrors or fixtures.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub search_url: String,
    pub reader_prefix: String,
    /// Wayback availability API; the target URL is appended verbatim.
    pub archive_endpoint: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_url: "https://lite.duckduckgo.com/lite/".to_string(),
            reader_prefix: "https://r.jina.ai/".to_string(),
            archive_endpoint: "http://archive.org/wayback/available?url=".to_string(),
        }
    }
}

impl Endpoints {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            search_url: env_or("TEXTDECK_SEARCH_URL", &d.search_url),
            reader_prefix: env_or("TEXTDECK_READER_PREFIX", &d.reader_prefix),
            archive_endpoint: env_or("TEXTDECK_ARCHIVE_ENDPOINT", &d.archive_endpoint),
        }
    }
}

/// Everything the display layer needs about the current page: the stripped
/// text, its link table, the wrapped line cache, the last search results,
/// and navigation history.
#[derive(Default)]
pub struct PageSession {
    pub page: PageBuffer,
    pub links: LinkTable,
    pub lines: Vec<LineSpan>,
    pub results: Vec<SearchResult>,
    pub history: UrlHistory,
    pub current_url: String,
    pub base_domain: String,
    pub scroll: usize,
}

impl PageSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of one cached line.
    pub fn line(&self, idx: usize) -> Option<&str> {
        let span = self.lines.get(idx)?;
        let start = span.start as usize;
        self.page.as_str().get(start..start + span.len as usize)
    }
}

/// The fetch orchestrator. Owns the transport and the decode policy;
/// borrows a [`PageSession`] per operation.
pub struct Fetcher {
    pub endpoints: Endpoints,
    http: HttpClient,
    decoder: TransferDecoder,
    pub wrap_width: usize,
}

impl Fetcher {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            http: HttpClient::new(Box::new(TcpDialer)),
            decoder: TransferDecoder::default(),
            wrap_width: limits::WRAP_COLUMNS,
        }
    }

    /// Fetch `url` into the session: reader proxy first, archive snapshot
    /// if the page looks gated, then strip, wrap, and reset scroll.
    /// History is untouched; see [`Fetcher::navigate`].
    pub fn fetch_page(&self, session: &mut PageSession, url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        session.current_url = url.to_string();
        session.base_domain = resolve::base_domain(url);
        let primary = self.reader_fetch(session, url);
        let gated = match &primary {
            Ok(_) => gate::looks_blocked(session.page.as_str()),
            Err(_) => true,
        };
        if gated {
            log::warn!("gated or failed fetch for {url}, trying archive");
            match self.archive_lookup(url) {
                Some(snapshot) => {
                    // Keep the user-facing URL and link-resolution base
                    // pointed at the live site, not the archive mirror.
                    self.reader_fetch(session, &snapshot)?;
                }
                None => {
                    return Err(match primary {
                        Err(e) => e,
                        Ok(_) => Error::Blocked,
                    })
                }
            }
        }
        if session.page.len() <= MIN_PAGE_BYTES {
            return Err(Error::NoData);
        }
        session.lines = wrap::build_line_cache(session.page.as_str(), self.wrap_width);
        session.scroll = 0;
        Ok(())
    }

    /// Fetch and record the destination for "back".
    pub fn navigate(&self, session: &mut PageSession, url: &str) -> Result<()> {
        self.fetch_page(session, url)?;
        session.history.push(url);
        Ok(())
    }

    /// Re-fetch the previous page. `Ok(false)` when there is nowhere to go.
    pub fn back(&self, session: &mut PageSession) -> Result<bool> {
        match session.history.pop() {
            Some(prev) => {
                self.fetch_page(session, &prev)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Follow link `n` from the current page's link table.
    pub fn open_link(&self, session: &mut PageSession, n: usize) -> Result<()> {
        let url = session
            .links
            .get(n)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidUrl(format!("no link [{n}]")))?;
        self.navigate(session, &url)
    }

    /// Run a search and store the results in the session.
    pub fn search(&self, session: &mut PageSession, query: &str) -> Result<usize> {
        let client = LiteSearchClient {
            http: &self.http,
            url: &self.endpoints.search_url,
        };
        session.results = client.search(query)?;
        log::debug!("search \"{query}\": {} results", session.results.len());
        Ok(session.results.len())
    }

    /// Open result `n` (1-based) from the last search.
    pub fn open_result(&self, session: &mut PageSession, n: usize) -> Result<()> {
        let url = n
            .checked_sub(1)
            .and_then(|i| session.results.get(i))
            .map(|r| r.url.clone())
            .ok_or_else(|| Error::InvalidUrl(format!("no result {n}")))?;
        self.navigate(session, &url)
    }

    /// One pass through the reader proxy, stripping straight off the wire
    /// into the session's page buffer and link table.
    fn reader_fetch(&self, session: &mut PageSession, url: &str) -> Result<usize> {
        let proxied = format!("{}{}", self.endpoints.reader_prefix, url);
        let mut resp = self.http.get(&proxied, READER_HEADERS)?;
        if resp.status != 200 {
            return Err(Error::Protocol(format!(
                "reader returned {}",
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
        let PageSession {
            page,
            links,
            current_url,
            base_domain,
            ..
        } = session;
        let mut stripper = TextStripper::new(page, links, base_domain, current_url);
        let n = self.decoder.run(&mut resp.stream, framing, &mut stripper)?;
        log::debug!("reader: {n} bytes for {url}");
        Ok(n)
    }

    /// Ask the archive's availability API for the closest snapshot URL.
    /// Best-effort; any failure just means no fallback.
    fn archive_lookup(&self, url: &str) -> Option<String> {
        let lookup = format!("{}{}", self.endpoints.archive_endpoint, url);
        let mut resp = match self.http.get(&lookup, &[]) {
            Ok(r) if r.status == 200 => r,
            Ok(r) => {
                log::debug!("archive lookup returned {}", r.status_line);
                return None;
            }
            Err(e) => {
                log::debug!("archive lookup failed: {e}");
                return None;
            }
        };
        let framing = if resp.chunked {
            Framing::Chunked
        } else {
            Framing::Fixed {
                content_length: resp.content_length,
            }
        };
        let mut raw: Vec<u8> = Vec::new();
        self.decoder.run(&mut resp.stream, framing, &mut raw).ok()?;
        let json = String::from_utf8_lossy(&raw);
        let snapshot = extract_snapshot_url(&json)?;
        log::debug!("archive snapshot: {snapshot}");
        Some(snapshot)
    }
}

/// Pull the first `"url":"..."` value out of the availability JSON. The
/// response is tiny and fixed-shape; escaped slashes are the only escape
/// the API emits in that field.
fn extract_snapshot_url(json: &str) -> Option<String> {
    let at = json.find("\"url\":\"")?;
    let rest = &json[at + 7..];
    let end = rest.find('"')?;
    let url = rest[..end].replace("\\/", "/");
    if url.starts_with("http") {
        Some(url)
    } else {
        None
    }
}
