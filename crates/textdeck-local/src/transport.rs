//! Blocking HTTP/1.1 transport over plain TCP or rustls.
//!
//! Deliberately minimal: one request per connection (`Connection: close`),
//! no keep-alive, no compression. The response body is left on the wire as
//! a `ByteSource` so the transfer decoder sees the raw framing, chunked or
//! otherwise.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::Once;
use std::time::{Duration, Instant};

use textdeck_core::{ByteSource, Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
/// Socket read timeout; short so the polling loops above stay responsive.
const SOCKET_POLL: Duration = Duration::from_millis(50);
const HEADER_TIMEOUT: Duration = Duration::from_secs(10);
const HEADER_MAX: usize = 16 * 1024;
pub const MAX_REDIRECTS: usize = 5;

static INSTALL_CRYPTO: Once = Once::new();

/// A duplex connection the client can write a request to and then drain as
/// a byte source.
pub trait Connection: ByteSource + io::Write {}

impl<T: ByteSource + io::Write> Connection for T {}

impl ByteSource for Box<dyn Connection> {
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_some(buf)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Non-blocking-flavored wrapper over a blocking `Read`: socket timeouts
/// become `Ok(0)` ("nothing yet"), and a clean EOF flips `is_connected`.
pub struct PollStream<S: Read> {
    inner: S,
    connected: bool,
}

impl<S: Read> PollStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            connected: true,
        }
    }
}

impl<S: Read> ByteSource for PollStream<S> {
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.connected {
            return Ok(0);
        }
        match self.inner.read(buf) {
            Ok(0) => {
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => {
                self.connected = false;
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl<S: Read + Write> Write for PollStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The pieces of a URL the transport needs. Query strings stay glued to
/// `path`; fragments are dropped before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub https: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ParsedUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.split('#').next().unwrap_or(url);
        let (https, rest) = if let Some(r) = url.strip_prefix("https://") {
            (true, r)
        } else if let Some(r) = url.strip_prefix("http://") {
            (false, r)
        } else {
            return Err(Error::InvalidUrl(url.to_string()));
        };
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidUrl(url.to_string()))?;
                (h, port)
            }
            _ => (authority, if https { 443 } else { 80 }),
        };
        if host.is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            https,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

/// Opens connections. A seam so the HTTP client can be pointed at fixture
/// servers in tests.
pub trait Dialer {
    fn dial(&self, url: &ParsedUrl) -> Result<Box<dyn Connection>>;
}

/// Production dialer: plain TCP for http, rustls over TCP for https.
#[derive(Debug, Default, Clone)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial(&self, url: &ParsedUrl) -> Result<Box<dyn Connection>> {
        let tcp = connect_tcp(&url.host, url.port)?;
        if url.https {
            let conn = tls_connect(&url.host)?;
            let stream = rustls::StreamOwned::new(conn, tcp);
            Ok(Box::new(PollStream::new(stream)))
        } else {
            Ok(Box::new(PollStream::new(tcp)))
        }
    }
}

fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Connect(format!("{host}:{port}: {e}")))?;
    let mut last = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(SOCKET_POLL))
                    .map_err(|e| Error::Connect(e.to_string()))?;
                stream
                    .set_nodelay(true)
                    .map_err(|e| Error::Connect(e.to_string()))?;
                return Ok(stream);
            }
            Err(e) => last = Some(e),
        }
    }
    Err(Error::Connect(match last {
        Some(e) => format!("{host}:{port}: {e}"),
        None => format!("{host}:{port}: no addresses"),
    }))
}

fn tls_connect(host: &str) -> Result<rustls::ClientConnection> {
    INSTALL_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let server = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| Error::Tls(format!("bad server name: {host}")))?;
    rustls::ClientConnection::new(Arc::new(config), server).map_err(|e| Error::Tls(e.to_string()))
}

/// Status line plus the framing facts the decoder cares about; the rest of
/// the header block is discarded except `Location`.
pub struct HttpBody {
    pub status: u16,
    pub status_line: String,
    pub chunked: bool,
    pub content_length: Option<usize>,
    pub stream: Box<dyn Connection>,
}

impl std::fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBody")
            .field("status", &self.status)
            .field("status_line", &self.status_line)
            .field("chunked", &self.chunked)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

pub struct HttpClient {
    dialer: Box<dyn Dialer>,
    pub user_agent: String,
}

impl HttpClient {
    pub fn new(dialer: Box<dyn Dialer>) -> Self {
        Self {
            dialer,
            user_agent: "Mozilla/5.0 (compatible; textdeck/0.1)".to_string(),
        }
    }

    /// GET with redirect following. `extra_headers` are full `Name: value`
    /// lines appended to the request.
    pub fn get(&self, url: &str, extra_headers: &[&str]) -> Result<HttpBody> {
        let mut current = url.to_string();
        for _ in 0..=MAX_REDIRECTS {
            let parsed = ParsedUrl::parse(&current)?;
            let (body, location) = self.request(&parsed, "GET", extra_headers, None)?;
            if matches!(body.status, 301 | 302 | 303 | 307 | 308) {
                if let Some(loc) = location {
                    current = absolutize_location(&loc, &parsed);
                    log::debug!("redirect -> {current}");
                    continue;
                }
            }
            return Ok(body);
        }
        Err(Error::Protocol("too many redirects".to_string()))
    }

    /// POST a urlencoded form. Redirects are not followed.
    pub fn post_form(&self, url: &str, body: &str, extra_headers: &[&str]) -> Result<HttpBody> {
        let parsed = ParsedUrl::parse(url)?;
        let (resp, _) = self.request(&parsed, "POST", extra_headers, Some(body))?;
        Ok(resp)
    }

    fn request(
        &self,
        url: &ParsedUrl,
        method: &str,
        extra_headers: &[&str],
        form_body: Option<&str>,
    ) -> Result<(HttpBody, Option<String>)> {
        let mut conn = self.dialer.dial(url)?;
        let mut req = String::with_capacity(256);
        req.push_str(&format!("{} {} HTTP/1.1\r\n", method, url.path));
        req.push_str(&format!("Host: {}\r\n", url.host));
        req.push_str(&format!("User-Agent: {}\r\n", self.user_agent));
        req.push_str("Connection: close\r\n");
        for h in extra_headers {
            req.push_str(h);
            req.push_str("\r\n");
        }
        if let Some(body) = form_body {
            req.push_str("Content-Type: application/x-www-form-urlencoded\r\n");
            req.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        req.push_str("\r\n");
        if let Some(body) = form_body {
            req.push_str(body);
        }
        conn.write_all(req.as_bytes())
            .and_then(|_| conn.flush())
            .map_err(|e| Error::Connect(format!("send: {e}")))?;

        let header = read_header_section(&mut conn)?;
        let status_line = header.lines().next().unwrap_or("").to_string();
        let status = parse_status(&status_line)?;
        let mut chunked = false;
        let mut content_length = None;
        let mut location = None;
        for line in header.lines().skip(1) {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.to_ascii_lowercase().contains("chunked");
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse::<usize>().ok();
            } else if name.eq_ignore_ascii_case("location") {
                location = Some(value.to_string());
            }
        }
        Ok((
            HttpBody {
                status,
                status_line,
                chunked,
                content_length,
                stream: conn,
            },
            location,
        ))
    }
}

/// Read until the blank line ending the header block, byte at a time so no
/// body bytes are consumed.
fn read_header_section(src: &mut Box<dyn Connection>) -> Result<String> {
    let deadline = Instant::now() + HEADER_TIMEOUT;
    let mut header = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    loop {
        match src.read_some(&mut byte) {
            Ok(1) => {
                header.push(byte[0]);
                if header.ends_with(b"\r\n\r\n") {
                    break;
                }
                if header.len() >= HEADER_MAX {
                    return Err(Error::Protocol("header section too large".to_string()));
                }
            }
            Ok(_) => {
                if !src.is_connected() {
                    return Err(Error::Protocol("connection closed in headers".to_string()));
                }
                if Instant::now() >= deadline {
                    return Err(Error::Timeout);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => return Err(Error::Connect(format!("recv: {e}"))),
        }
    }
    String::from_utf8(header).map_err(|_| Error::Protocol("non-utf8 header".to_string()))
}

fn parse_status(status_line: &str) -> Result<u16> {
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| Error::Protocol(format!("bad status line: {status_line:?}")))
}

fn absolutize_location(loc: &str, from: &ParsedUrl) -> String {
    if loc.starts_with("http://") || loc.starts_with("https://") {
        loc.to_string()
    } else if loc.starts_with('/') {
        let scheme = if from.https { "https" } else { "http" };
        let default = if from.https { 443 } else { 80 };
        if from.port == default {
            format!("{scheme}://{}{loc}", from.host)
        } else {
            format!("{scheme}://{}:{}{loc}", from.host, from.port)
        }
    } else {
        let scheme = if from.https { "https" } else { "http" };
        format!("{scheme}://{}/{loc}", from.host)
    }
}
