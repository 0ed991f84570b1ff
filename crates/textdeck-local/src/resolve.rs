//! Link resolution against the current page.
//!
//! Deliberately a relative-path heuristic, not full RFC 3986 reference
//! resolution: the pages this pipeline sees come through a reader proxy and
//! a lite search endpoint, and the simple cases below cover them.

/// Scheme+host(+port) prefix of `url`, used to resolve relative links.
///
/// A URL with no scheme separator is treated as a bare host and gets
/// `https://` prefixed whole.
pub fn base_domain(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return format!("https://{url}");
    };
    match url[scheme_end + 3..].find('/') {
        Some(host_end) => url[..scheme_end + 3 + host_end].to_string(),
        None => url.to_string(),
    }
}

/// Map a possibly-relative href to an absolute URL.
///
/// Priority order: absolute http(s) unchanged; protocol-relative `//host`
/// gets `https:`; root-relative `/path` joins the base domain; a bare
/// `#fragment` stays on the current page; anything else is treated as a
/// path relative to the domain root.
pub fn resolve_href(href: &str, base_domain: &str, current_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("{base_domain}{href}")
    } else if href.starts_with('#') {
        current_url.to_string()
    } else {
        format!("{base_domain}/{href}")
    }
}
