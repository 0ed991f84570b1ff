use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

/// POST fixture: reads the request head and the urlencoded form, then
/// answers with `body`. Returns the form it received.
fn spawn_form_fixture(body: String) -> (u16, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match stream.read(&mut byte) {
                Ok(1) => head.push(byte[0]),
                _ => break,
            }
        }
        let head = String::from_utf8_lossy(&head).into_owned();
        let form_len = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        let mut form = vec![0u8; form_len];
        stream.read_exact(&mut form).unwrap();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&form).into_owned()
    });
    (port, handle)
}

#[test]
fn search_prints_numbered_results() {
    let page = format!(
        "<html><body><table>{}</table></body></html>",
        "<tr><td><a rel=\"nofollow\" href=\"https://example.com/rust\" \
         class=\"result-link\">The Rust Language</a></td></tr>\
         <tr><td class=\"result-snippet\">Fast, memory-safe systems code.</td></tr>"
    );
    let (port, server) = spawn_form_fixture(page);
    let bin = assert_cmd::cargo::cargo_bin!("textdeck");
    let out = std::process::Command::new(bin)
        .args(["search", "rust", "language"])
        .env("TEXTDECK_SEARCH_URL", format!("http://127.0.0.1:{port}/lite/"))
        .output()
        .expect("run textdeck search");

    assert!(out.status.success(), "textdeck search failed: {out:?}");
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("  1. The Rust Language"));
    assert!(s.contains("https://example.com/rust"));
    assert!(s.contains("Fast, memory-safe systems code."));
    assert_eq!(server.join().unwrap(), "q=rust+language");
}
