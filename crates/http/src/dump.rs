//! Human-readable request dumps.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::Local;
use http::{
    header::{COOKIE, HOST, TRAILER, TRANSFER_ENCODING},
    HeaderMap, HeaderName, HeaderValue, Request,
};

/// Serializes a request for diagnostic echoing.
///
/// The dump opens with the wall-clock time at which it was taken, then lists
/// the method, each header as `Name:firstValue`, each cookie as
/// `name : value`, and finally the request as it would be transmitted: request
/// line, headers, blank line and body.
pub fn dump_request(req: &Request<Bytes>) -> Vec<u8> {
    let mut out = String::from("\n");
    out.push_str(&format!(
        "Current Time: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.9f %z")
    ));
    out.push_str(&format!("Method: {}\n", req.method()));

    let headers = sorted_headers(req.headers());
    for (name, values) in &headers {
        if let Some(first) = values.first() {
            out.push_str(&format!("{name}:{}\n", lossy(first)));
        }
    }
    for (name, value) in cookies(req.headers()) {
        out.push_str(&format!("{name} : {value}\n"));
    }

    let mut out = out.into_bytes();
    out.extend(wire_form(req, &headers));
    out
}

/// The request as transmitted, with the `Host` header first and the remaining
/// headers in name order.
fn wire_form(req: &Request<Bytes>, headers: &BTreeMap<String, Vec<&HeaderValue>>) -> Vec<u8> {
    let path = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let mut head = format!("{} {path} {:?}\r\n", req.method(), req.version());

    let host = req
        .headers()
        .get(HOST)
        .map(lossy)
        .or_else(|| req.uri().authority().map(|a| a.to_string()));
    if let Some(host) = host {
        head.push_str(&format!("Host: {host}\r\n"));
    }

    let excluded = [HOST, TRANSFER_ENCODING, TRAILER].map(|name| canonical_name(&name));
    for (name, values) in headers {
        if excluded.contains(name) {
            continue;
        }
        for value in values {
            head.push_str(&format!("{name}: {}\r\n", lossy(value)));
        }
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(req.body());
    out
}

fn sorted_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<&HeaderValue>> {
    headers
        .keys()
        .map(|name| (canonical_name(name), headers.get_all(name).iter().collect()))
        .collect()
}

fn cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .flat_map(|value| {
            lossy(value)
                .split(';')
                .filter_map(|pair| {
                    let (name, value) = pair.trim().split_once('=')?;
                    let name = name.trim();
                    let value = value.trim();
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .unwrap_or(value);
                    (!name.is_empty()).then(|| (name.to_owned(), value.to_owned()))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// `content-type` -> `Content-Type`
fn canonical_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn lossy(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri("/dumpRequest?verbose=1")
            .header("host", "localhost:8089")
            .header("x-b", "second")
            .header("accept", "*/*")
            .header("x-multi", "one")
            .header("x-multi", "two")
            .header("cookie", "session=abc; theme=\"dark\"")
            .body(Bytes::from_static(b"{\"hello\":1}"))
            .unwrap()
    }

    #[test]
    fn dump_has_expected_sections_in_order() {
        let dump = String::from_utf8(dump_request(&sample_request())).unwrap();
        assert!(dump.starts_with("\nCurrent Time: "));

        let method = dump.find("Method: POST\n").unwrap();
        let accept = dump.find("Accept:*/*\n").unwrap();
        let multi = dump.find("X-Multi:one\n").unwrap();
        let cookie = dump.find("session : abc\n").unwrap();
        let wire = dump.find("POST /dumpRequest?verbose=1 HTTP/1.1\r\n").unwrap();
        assert!(method < accept && accept < multi && multi < cookie && cookie < wire);

        assert!(dump.contains("theme : dark\n"));
        assert!(!dump.contains("X-Multi:two\n"));
    }

    #[test]
    fn wire_form_lists_every_value_and_the_body() {
        let dump = String::from_utf8(dump_request(&sample_request())).unwrap();
        let wire = &dump[dump.find("POST /dumpRequest").unwrap()..];
        assert_eq!(
            wire,
            "POST /dumpRequest?verbose=1 HTTP/1.1\r\n\
             Host: localhost:8089\r\n\
             Accept: */*\r\n\
             Cookie: session=abc; theme=\"dark\"\r\n\
             X-B: second\r\n\
             X-Multi: one\r\n\
             X-Multi: two\r\n\
             \r\n\
             {\"hello\":1}"
        );
    }

    #[test]
    fn empty_body_is_fine() {
        let req = Request::builder()
            .uri("/dumpRequest")
            .body(Bytes::new())
            .unwrap();
        let dump = String::from_utf8(dump_request(&req)).unwrap();
        assert!(dump.ends_with("GET /dumpRequest HTTP/1.1\r\n\r\n"));
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_name(&HeaderName::from_static("content-type")), "Content-Type");
        assert_eq!(canonical_name(&HeaderName::from_static("x-b")), "X-B");
        assert_eq!(canonical_name(&HeaderName::from_static("etag")), "Etag");
    }
}
