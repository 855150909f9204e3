//! Conditional-GET content serving.
//!
//! Every file is reported as last modified at the server's [`Baseline`], a
//! timestamp fixed when the process starts. Cache revalidation against this
//! server is therefore deterministic: the validators only change when the
//! server restarts or the file length changes.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use http::{
    header::{
        ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, ETAG, IF_MATCH, IF_MODIFIED_SINCE,
        IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, LAST_MODIFIED, RANGE,
    },
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode,
};
use percent_encoding::percent_decode_str;
use tokio::{fs::File, io::AsyncReadExt};

use crate::{
    body::{self, Body},
    response::{self, TEXT_PLAIN},
    Result, SimError,
};

/// The file served when the request names none.
pub const DEFAULT_CONTENT_FILE: &str = "sampleData.json";

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
// Obsolete formats recipients must still accept.
const RFC_850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// The modification time reported for all served content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Baseline(DateTime<Utc>);

impl Baseline {
    /// A baseline at the current time.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// A baseline at `time`, truncated to whole seconds like HTTP dates.
    pub fn at(time: DateTime<Utc>) -> Self {
        Self(time.trunc_subsecs(0))
    }

    /// The baseline instant.
    pub fn time(&self) -> DateTime<Utc> {
        self.0
    }

    /// The baseline as an HTTP-date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn http_date(&self) -> String {
        self.0.format(HTTP_DATE).to_string()
    }

    /// The entity tag of a `len`-byte representation.
    pub fn etag(&self, len: u64) -> String {
        format!("\"{:x}-{:x}\"", self.0.timestamp(), len)
    }
}

/// Maps the path remainder after the routing prefix to a file below `root`.
///
/// An empty remainder selects [`DEFAULT_CONTENT_FILE`]. Names that would
/// leave `root` resolve to nothing.
pub fn resolve(root: &Path, name: &str) -> Option<PathBuf> {
    let name = percent_decode_str(name).decode_utf8().ok()?;
    let name = match name.as_ref() {
        "" => DEFAULT_CONTENT_FILE,
        name => name,
    };
    let relative = Path::new(name);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Serves the file `name` below `root` for `req`.
///
/// Fails with [`SimError::ResourceNotFound`] if the file cannot be opened
/// or is not a regular file. The file is read in full and closed before the
/// response is built.
pub async fn serve(
    root: &Path,
    name: &str,
    baseline: Baseline,
    req: &Request<Bytes>,
) -> Result<Response<Body>> {
    let path = resolve(root, name).ok_or_else(|| SimError::ResourceNotFound(name.to_owned()))?;
    let not_found = || SimError::ResourceNotFound(path.display().to_string());
    let mut file = File::open(&path).await.map_err(|_| not_found())?;
    let is_file = file
        .metadata()
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(not_found());
    }

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    drop(file);

    conditional_response(req.method(), req.headers(), &path, contents.into(), baseline)
}

/// Builds the response for `contents`, honouring the conditional and range
/// request headers.
pub fn conditional_response(
    method: &Method,
    headers: &HeaderMap,
    path: &Path,
    contents: Bytes,
    baseline: Baseline,
) -> Result<Response<Body>> {
    let len = contents.len() as u64;
    let etag = baseline.etag(len);

    match evaluate_preconditions(method, headers, &etag, baseline) {
        Precondition::Failed => return Ok(response::with_status(StatusCode::PRECONDITION_FAILED)),
        Precondition::NotModified => {
            let mut resp = response::with_status(StatusCode::NOT_MODIFIED);
            set_validators(&mut resp, &etag, baseline)?;
            return Ok(resp);
        }
        Precondition::Proceed => {}
    }

    let mut resp = match requested_range(headers, len, &etag, baseline) {
        ByteRange::Full => {
            let mut resp = response::with_status(StatusCode::OK);
            set_header(&mut resp, CONTENT_LENGTH, len.to_string())?;
            if method != Method::HEAD {
                *resp.body_mut() = body::full(contents.clone());
            }
            resp
        }
        ByteRange::Partial { start, end } => {
            let mut resp = response::with_status(StatusCode::PARTIAL_CONTENT);
            set_header(&mut resp, CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))?;
            set_header(&mut resp, CONTENT_LENGTH, (end - start + 1).to_string())?;
            if method != Method::HEAD {
                *resp.body_mut() = body::full(contents.slice(start as usize..=end as usize));
            }
            resp
        }
        ByteRange::Unsatisfiable => {
            let mut resp = response::with_status(StatusCode::RANGE_NOT_SATISFIABLE);
            set_header(&mut resp, CONTENT_RANGE, format!("bytes */{len}"))?;
            resp
        }
    };

    set_validators(&mut resp, &etag, baseline)?;
    resp.headers_mut()
        .insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response::set_content_type(&mut resp, &content_type(path, &contents))?;
    Ok(resp)
}

#[derive(Debug, PartialEq, Eq)]
enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

/// RFC 9110 section 13.2.2 evaluation order.
fn evaluate_preconditions(
    method: &Method,
    headers: &HeaderMap,
    etag: &str,
    baseline: Baseline,
) -> Precondition {
    if let Some(if_match) = header_str(headers, IF_MATCH) {
        if !etag_listed(if_match, etag, false) {
            return Precondition::Failed;
        }
    } else if let Some(since) = header_date(headers, IF_UNMODIFIED_SINCE) {
        if baseline.time() > since {
            return Precondition::Failed;
        }
    }

    let safe = method == Method::GET || method == Method::HEAD;
    if let Some(if_none_match) = header_str(headers, IF_NONE_MATCH) {
        if etag_listed(if_none_match, etag, true) {
            return if safe {
                Precondition::NotModified
            } else {
                Precondition::Failed
            };
        }
    } else if safe {
        if let Some(since) = header_date(headers, IF_MODIFIED_SINCE) {
            if baseline.time() <= since {
                return Precondition::NotModified;
            }
        }
    }

    Precondition::Proceed
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Only a single `bytes` range is honoured; anything else gets the full
/// representation.
fn requested_range(headers: &HeaderMap, len: u64, etag: &str, baseline: Baseline) -> ByteRange {
    let Some(range) = header_str(headers, RANGE) else {
        return ByteRange::Full;
    };
    if let Some(if_range) = header_str(headers, IF_RANGE) {
        let current = if if_range.starts_with('"') || if_range.starts_with("W/") {
            etag_listed(if_range, etag, false)
        } else {
            parse_http_date(if_range) == Some(baseline.time())
        };
        if !current {
            return ByteRange::Full;
        }
    }

    let Some(ranges) = range.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if ranges.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = ranges.trim().split_once('-') else {
        return ByteRange::Full;
    };

    match (first.trim(), last.trim()) {
        ("", suffix) => match suffix.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if len == 0 => ByteRange::Unsatisfiable,
            Ok(n) => ByteRange::Partial {
                start: len.saturating_sub(n),
                end: len - 1,
            },
            Err(_) => ByteRange::Full,
        },
        (first, last) => {
            let Ok(start) = first.parse::<u64>() else {
                return ByteRange::Full;
            };
            let end = match last {
                "" => None,
                last => match last.parse::<u64>() {
                    Ok(end) if end >= start => Some(end),
                    _ => return ByteRange::Full,
                },
            };
            if start >= len {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial {
                start,
                end: end.map_or(len - 1, |end| end.min(len - 1)),
            }
        }
    }
}

/// Whether `etag` appears in the comma-separated `list` (or `list` is `*`).
fn etag_listed(list: &str, etag: &str, weak: bool) -> bool {
    let list = list.trim();
    if list == "*" {
        return true;
    }
    list.split(',').map(str::trim).any(|candidate| {
        if weak {
            candidate.trim_start_matches("W/") == etag.trim_start_matches("W/")
        } else {
            !candidate.starts_with("W/") && candidate == etag
        }
    })
}

fn header_str(headers: &HeaderMap, name: http::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_date(headers: &HeaderMap, name: http::HeaderName) -> Option<DateTime<Utc>> {
    header_str(headers, name).and_then(parse_http_date)
}

/// Parses any of the three HTTP-date formats.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    [HTTP_DATE, RFC_850_DATE, ASCTIME_DATE]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
        .map(|naive| naive.and_utc())
}

fn set_validators(resp: &mut Response<Body>, etag: &str, baseline: Baseline) -> Result<()> {
    set_header(resp, LAST_MODIFIED, baseline.http_date())?;
    set_header(resp, ETAG, etag.to_owned())
}

fn set_header(resp: &mut Response<Body>, name: http::HeaderName, value: String) -> Result<()> {
    let value = HeaderValue::try_from(value).context("invalid generated header value")?;
    resp.headers_mut().insert(name, value);
    Ok(())
}

fn content_type(path: &Path, contents: &[u8]) -> String {
    match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::TEXT => format!("{mime}; charset=utf-8"),
        Some(mime) => mime.to_string(),
        None if std::str::from_utf8(contents).is_ok() => TEXT_PLAIN.to_owned(),
        None => "application/octet-stream".to_owned(),
    }
}
