//! Query-string parameters.

use std::{collections::HashMap, time::Duration};

use http::Uri;

use crate::{Result, SimError};

/// The query parameters of a request.
///
/// Lookups never fail: an absent key reads as the empty string. Keys are
/// case-sensitive and only the first occurrence of a repeated key is kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Extracts the parameters from a request URI.
    pub fn from_uri(uri: &Uri) -> Self {
        uri.query().map(Self::parse).unwrap_or_default()
    }

    /// Parses a raw query string.
    ///
    /// A query string with broken percent escapes yields no parameters at all.
    pub fn parse(query: &str) -> Self {
        if !has_valid_escapes(query) {
            tracing::debug!("Ignoring malformed query string {query:?}");
            return Self::default();
        }

        let mut params = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        Self(params)
    }

    /// Returns the value of `name`, or `""` if it is absent.
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Reads `name` as a number of milliseconds.
    pub fn millis(&self, name: &str) -> Result<Duration> {
        let value = self.get(name);
        parse_millis(value).map_err(|reason| SimError::malformed(name, value, reason))
    }

    /// Reads `name` as a signed integer.
    pub fn integer(&self, name: &str) -> Result<i64> {
        let value = self.get(name);
        value
            .parse()
            .map_err(|err| SimError::malformed(name, value, err))
    }
}

/// Parses a millisecond count such as `50`, `2.5` or `-1`.
///
/// Negative values collapse to a zero duration.
fn parse_millis(value: &str) -> std::result::Result<Duration, &'static str> {
    const EXPECTED: &str = "expected a number of milliseconds";

    let (negative, number) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(EXPECTED);
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(EXPECTED);
    }

    let whole_millis: u64 = match whole {
        "" => 0,
        digits => digits.parse().map_err(|_| "duration out of range")?,
    };
    // Anything below a nanosecond is dropped.
    let fraction_nanos = fraction
        .bytes()
        .take(6)
        .zip((0..6).rev())
        .map(|(digit, exp)| u64::from(digit - b'0') * 10u64.pow(exp))
        .sum();
    if negative {
        return Ok(Duration::ZERO);
    }
    Duration::from_millis(whole_millis)
        .checked_add(Duration::from_nanos(fraction_nanos))
        .ok_or("duration out of range")
}

fn has_valid_escapes(query: &str) -> bool {
    let bytes = query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escaped = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !escaped {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_empty() {
        let params = Params::parse("a=1");
        assert_eq!(params.get("a"), "1");
        assert_eq!(params.get("b"), "");
        assert_eq!(params.get("A"), "");
    }

    #[test]
    fn first_value_wins() {
        let params = Params::parse("status=418&status=200");
        assert_eq!(params.get("status"), "418");
    }

    #[test]
    fn values_are_decoded() {
        let params = Params::parse("name=X-Test%2CY&value=a+b");
        assert_eq!(params.get("name"), "X-Test,Y");
        assert_eq!(params.get("value"), "a b");
    }

    #[test]
    fn malformed_query_degrades_to_no_params() {
        let params = Params::parse("sleep=10&bad=%zz");
        assert_eq!(params, Params::default());
        assert_eq!(params.get("sleep"), "");

        assert_eq!(Params::parse("trailing=%4"), Params::default());
    }

    #[test]
    fn from_uri_without_query() {
        let uri: Uri = "/delay".parse().unwrap();
        assert_eq!(Params::from_uri(&uri), Params::default());

        let uri: Uri = "/delay?sleep=5".parse().unwrap();
        assert_eq!(Params::from_uri(&uri).get("sleep"), "5");
    }

    #[test]
    fn millis_parses_integer_and_fractional_values() {
        let params = Params::parse("a=50&b=2.5&c=.5&d=-20&e=%2B7");
        assert_eq!(params.millis("a").unwrap(), Duration::from_millis(50));
        assert_eq!(params.millis("b").unwrap(), Duration::from_micros(2500));
        assert_eq!(params.millis("c").unwrap(), Duration::from_micros(500));
        assert_eq!(params.millis("d").unwrap(), Duration::ZERO);
        assert_eq!(params.millis("e").unwrap(), Duration::from_millis(7));
    }

    #[test]
    fn millis_rejects_garbage() {
        let params = Params::parse("a=ten&b=10s&c=.&d=inf&e=1e3");
        for name in ["a", "b", "c", "d", "e", "missing"] {
            let err = params.millis(name).unwrap_err();
            assert!(
                matches!(err, SimError::MalformedParameter { .. }),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn integer_parsing() {
        let params = Params::parse("size=5&neg=-3&bad=5.0");
        assert_eq!(params.integer("size").unwrap(), 5);
        assert_eq!(params.integer("neg").unwrap(), -3);
        assert!(params.integer("bad").is_err());
        assert!(params.integer("missing").is_err());
    }
}
