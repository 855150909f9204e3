//! Parameter-driven response simulation: delays, status overrides, header
//! injection and staged output.

use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc::{self, UnboundedSender};
use http::{Response, StatusCode};
use tokio::time::{sleep, Instant};

use crate::{
    body::{self, Body},
    params::Params,
    response::{self, TEXT_PLAIN},
    Result, SimError,
};

/// The unit of staged output.
pub const MARKER: &[u8] = b".";

/// What a request asked the server to simulate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Wait, then answer 200 with an empty body.
    Delay(Duration),
    /// Emit markers until `duration` has elapsed, pausing `latency` after each.
    TimedStream {
        /// Total emission time
        duration: Duration,
        /// Pause after each marker
        latency: Duration,
    },
    /// Emit exactly `count` markers, pausing `latency` after each.
    CountedStream {
        /// Number of markers
        count: u64,
        /// Pause after each marker
        latency: Duration,
    },
    /// Answer with this status and an empty body.
    ///
    /// An informational (1xx) code cannot end an exchange, so it is answered
    /// with 200 instead.
    StatusOverride(StatusCode),
    /// Answer 200 with these headers set.
    HeaderSet(Vec<(String, String)>),
}

impl Directive {
    /// `sleep=<ms>`
    pub fn delay(params: &Params) -> Result<Self> {
        Ok(Self::Delay(params.millis("sleep")?))
    }

    /// `status=<code>`
    pub fn status(params: &Params) -> Result<Self> {
        let code = params.integer("status")?;
        u16::try_from(code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .map(Self::StatusOverride)
            .ok_or_else(|| {
                SimError::malformed("status", params.get("status"), "not a valid HTTP status code")
            })
    }

    /// `time=<ms>&latency=<ms>` or `size=<n>&latency=<ms>`.
    ///
    /// Whether `time` parses decides the mode; `latency` is required either way.
    pub fn staged(params: &Params) -> Result<Self> {
        let duration = params.millis("time");
        let latency = params.millis("latency")?;
        match duration {
            Ok(duration) => Ok(Self::TimedStream { duration, latency }),
            Err(_) => {
                let size = params.integer("size")?;
                Ok(Self::CountedStream {
                    // A negative size emits nothing.
                    count: u64::try_from(size).unwrap_or_default(),
                    latency,
                })
            }
        }
    }

    /// `name=<n1,n2,...>&value=<v1,v2,...>`, paired by position.
    ///
    /// Pairs with an empty name are skipped. Extra values are ignored.
    pub fn headers(params: &Params) -> Result<Self> {
        let mut values = params.get("value").split(',');
        let mut pairs = vec![];
        for name in params.get("name").split(',') {
            let value = values.next().ok_or_else(|| {
                SimError::malformed(
                    "value",
                    params.get("value"),
                    format!("no value for header `{name}`"),
                )
            })?;
            if name.is_empty() {
                continue;
            }
            pairs.push((name.to_owned(), value.to_owned()));
        }
        Ok(Self::HeaderSet(pairs))
    }

    /// Carries out the directive.
    ///
    /// Streams are emitted from a separate task; the returned response
    /// delivers each marker as soon as it is produced.
    pub async fn respond(self) -> Result<Response<Body>> {
        match self {
            Self::Delay(duration) => {
                sleep(duration).await;
                Ok(Response::new(body::empty()))
            }
            Self::StatusOverride(status) if status.is_informational() => {
                tracing::debug!("Informational status {status} requested; answering 200");
                Ok(response::with_status(StatusCode::OK))
            }
            Self::StatusOverride(status) => Ok(response::with_status(status)),
            Self::HeaderSet(pairs) => {
                let mut resp = Response::new(body::empty());
                for (name, value) in &pairs {
                    response::set_header(&mut resp, name, value)?;
                }
                Ok(resp)
            }
            Self::TimedStream { .. } | Self::CountedStream { .. } => {
                let (tx, rx) = mpsc::unbounded();
                tokio::spawn(async move { self.stream_to(&tx).await });
                let mut resp = Response::new(body::streaming(rx));
                response::set_content_type(&mut resp, TEXT_PLAIN)?;
                Ok(resp)
            }
        }
    }

    /// Emits the markers of a stream directive into `sink`.
    ///
    /// A send that fails because the receiving side went away is ignored:
    /// the emission always runs to completion. Other directives emit nothing.
    pub async fn stream_to(&self, sink: &UnboundedSender<Bytes>) {
        match *self {
            Self::TimedStream { duration, latency } => {
                let start = Instant::now();
                loop {
                    emit_marker(sink);
                    sleep(latency).await;
                    if start.elapsed() >= duration {
                        break;
                    }
                }
            }
            Self::CountedStream { count, latency } => {
                for _ in 0..count {
                    emit_marker(sink);
                    sleep(latency).await;
                }
            }
            _ => {}
        }
    }
}

fn emit_marker(sink: &UnboundedSender<Bytes>) {
    if sink.unbounded_send(Bytes::from_static(MARKER)).is_err() {
        tracing::trace!("Client is gone; dropping marker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http_body_util::BodyExt;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn time_takes_precedence_over_size() {
        let params = Params::parse("time=100&size=3&latency=20");
        assert_eq!(
            Directive::staged(&params).unwrap(),
            Directive::TimedStream {
                duration: ms(100),
                latency: ms(20)
            }
        );
    }

    #[test]
    fn unparsable_time_falls_back_to_size() {
        let params = Params::parse("time=soon&size=3&latency=20");
        assert_eq!(
            Directive::staged(&params).unwrap(),
            Directive::CountedStream {
                count: 3,
                latency: ms(20)
            }
        );

        let params = Params::parse("size=-4&latency=1");
        assert_eq!(
            Directive::staged(&params).unwrap(),
            Directive::CountedStream {
                count: 0,
                latency: ms(1)
            }
        );
    }

    #[test]
    fn latency_is_required() {
        let err = Directive::staged(&Params::parse("time=100")).unwrap_err();
        assert!(matches!(err, SimError::MalformedParameter { ref name, .. } if name == "latency"));

        let err = Directive::staged(&Params::parse("size=x&latency=1")).unwrap_err();
        assert!(matches!(err, SimError::MalformedParameter { ref name, .. } if name == "size"));
    }

    #[test]
    fn status_range_is_checked() {
        assert_eq!(
            Directive::status(&Params::parse("status=418")).unwrap(),
            Directive::StatusOverride(StatusCode::IM_A_TEAPOT)
        );
        for query in ["status=99", "status=1000", "status=-200", "status=ok", ""] {
            assert!(Directive::status(&Params::parse(query)).is_err(), "{query}");
        }
    }

    #[test]
    fn headers_pair_by_position() {
        let directive = Directive::headers(&Params::parse("name=X,Y&value=1,2,3")).unwrap();
        assert_eq!(
            directive,
            Directive::HeaderSet(vec![("X".into(), "1".into()), ("Y".into(), "2".into())])
        );

        assert_eq!(
            Directive::headers(&Params::default()).unwrap(),
            Directive::HeaderSet(vec![])
        );

        let err = Directive::headers(&Params::parse("name=X,Y&value=1")).unwrap_err();
        assert!(matches!(err, SimError::MalformedParameter { .. }));
    }

    #[tokio::test]
    async fn informational_status_is_answered_with_ok() {
        for query in ["status=100", "status=101", "status=103"] {
            let directive = Directive::status(&Params::parse(query)).unwrap();
            let resp = directive.respond().await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{query}");
        }

        let resp = Directive::StatusOverride(StatusCode::from_u16(299).unwrap())
            .respond()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 299);
    }

    #[tokio::test]
    async fn delay_waits_at_least_the_requested_time() {
        let start = std::time::Instant::now();
        let resp = Directive::Delay(ms(30)).respond().await.unwrap();
        assert!(start.elapsed() >= ms(30));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn header_set_response_carries_headers() {
        let resp = Directive::HeaderSet(vec![("X".into(), "1".into()), ("Y".into(), "2".into())])
            .respond()
            .await
            .unwrap();
        assert_eq!(resp.headers()["x"], "1");
        assert_eq!(resp.headers()["y"], "2");
    }

    #[tokio::test]
    async fn counted_stream_emits_exact_count() {
        let (tx, rx) = mpsc::unbounded();
        let start = std::time::Instant::now();
        Directive::CountedStream {
            count: 5,
            latency: ms(10),
        }
        .stream_to(&tx)
        .await;
        assert!(start.elapsed() >= ms(50));
        drop(tx);

        let markers: Vec<Bytes> = rx.collect().await;
        assert_eq!(markers.len(), 5);
        assert!(markers.iter().all(|m| &m[..] == MARKER));
    }

    #[tokio::test]
    async fn timed_stream_emits_until_deadline() {
        let (tx, rx) = mpsc::unbounded();
        let start = std::time::Instant::now();
        Directive::TimedStream {
            duration: ms(100),
            latency: ms(20),
        }
        .stream_to(&tx)
        .await;
        assert!(start.elapsed() >= ms(100));
        drop(tx);

        let markers: Vec<Bytes> = rx.collect().await;
        assert!(!markers.is_empty());
        assert!(markers.len() <= 6, "emitted {}", markers.len());
    }

    #[tokio::test]
    async fn timed_stream_emits_at_least_one_marker() {
        let (tx, rx) = mpsc::unbounded();
        Directive::TimedStream {
            duration: Duration::ZERO,
            latency: Duration::ZERO,
        }
        .stream_to(&tx)
        .await;
        drop(tx);
        assert_eq!(rx.collect::<Vec<_>>().await.len(), 1);
    }

    #[tokio::test]
    async fn stream_survives_a_departed_client() {
        let (tx, rx) = mpsc::unbounded();
        drop(rx);
        Directive::CountedStream {
            count: 3,
            latency: Duration::ZERO,
        }
        .stream_to(&tx)
        .await;
    }

    #[tokio::test]
    async fn streamed_response_collects_all_markers() {
        let resp = Directive::CountedStream {
            count: 4,
            latency: ms(1),
        }
        .respond()
        .await
        .unwrap();
        assert_eq!(resp.headers()[http::header::CONTENT_TYPE], TEXT_PLAIN);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"....");
    }
}
