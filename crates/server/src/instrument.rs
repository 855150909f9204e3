use http::Response;
use tracing::Level;

use testpeer_http::{body::Body, SimError};

/// Create a span for an HTTP request.
macro_rules! http_span {
    ($request:tt, $addr:tt) => {
        tracing::info_span!(
            "testpeer_server.handle_http_request",
            "http.request.method" = %$request.method(),
            "network.peer.address" = %$addr.ip(),
            "network.peer.port" = %$addr.port(),
            "network.protocol.name" = "http",
            "url.path" = $request.uri().path(),
            "url.query" = $request.uri().query().unwrap_or(""),
            "http.user_agent" = $request.headers().get("user-agent").and_then(|val| val.to_str().ok()),
            // Recorded later
            "error.type" = ::tracing::field::Empty,
            "http.response.status_code" = ::tracing::field::Empty,
            "http.route" = ::tracing::field::Empty,
            "otel.name" = ::tracing::field::Empty,
        )
    };
}

pub(crate) use http_span;

/// Finish setting attributes on the HTTP span.
pub(crate) fn finalize_http_span(response: Response<Body>, method: String) -> Response<Body> {
    let span = tracing::Span::current();
    tracing::info!(
        "Request finished, sending response with status code {}",
        response.status()
    );

    match response.extensions().get::<MatchedRoute>() {
        Some(MatchedRoute { route }) => {
            span.record("http.route", route.as_str());
            span.record("otel.name", format!("{method} {route}"));
        }
        None => {
            span.record("otel.name", method);
        }
    }
    span.record("http.response.status_code", response.status().as_u16());
    response
}

/// Marks the current span as errored.
pub(crate) fn instrument_error(err: &SimError) {
    let span = tracing::Span::current();
    tracing::event!(target: module_path!(), Level::INFO, error = %err);
    span.record("error.type", format!("{:?}", err));
}

/// The route a request was dispatched through, carried as a response
/// extension so the request span can name it.
#[derive(Clone, Debug)]
pub struct MatchedRoute {
    /// The route as registered, e.g. `/getContent/...`.
    pub route: String,
}

impl MatchedRoute {
    /// Attaches `route` to `resp` as a [`MatchedRoute`] extension.
    pub fn with_response_extension(
        mut resp: Response<Body>,
        route: impl Into<String>,
    ) -> Response<Body> {
        resp.extensions_mut().insert(MatchedRoute {
            route: route.into(),
        });
        resp
    }
}
