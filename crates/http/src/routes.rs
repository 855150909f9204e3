//! Route matching for the test server.

use std::fmt;

use indexmap::IndexMap;

/// An operation the server can perform.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Endpoint {
    /// Renders the page template.
    Index,
    /// Sleeps before answering.
    Delay,
    /// Answers with a caller-chosen status.
    ReturnStatus,
    /// Streams markers over time.
    SampleResponse,
    /// Sets caller-chosen response headers.
    AddHeader,
    /// Echoes the request back.
    DumpRequest,
    /// Conditional content with a short cache lifetime.
    CacheTests,
    /// Conditional content.
    GetContent,
    /// Re-serializes a JSON request body.
    ValidateJson,
}

impl Endpoint {
    /// The name used when logging that the endpoint was called.
    pub fn handler_name(&self) -> &'static str {
        match self {
            Self::Index => "handler",
            Self::Delay => "delay",
            Self::ReturnStatus => "returnStatus",
            Self::SampleResponse => "sampleResponse",
            Self::AddHeader => "addHeader",
            Self::DumpRequest => "dumpRequest",
            Self::CacheTests => "cacheTests",
            Self::GetContent => "getContent",
            Self::ValidateJson => "validateJson",
        }
    }
}

/// The route table.
#[derive(Clone, Debug)]
pub struct Router {
    routes: IndexMap<RoutePattern, Endpoint>,
}

impl Router {
    /// Builds a router from `(route, endpoint)` pairs.
    ///
    /// A route ending in `/...` matches that path and everything below it.
    pub fn build<'a>(routes: impl IntoIterator<Item = (&'a str, Endpoint)>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(route, endpoint)| (RoutePattern::from(route), endpoint))
            .collect::<IndexMap<_, _>>();
        tracing::debug!("Constructed router: {:?}", routes);
        Self { routes }
    }

    /// The routes the server listens on.
    pub fn standard() -> Self {
        Self::build([
            ("/...", Endpoint::Index),
            ("/delay", Endpoint::Delay),
            ("/returnStatus", Endpoint::ReturnStatus),
            ("/sampleResponse", Endpoint::SampleResponse),
            ("/addHeader", Endpoint::AddHeader),
            ("/dumpRequest", Endpoint::DumpRequest),
            ("/cacheTests/...", Endpoint::CacheTests),
            ("/getContent/...", Endpoint::GetContent),
            ("/validateJson", Endpoint::ValidateJson),
        ])
    }

    /// Finds the endpoint for `path`.
    ///
    /// An exact route wins over any wildcard; among wildcards the longest
    /// prefix wins.
    pub fn route(&self, path: &str) -> Option<RouteMatch> {
        let exact = self
            .routes
            .iter()
            .find(|(pattern, _)| matches!(pattern, RoutePattern::Exact(p) if p == path));
        let (pattern, endpoint) = exact.or_else(|| {
            self.routes
                .iter()
                .filter(|(pattern, _)| pattern.matches(path))
                .max_by_key(|(pattern, _)| pattern.prefix_len())
        })?;

        Some(RouteMatch {
            endpoint: *endpoint,
            raw_route: pattern.to_string(),
            trailing: pattern.trailing(path).to_owned(),
        })
    }

    /// All routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&RoutePattern, &Endpoint)> {
        self.routes.iter()
    }
}

/// The result of routing a request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    /// The endpoint to invoke.
    pub endpoint: Endpoint,
    /// The route as registered, e.g. `/getContent/...`.
    pub raw_route: String,
    /// For wildcard routes, the part of the path below the prefix.
    pub trailing: String,
}

/// A registered route.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RoutePattern {
    /// Matches this path only.
    Exact(String),
    /// Matches this path and any path below it.
    Wildcard(String),
}

impl RoutePattern {
    /// Parses a route, treating a `/...` suffix as a wildcard.
    pub fn from<S: Into<String>>(path: S) -> Self {
        let path = path.into();
        match path.strip_suffix("/...") {
            Some(p) => Self::Wildcard(p.to_owned()),
            None => Self::Exact(path),
        }
    }

    /// Returns true if `path` is handled by this route.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(route) => path == route,
            Self::Wildcard(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    fn prefix_len(&self) -> usize {
        match self {
            Self::Exact(route) | Self::Wildcard(route) => route.len(),
        }
    }

    /// The part of `path` below a wildcard prefix, without the leading slash.
    fn trailing<'a>(&self, path: &'a str) -> &'a str {
        match self {
            Self::Exact(_) => "",
            Self::Wildcard(prefix) => path
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(route) => f.write_str(route),
            Self::Wildcard(prefix) => write!(f, "{prefix}/..."),
        }
    }
}
