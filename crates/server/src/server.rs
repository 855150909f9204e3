use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use testpeer_http::{body::Body, dump, response, routes::Router};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task,
};
use tracing::Instrument;

use crate::{
    handlers,
    instrument::{finalize_http_span, http_span, instrument_error, MatchedRoute},
    ServerContext,
};

/// An HTTP server which simulates configurable server behaviour.
pub struct HttpServer {
    /// The address the server is listening on.
    listen_addr: SocketAddr,
    /// Request router.
    router: Router,
    /// State shared by all requests.
    context: ServerContext,
}

impl HttpServer {
    /// Create a new [`HttpServer`] serving the standard routes.
    pub fn new(listen_addr: SocketAddr, context: ServerContext) -> Self {
        Self {
            listen_addr,
            router: Router::standard(),
            context,
        }
    }

    /// Serve incoming requests on the configured address.
    pub async fn serve(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await.with_context(|| {
            format!(
                "Unable to listen on {listen_addr}",
                listen_addr = self.listen_addr
            )
        })?;
        self.serve_listener(listener).await
    }

    /// Serve incoming requests over the provided [`TcpListener`].
    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        self.print_startup_msgs(&listener)?;
        loop {
            let (stream, client_addr) = listener.accept().await?;
            self.clone().serve_connection(stream, client_addr);
        }
    }

    /// Routes a fully received request to its endpoint.
    ///
    /// Failures are logged and turned into the status code of the error, so
    /// this always produces a response.
    pub async fn handle(&self, req: Request<Bytes>) -> Response<Body> {
        let path = req.uri().path().to_string();
        tracing::debug!("Processing request on path '{path}'");

        if self.context.verbose {
            let dump = dump::dump_request(&req);
            tracing::info!("{}", String::from_utf8_lossy(&dump));
        }

        let Some(route_match) = self.router.route(&path) else {
            return Self::not_found(&path);
        };

        match handlers::dispatch(&self.context, &route_match, req).await {
            Ok(resp) => MatchedRoute::with_response_extension(resp, route_match.raw_route),
            Err(err) => {
                tracing::error!("Error processing request: {err}");
                instrument_error(&err);
                MatchedRoute::with_response_extension(
                    response::with_status(err.status()),
                    route_match.raw_route,
                )
            }
        }
    }

    /// Creates an HTTP 500 response.
    fn internal_error() -> Response<Body> {
        response::with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Creates an HTTP 404 response.
    fn not_found(path: &str) -> Response<Body> {
        tracing::warn!("Request to {path} matched no route");
        response::with_status(StatusCode::NOT_FOUND)
    }

    fn serve_connection<S: AsyncRead + AsyncWrite + Unpin + Send + 'static>(
        self: Arc<Self>,
        stream: S,
        client_addr: SocketAddr,
    ) {
        task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(
                    TokioIo::new(stream),
                    service_fn(move |request| {
                        self.clone().instrumented_service_fn(client_addr, request)
                    }),
                )
                .await
            {
                tracing::warn!("Error serving HTTP connection: {err:?}");
            }
        });
    }

    async fn instrumented_service_fn(
        self: Arc<Self>,
        client_addr: SocketAddr,
        request: Request<Incoming>,
    ) -> Result<Response<Body>, Infallible> {
        let span = http_span!(request, client_addr);
        let method = request.method().to_string();
        async {
            let (parts, body) = request.into_parts();
            let response = match body.collect().await {
                Ok(collected) => {
                    self.handle(Request::from_parts(parts, collected.to_bytes()))
                        .await
                }
                Err(err) => {
                    tracing::error!("Error reading request body: {err}");
                    Self::internal_error()
                }
            };
            Ok(finalize_http_span(response, method))
        }
        .instrument(span)
        .await
    }

    fn print_startup_msgs(&self, listener: &TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        let base_url = format!("http://{local_addr:?}");
        eprintln!("\nServing {base_url}");
        tracing::info!("Serving {base_url}");

        println!("Available Routes:");
        for (route, endpoint) in self.router.routes() {
            println!("  {}: {}{}", endpoint.handler_name(), base_url, route);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    fn server(dir: &std::path::Path) -> HttpServer {
        server_with(dir, false)
    }

    fn server_with(dir: &std::path::Path, verbose: bool) -> HttpServer {
        let context = ServerContext::new(verbose, dir, dir.join("main.html"));
        HttpServer::new("127.0.0.1:0".parse().unwrap(), context)
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn logs_of(server: &HttpServer, req: Request<Bytes>) -> (StatusCode, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let status = server.handle(req).await.status();
        (status, logs.contents())
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn records_matched_route() {
        let dir = tempfile::tempdir().unwrap();
        let resp = server(dir.path())
            .handle(get("/getContent/missing.txt"))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let route = resp.extensions().get::<MatchedRoute>().unwrap();
        assert_eq!(route.route, "/getContent/...");
    }

    #[tokio::test]
    async fn verbose_server_logs_request_dump() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .uri("/returnStatus?status=204")
            .header("x-trace-tag", "yes")
            .body(Bytes::new())
            .unwrap();

        let (status, logs) = logs_of(&server_with(dir.path(), true), req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(logs.contains("Current Time:"), "{logs}");
        assert!(logs.contains("Method: GET"), "{logs}");
        assert!(logs.contains("X-Trace-Tag:yes"), "{logs}");
        assert!(logs.contains("returnStatus called"), "{logs}");
    }

    #[tokio::test]
    async fn quiet_server_does_not_dump_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (status, logs) =
            logs_of(&server_with(dir.path(), false), get("/returnStatus?status=204")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!logs.contains("Current Time:"), "{logs}");
        assert!(logs.contains("returnStatus called"), "{logs}");
    }

    #[tokio::test]
    async fn errors_become_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let resp = server.handle(get("/delay?sleep=later")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // No template in the directory.
        let resp = server.handle(get("/")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unmatched_paths_render_the_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.html"), "<h1>testpeer</h1>").unwrap();
        let server = server(dir.path());

        for uri in ["/", "/no/such/page", "/delay/"] {
            let resp = server.handle(get(uri)).await;
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            let body = resp.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"<h1>testpeer</h1>");
        }
    }
}
