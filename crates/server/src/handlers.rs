//! Per-endpoint request handling.

use bytes::Bytes;
use http::{
    header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE},
    Request, Response, StatusCode,
};
use testpeer_http::{
    body::{self, Body},
    content, dump, json,
    params::Params,
    response,
    routes::{Endpoint, RouteMatch},
    simulate::Directive,
    template, Result, SimError,
};

use crate::ServerContext;

const CACHE_TESTS_MAX_AGE: &str = "max-age=10";

/// Invokes the endpoint selected by `route`.
pub(crate) async fn dispatch(
    ctx: &ServerContext,
    route: &RouteMatch,
    req: Request<Bytes>,
) -> Result<Response<Body>> {
    tracing::info!("{} called", route.endpoint.handler_name());

    let params = Params::from_uri(req.uri());
    match route.endpoint {
        Endpoint::Index => template::render(&ctx.template).await,
        Endpoint::Delay => Directive::delay(&params)?.respond().await,
        Endpoint::ReturnStatus => Directive::status(&params)?.respond().await,
        Endpoint::SampleResponse => Directive::staged(&params)?.respond().await,
        Endpoint::AddHeader => Directive::headers(&params)?.respond().await,
        Endpoint::DumpRequest => Ok(Response::new(body::full(dump::dump_request(&req)))),
        Endpoint::GetContent => get_content(ctx, &route.trailing, &req).await,
        Endpoint::CacheTests => {
            // Every outcome, failures included, carries the cache lifetime.
            let mut resp = match get_content(ctx, &route.trailing, &req).await {
                Ok(resp) => resp,
                Err(err) => {
                    tracing::error!("Error processing request: {err}");
                    response::with_status(err.status())
                }
            };
            resp.headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_TESTS_MAX_AGE));
            Ok(resp)
        }
        Endpoint::ValidateJson => validate_json(req.body()),
    }
}

async fn get_content(
    ctx: &ServerContext,
    name: &str,
    req: &Request<Bytes>,
) -> Result<Response<Body>> {
    match content::serve(&ctx.content_root, name, ctx.baseline, req).await {
        Err(SimError::ResourceNotFound(what)) => {
            tracing::info!("Content not found: {what}");
            Ok(response::with_status(StatusCode::NOT_FOUND))
        }
        other => other,
    }
}

fn validate_json(payload: &[u8]) -> Result<Response<Body>> {
    match json::canonicalize(payload) {
        Ok(canonical) => {
            let mut resp = Response::new(body::full(canonical));
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(resp)
        }
        Err(SimError::InvalidPayload(err)) => {
            tracing::info!("Rejecting JSON payload: {err}");
            Ok(response::with_status(StatusCode::BAD_REQUEST))
        }
        Err(err) => Err(err),
    }
}
