//! Response primitives shared by the endpoints.

use http::{
    header::{HeaderName, HeaderValue, CONTENT_TYPE},
    Response, StatusCode,
};

use crate::{
    body::{self, Body},
    Result, SimError,
};

/// Content type used for plain-text responses.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A response with the given status and no body.
pub fn with_status(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(body::empty());
    *resp.status_mut() = status;
    resp
}

/// Sets (replacing any previous value) a header from client-supplied text.
pub fn set_header(resp: &mut Response<Body>, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| SimError::malformed("name", name, err))?;
    let value =
        HeaderValue::from_str(value).map_err(|err| SimError::malformed("value", value, err))?;
    resp.headers_mut().insert(name, value);
    Ok(())
}

/// Sets the `Content-Type` header.
pub fn set_content_type(resp: &mut Response<Body>, content_type: &str) -> Result<()> {
    let value = HeaderValue::from_str(content_type)
        .map_err(|err| anyhow::anyhow!("invalid content type {content_type:?}: {err}"))?;
    resp.headers_mut().insert(CONTENT_TYPE, value);
    Ok(())
}
