//! Response bodies.

use std::convert::Infallible;

use bytes::Bytes;
use futures::{channel::mpsc::UnboundedReceiver, StreamExt};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;

/// The body type of every response produced by the simulators.
pub type Body = UnsyncBoxBody<Bytes, Infallible>;

/// An empty body.
pub fn empty() -> Body {
    Empty::new().boxed_unsync()
}

/// A body made of a single buffer.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).boxed_unsync()
}

/// A body that forwards each received chunk as its own frame.
///
/// The connection writes and flushes every frame as soon as it is produced,
/// which is what lets a client observe partial output.
pub fn streaming(chunks: UnboundedReceiver<Bytes>) -> Body {
    StreamBody::new(chunks.map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)))).boxed_unsync()
}
