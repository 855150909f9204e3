//! JSON validation and canonical re-serialization.

use anyhow::Context;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};

use crate::Result;

const INDENT: &[u8] = b"   ";

/// Parses `payload` as a single JSON document and renders it back with
/// three-space indentation.
///
/// Fails with [`SimError::InvalidPayload`](crate::SimError::InvalidPayload)
/// if `payload` is not well-formed JSON. Object keys come out sorted.
pub fn canonicalize(payload: &[u8]) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(payload)?;

    let mut out = Vec::with_capacity(payload.len());
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
    value
        .serialize(&mut serializer)
        .context("failed to serialize JSON value")?;
    Ok(out)
}
