//! The landing page.

use std::path::Path;

use anyhow::Context;
use http::{Response, StatusCode};

use crate::{
    body,
    response::{self, TEXT_PLAIN},
    Result,
};

/// Renders the liquid template at `path`.
///
/// The template is read and parsed on every call so edits show up without a
/// restart. A missing or broken template is an unrecoverable error.
pub async fn render(path: &Path) -> Result<Response<body::Body>> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read template {}", path.display()))?;
    let rendered = render_str(&source)
        .with_context(|| format!("failed to render template {}", path.display()))?;

    let mut resp = response::with_status(StatusCode::OK);
    *resp.body_mut() = body::full(rendered);
    let content_type = match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::TEXT => format!("{mime}; charset=utf-8"),
        Some(mime) => mime.to_string(),
        None => TEXT_PLAIN.to_owned(),
    };
    response::set_content_type(&mut resp, &content_type)?;
    Ok(resp)
}

fn render_str(source: &str) -> anyhow::Result<String> {
    let parser = liquid::ParserBuilder::with_stdlib().build()?;
    let template = parser.parse(source)?;
    Ok(template.render(&liquid::Object::new())?)
}
