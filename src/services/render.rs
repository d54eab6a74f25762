//! Inline-render versus download decision for stored content.

use crate::models::snapshot::Snapshot;
use bytes::Bytes;

const RENDERABLE_TEXT: &[&str] = &[
    "text/html",
    "text/markdown",
    "text/plain",
    "text/css",
    "text/javascript",
    "application/json",
    "application/xml",
    "text/xml",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RenderBody {
    Text(String),
    Binary(Bytes),
}

impl RenderBody {
    pub fn into_bytes(self) -> Bytes {
        match self {
            RenderBody::Text(text) => Bytes::from(text),
            RenderBody::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderDecision {
    /// Safe to show in a browser context under `content_type`.
    Inline {
        content_type: String,
        body: RenderBody,
    },
    /// Caller should offer a raw download instead.
    NotRenderable,
}

pub fn is_renderable(mime_type: &str) -> bool {
    is_textual(mime_type) || mime_type.starts_with("image/")
}

fn is_textual(mime_type: &str) -> bool {
    RENDERABLE_TEXT.contains(&mime_type)
}

/// Decide how `snapshot` is presented given its decoded bytes.
///
/// Bytes are never altered: HTML goes out exactly as stored, and text that
/// is not valid UTF-8 is passed through as binary under its original type.
pub fn render(snapshot: &Snapshot, decoded: Vec<u8>) -> RenderDecision {
    let mime_type = snapshot.mime_type.as_str();
    if !is_renderable(mime_type) {
        return RenderDecision::NotRenderable;
    }

    let body = if is_textual(mime_type) {
        match String::from_utf8(decoded) {
            Ok(text) => RenderBody::Text(text),
            Err(err) => RenderBody::Binary(Bytes::from(err.into_bytes())),
        }
    } else {
        RenderBody::Binary(Bytes::from(decoded))
    };

    RenderDecision::Inline {
        content_type: snapshot.mime_type.clone(),
        body,
    }
}
