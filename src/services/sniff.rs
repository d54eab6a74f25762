//! Content-type detection from leading bytes.
//!
//! Sniffing is heuristic, so it sits behind [`MimeSniffer`] and the fetcher
//! only ever hands it bytes it has already received.

use std::str;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Upper bound on how many leading bytes a sniffer is shown.
pub const SNIFF_LEN: usize = 512;

pub trait MimeSniffer: Send + Sync {
    fn sniff(&self, head: &[u8]) -> String;
}

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"RIFF", "image/webp"),
    (b"%PDF", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/gzip"),
    (b"<?xml", "application/xml"),
];

const HTML_PREFIXES: &[&[u8]] = &[b"<!doctype html", b"<html", b"<head", b"<body"];

/// Magic-number table followed by a UTF-8 text check.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureSniffer;

impl MimeSniffer for SignatureSniffer {
    fn sniff(&self, head: &[u8]) -> String {
        let head = &head[..head.len().min(SNIFF_LEN)];
        if head.is_empty() {
            return OCTET_STREAM.into();
        }

        if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
            // RIFF is a container; only WEBP payloads are images we know.
            if *mime != "image/webp" || head.get(8..12) == Some(&b"WEBP"[..]) {
                return (*mime).into();
            }
        }

        let trimmed = trim_leading_whitespace(head);
        if HTML_PREFIXES.iter().any(|prefix| starts_with_ignore_case(trimmed, prefix)) {
            return "text/html".into();
        }

        if looks_like_utf8(head) {
            "text/plain".into()
        } else {
            OCTET_STREAM.into()
        }
    }
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Valid UTF-8 without NULs, tolerating a multi-byte sequence cut off by
/// the sniff window.
fn looks_like_utf8(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match str::from_utf8(head) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    }
}

/// Reduce a `Content-Type` header to its lower-cased bare MIME type.
///
/// Returns `None` for a missing or untrusted declaration, in which case the
/// caller falls back to sniffing.
pub fn declared_mime(header: Option<&str>) -> Option<String> {
    let mime = header?.split(';').next()?.trim().to_ascii_lowercase();
    if mime.is_empty() || mime == OCTET_STREAM || !mime.contains('/') {
        None
    } else {
        Some(mime)
    }
}
